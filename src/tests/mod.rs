mod support;

mod test_bucket;
