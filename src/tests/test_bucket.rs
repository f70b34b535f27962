use std::sync::{Arc, atomic::Ordering};

use futures::executor::block_on;

use super::support::{FlakyStorage, unique_name};
use crate::{Bucket, BucketError, BucketOptions, DEFAULT_POLL_INTERVAL, MemoryStorage};

#[test]
fn count_after_creation_equals_capacity() {
    for capacity in [0, 1, 10, 1_000_000] {
        let bucket = block_on(Bucket::new_in_memory(unique_name(), capacity)).unwrap();
        assert_eq!(block_on(bucket.count()).unwrap(), capacity);
        assert_eq!(bucket.capacity(), capacity);
    }
}

#[test]
fn cannot_take_more_than_capacity() {
    let bucket = block_on(Bucket::new_in_memory(unique_name(), 10)).unwrap();

    let err = block_on(bucket.take(11)).unwrap_err();
    assert!(err.is_insufficient_tokens());
    assert_eq!(block_on(bucket.count()).unwrap(), 10);
}

#[test]
fn take_exact_count_empties_bucket() {
    let bucket = block_on(Bucket::new_in_memory(unique_name(), 10)).unwrap();

    block_on(bucket.take(4)).unwrap();
    block_on(bucket.take(6)).unwrap();
    assert_eq!(block_on(bucket.count()).unwrap(), 0);
    assert!(block_on(bucket.take(1)).is_err());
}

#[test]
fn put_can_raise_count_above_capacity() {
    let bucket = block_on(Bucket::new_in_memory(unique_name(), 10)).unwrap();

    block_on(bucket.put(1)).unwrap();
    assert_eq!(block_on(bucket.count()).unwrap(), 11);

    block_on(bucket.take(11)).unwrap();
    assert_eq!(block_on(bucket.count()).unwrap(), 0);
}

#[test]
fn take_all_returns_previous_count() {
    let bucket = block_on(Bucket::new_in_memory(unique_name(), 12)).unwrap();

    assert_eq!(block_on(bucket.take_all()).unwrap(), 12);
    assert_eq!(block_on(bucket.count()).unwrap(), 0);
    assert!(block_on(bucket.take(1)).unwrap_err().is_insufficient_tokens());
}

#[test]
fn buckets_with_same_name_share_count() {
    let storage = Arc::new(MemoryStorage::new());
    let name = unique_name();

    let first = block_on(Bucket::new(name.clone(), 10, storage.clone())).unwrap();
    let second = block_on(Bucket::new(name, 50, storage)).unwrap();

    // The second capacity is only a seed and the key already exists.
    assert_eq!(block_on(second.count()).unwrap(), 10);

    block_on(first.take(3)).unwrap();
    assert_eq!(block_on(second.count()).unwrap(), 7);
}

#[test]
fn buckets_with_different_names_share_storage_not_counts() {
    let storage = Arc::new(MemoryStorage::new());

    let a = block_on(Bucket::new(unique_name(), 1, storage.clone())).unwrap();
    let b = block_on(Bucket::new(unique_name(), 2, storage.clone())).unwrap();

    block_on(a.take(1)).unwrap();
    assert_eq!(block_on(b.count()).unwrap(), 2);
    assert_eq!(storage.len(), 2);
}

#[test]
fn construction_fails_when_ping_fails() {
    let storage = Arc::new(FlakyStorage::default());
    storage.fail_ping.store(true, Ordering::SeqCst);

    let err = block_on(Bucket::new(unique_name(), 10, storage.clone())).unwrap_err();
    assert!(matches!(err, BucketError::Connectivity { .. }));

    // Nothing was created.
    assert!(storage.inner.is_empty());
}

#[test]
fn options_default_poll_interval() {
    let options = BucketOptions::new(unique_name(), 3);
    assert_eq!(options.poll_interval, DEFAULT_POLL_INTERVAL);
    assert_eq!(options.capacity, 3);
}

#[test]
fn cloned_bucket_points_at_same_count() {
    let bucket = block_on(Bucket::new_in_memory(unique_name(), 5)).unwrap();
    let clone = bucket.clone();

    block_on(clone.take(5)).unwrap();
    assert_eq!(block_on(bucket.count()).unwrap(), 0);
    assert_eq!(clone.name(), bucket.name());
    assert!(Arc::ptr_eq(clone.storage(), bucket.storage()));
}
