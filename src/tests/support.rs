use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use crate::{Bucket, BucketError, BucketName, BucketOptions, MemoryStorage, Storage};

static NEXT_BUCKET: AtomicU64 = AtomicU64::new(0);

pub(super) fn unique_name() -> BucketName {
    let n = NEXT_BUCKET.fetch_add(1, Ordering::Relaxed);
    BucketName::try_from(format!("bucket_{n}")).unwrap()
}

/// Memory bucket whose watch polls every 10ms.
pub(super) async fn fast_bucket(capacity: u64) -> Bucket<MemoryStorage> {
    fast_bucket_on(capacity, Arc::new(MemoryStorage::new())).await
}

pub(super) async fn fast_bucket_on<S: Storage>(capacity: u64, storage: Arc<S>) -> Bucket<S> {
    Bucket::with_options(
        BucketOptions {
            poll_interval: Duration::from_millis(10),
            ..BucketOptions::new(unique_name(), capacity)
        },
        storage,
    )
    .await
    .unwrap()
}

/// Memory storage with switchable failures.
#[derive(Default)]
pub(super) struct FlakyStorage {
    pub inner: MemoryStorage,
    pub fail_ping: AtomicBool,
    pub fail_set: AtomicBool,
    pub fail_take: AtomicBool,
}

fn injected(op: &str) -> BucketError {
    BucketError::Connectivity {
        reason: format!("injected {op} failure"),
    }
}

impl Storage for FlakyStorage {
    async fn ping(&self) -> Result<(), BucketError> {
        if self.fail_ping.load(Ordering::SeqCst) {
            return Err(injected("ping"));
        }
        self.inner.ping().await
    }

    async fn create(&self, name: &BucketName, capacity: u64) -> Result<(), BucketError> {
        self.inner.create(name, capacity).await
    }

    async fn take(&self, name: &BucketName, tokens: u64) -> Result<(), BucketError> {
        if self.fail_take.load(Ordering::SeqCst) {
            return Err(injected("take"));
        }
        self.inner.take(name, tokens).await
    }

    async fn put(&self, name: &BucketName, amount: u64) -> Result<(), BucketError> {
        self.inner.put(name, amount).await
    }

    async fn count(&self, name: &BucketName) -> Result<u64, BucketError> {
        self.inner.count(name).await
    }

    async fn take_all(&self, name: &BucketName) -> Result<u64, BucketError> {
        self.inner.take_all(name).await
    }

    async fn set(&self, name: &BucketName, value: u64) -> Result<(), BucketError> {
        if self.fail_set.load(Ordering::SeqCst) {
            return Err(injected("set"));
        }
        self.inner.set(name, value).await
    }
}
