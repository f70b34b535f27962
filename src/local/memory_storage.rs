use dashmap::DashMap;

use crate::{BucketError, BucketName, Storage};

/// In-process bucket storage.
///
/// Keeps a `name → count` map in a [`DashMap`], whose shards are reader/writer
/// locks. Every mutating operation holds the shard's write lock for the whole
/// read-modify-write, which is what makes [`Storage::take`] and
/// [`Storage::take_all`] atomic. [`Storage::count`] only takes a read lock.
///
/// # Semantics
///
/// - **Permissive create:** an existing entry is reused whatever it holds,
///   including `0`.
/// - **Process-scoped:** buckets sharing one `MemoryStorage` share counts; separate
///   instances (or processes) do not.
/// - **No cleanup:** entries live as long as the storage does.
///
/// # Examples
///
/// ```ignore
/// use std::sync::Arc;
/// use tokenpail::{Bucket, BucketName, MemoryStorage};
///
/// let storage = Arc::new(MemoryStorage::new());
/// let a = Bucket::new(BucketName::try_from("a")?, 10, storage.clone()).await?;
/// let b = Bucket::new(BucketName::try_from("b")?, 5, storage).await?;
/// ```
#[derive(Debug, Default)]
pub struct MemoryStorage {
    buckets: DashMap<BucketName, u64>,
}

impl MemoryStorage {
    /// Create an empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bucket names held.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// Whether no bucket has been created yet.
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

impl Storage for MemoryStorage {
    async fn ping(&self) -> Result<(), BucketError> {
        Ok(())
    }

    async fn create(&self, name: &BucketName, capacity: u64) -> Result<(), BucketError> {
        self.buckets.entry(name.clone()).or_insert(capacity);
        Ok(())
    }

    async fn take(&self, name: &BucketName, tokens: u64) -> Result<(), BucketError> {
        let insufficient = |available| BucketError::InsufficientTokens {
            name: name.to_string(),
            requested: tokens,
            available,
        };

        let Some(mut count) = self.buckets.get_mut(name) else {
            return Err(insufficient(0));
        };

        if *count < tokens {
            return Err(insufficient(*count));
        }

        *count -= tokens;
        Ok(())
    }

    async fn put(&self, name: &BucketName, amount: u64) -> Result<(), BucketError> {
        let mut count = self.buckets.entry(name.clone()).or_insert(0);

        *count = count.checked_add(amount).ok_or_else(|| BucketError::Overflow {
            name: name.to_string(),
        })?;

        Ok(())
    }

    async fn count(&self, name: &BucketName) -> Result<u64, BucketError> {
        Ok(self.buckets.get(name).map(|count| *count).unwrap_or(0))
    }

    async fn take_all(&self, name: &BucketName) -> Result<u64, BucketError> {
        Ok(self
            .buckets
            .get_mut(name)
            .map(|mut count| std::mem::take(&mut *count))
            .unwrap_or(0))
    }

    async fn set(&self, name: &BucketName, value: u64) -> Result<(), BucketError> {
        self.buckets.insert(name.clone(), value);
        Ok(())
    }
}
