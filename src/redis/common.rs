use std::{sync::Arc, time::Duration};

use dashmap::DashMap;
use redis::aio::ConnectionManager;

use crate::BucketName;

/// How [`RedisStorage`](crate::redis::RedisStorage) makes `take` atomic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TakeStrategy {
    /// Check and decrement inside one Lua script.
    ///
    /// One round trip and no lock. Requires scripting support on the server.
    #[default]
    Script,
    /// Hold `<key>.lock` while reading and conditionally decrementing.
    ///
    /// Costs extra round trips and contention on busy buckets. Configured by
    /// [`LockOptions`].
    ///
    /// This does not remove the need for scripting: the lock is released by a
    /// compare-and-delete `EVAL`, and `take_all` is a script under both
    /// strategies. On a server without scripting every release fails, is logged
    /// at `warn`, and leaves the lock to expire, so each following `take` waits
    /// up to [`LockOptions::ttl`].
    Lock,
}

/// Tuning for [`TakeStrategy::Lock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockOptions {
    /// Give up with [`BucketError::LockNotObtained`](crate::BucketError::LockNotObtained)
    /// after waiting this long for the lock.
    pub wait_timeout: Duration,
    /// Pause between attempts to obtain the lock.
    pub wait_retry: Duration,
    /// Expiry of the lock key, so a crashed holder cannot wedge the bucket.
    pub ttl: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            wait_timeout: Duration::from_secs(1),
            wait_retry: Duration::from_millis(50),
            ttl: Duration::from_secs(1),
        }
    }
}

/// Configuration for [`RedisStorage`](crate::redis::RedisStorage).
///
/// # Requirements
///
/// - **Redis version:** >= 6.2.0
/// - **Runtime:** Tokio or Smol (via `redis-tokio` or `redis-smol` features)
///
/// # Examples
///
/// ```ignore
/// use tokenpail::BucketName;
/// use tokenpail::redis::{RedisStorageOptions, TakeStrategy};
///
/// let client = redis::Client::open("redis://127.0.0.1:6379/")?;
/// let connection_manager = client.get_connection_manager().await?;
///
/// let options = RedisStorageOptions {
///     prefix: Some(BucketName::try_from("myapp")?), // Keys: myapp:<name>
///     take_strategy: TakeStrategy::Script,
///     ..RedisStorageOptions::new(connection_manager)
/// };
/// ```
#[derive(Clone)]
pub struct RedisStorageOptions {
    /// Redis connection manager from the `redis` crate.
    ///
    /// The manager multiplexes one connection and reconnects on failure; cloning
    /// it is cheap, so one storage (and every bucket on it) shares it.
    pub connection_manager: ConnectionManager,

    /// Optional prefix for all Redis keys.
    ///
    /// With a prefix, bucket `name` lives at `<prefix>:<name>`. Without one it
    /// lives at `name`, so buckets can adopt keys written by other tools.
    pub prefix: Option<BucketName>,

    /// Atomicity mechanism for `take`.
    pub take_strategy: TakeStrategy,

    /// Lock tuning, used only with [`TakeStrategy::Lock`].
    pub lock: LockOptions,
}

impl RedisStorageOptions {
    /// Options with no prefix, the script strategy and default lock tuning.
    pub fn new(connection_manager: ConnectionManager) -> Self {
        Self {
            connection_manager,
            prefix: None,
            take_strategy: TakeStrategy::default(),
            lock: LockOptions::default(),
        }
    }
}

#[derive(Debug)]
pub(crate) struct RedisKeyGenerator {
    pub prefix: Option<BucketName>,
    pub lock_key_suffix: String,

    // caches
    count_key_cache: DashMap<BucketName, Arc<str>>,
    lock_key_cache: DashMap<BucketName, Arc<str>>,
}

impl RedisKeyGenerator {
    pub(crate) fn new(prefix: Option<BucketName>) -> Self {
        Self {
            prefix,
            lock_key_suffix: "lock".to_string(),
            count_key_cache: DashMap::new(),
            lock_key_cache: DashMap::new(),
        }
    }

    pub(crate) fn get_count_key(&self, name: &BucketName) -> Arc<str> {
        match self.count_key_cache.get(name) {
            Some(value) => value.clone(),
            None => {
                let value = match &self.prefix {
                    Some(prefix) => format!("{}:{}", &**prefix, &**name),
                    None => name.to_string(),
                };
                let value: Arc<str> = Arc::from(value);
                self.count_key_cache.insert(name.clone(), value.clone());

                value
            }
        }
    }

    pub(crate) fn get_lock_key(&self, name: &BucketName) -> Arc<str> {
        match self.lock_key_cache.get(name) {
            Some(value) => value.clone(),
            None => {
                let value = format!("{}.{}", self.get_count_key(name), self.lock_key_suffix);
                let value: Arc<str> = Arc::from(value);
                self.lock_key_cache.insert(name.clone(), value.clone());

                value
            }
        }
    }
}
