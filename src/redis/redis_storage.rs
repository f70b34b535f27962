use std::time::Instant;

use redis::{AsyncCommands, Script, aio::ConnectionManager};

use crate::{
    BucketError, BucketName, ConflictReason, Storage,
    redis::{LockOptions, RedisKeyGenerator, RedisStorageOptions, TakeStrategy},
    runtime::sleep,
};

const TAKE_SCRIPT: &str = r#"
    local key = KEYS[1]
    local amount = tonumber(ARGV[1])

    local raw = redis.call("GET", key)
    local count = 0

    if raw then
        count = tonumber(raw)
        if count == nil then
            return redis.error_reply("ERR bucket value is not an integer")
        end
    end

    if count >= amount then
        return {1, redis.call("DECRBY", key, amount)}
    end

    return {0, count}
"#;

const TAKE_ALL_SCRIPT: &str = r#"
    local key = KEYS[1]

    local raw = redis.call("GET", key)
    if not raw then
        return 0
    end

    local count = tonumber(raw)
    if count == nil then
        return redis.error_reply("ERR bucket value is not an integer")
    end

    redis.call("SET", key, 0)

    return count
"#;

const RELEASE_LOCK_SCRIPT: &str = r#"
    if redis.call("GET", KEYS[1]) == ARGV[1] then
        return redis.call("DEL", KEYS[1])
    end

    return 0
"#;

/// Bucket storage backed by Redis, shareable between processes.
///
/// Each bucket is a plain integer string key (`<prefix>:<name>`, or `<name>`
/// without a prefix), so counts can be inspected and seeded with ordinary
/// Redis commands.
///
/// # Atomicity
///
/// - [`TakeStrategy::Script`] (default): one Lua script checks and decrements in a
///   single round trip. No lock key is ever written.
/// - [`TakeStrategy::Lock`]: `SET <key>.lock <token> NX PX <ttl>`, then `GET`, a
///   conditional `DECRBY`, and a compare-and-delete script releasing the lock. The
///   lock key only exists for the duration of one `take`.
/// - `put` is a bare `INCRBY` in both strategies; `take_all` is always a script.
///
/// # Create semantics
///
/// Creating a bucket over an existing key is refused when the key holds a
/// non-integer, a negative integer, or exactly `0`.
pub struct RedisStorage {
    connection_manager: ConnectionManager,
    take_strategy: TakeStrategy,
    lock: LockOptions,
    key_generator: RedisKeyGenerator,
    take_script: Script,
    take_all_script: Script,
    release_lock_script: Script,
}

impl RedisStorage {
    /// Create a storage from its options.
    pub fn new(options: RedisStorageOptions) -> Self {
        Self {
            connection_manager: options.connection_manager,
            take_strategy: options.take_strategy,
            lock: options.lock,
            key_generator: RedisKeyGenerator::new(options.prefix),
            take_script: Script::new(TAKE_SCRIPT),
            take_all_script: Script::new(TAKE_ALL_SCRIPT),
            release_lock_script: Script::new(RELEASE_LOCK_SCRIPT),
        }
    }

    /// Strategy used by `take`.
    pub fn take_strategy(&self) -> TakeStrategy {
        self.take_strategy
    }

    #[cfg(test)]
    pub(crate) fn key_generator(&self) -> &RedisKeyGenerator {
        &self.key_generator
    }

    async fn take_with_script(&self, name: &BucketName, tokens: u64) -> Result<(), BucketError> {
        let amount = to_redis_int(name, tokens)?;
        let mut connection_manager = self.connection_manager.clone();

        let (taken, count): (i64, i64) = self
            .take_script
            .key(&*self.key_generator.get_count_key(name))
            .arg(amount)
            .invoke_async(&mut connection_manager)
            .await?;

        match taken {
            1 => Ok(()),
            _ => Err(BucketError::InsufficientTokens {
                name: name.to_string(),
                requested: tokens,
                available: u64::try_from(count).unwrap_or(0),
            }),
        }
    } // end method take_with_script

    async fn take_with_lock(&self, name: &BucketName, tokens: u64) -> Result<(), BucketError> {
        let lock_key = self.key_generator.get_lock_key(name);
        let lock_token = self.obtain_lock(&lock_key).await?;

        let result = self.take_locked(name, tokens).await;

        // Lock expires after its ttl regardless.
        if let Err(err) = self.release_lock(&lock_key, lock_token).await {
            tracing::warn!(error = ?err, lock_key = %lock_key, "Failed to release bucket lock");
        }

        result
    } // end method take_with_lock

    async fn take_locked(&self, name: &BucketName, tokens: u64) -> Result<(), BucketError> {
        let key = self.key_generator.get_count_key(name);
        let mut connection_manager = self.connection_manager.clone();

        let raw: Option<String> = connection_manager.get(&*key).await?;
        let available = parse_count(name, raw)?;

        if available < tokens {
            return Err(BucketError::InsufficientTokens {
                name: name.to_string(),
                requested: tokens,
                available,
            });
        }

        let _: i64 = connection_manager
            .decr(&*key, to_redis_int(name, tokens)?)
            .await?;

        Ok(())
    }

    async fn obtain_lock(&self, lock_key: &str) -> Result<u64, BucketError> {
        let deadline = Instant::now() + self.lock.wait_timeout;
        let ttl_ms = u64::try_from(self.lock.ttl.as_millis())
            .unwrap_or(u64::MAX)
            .max(1);
        let lock_token: u64 = rand::random();

        loop {
            let mut connection_manager = self.connection_manager.clone();

            let acquired: Option<String> = redis::cmd("SET")
                .arg(lock_key)
                .arg(lock_token)
                .arg("NX")
                .arg("PX")
                .arg(ttl_ms)
                .query_async(&mut connection_manager)
                .await?;

            if acquired.is_some() {
                return Ok(lock_token);
            }

            if Instant::now() >= deadline {
                return Err(BucketError::LockNotObtained {
                    key: lock_key.to_string(),
                });
            }

            tracing::debug!(lock_key, "Bucket lock is held, retrying");
            sleep(self.lock.wait_retry).await;
        }
    } // end method obtain_lock

    async fn release_lock(&self, lock_key: &str, lock_token: u64) -> Result<(), BucketError> {
        let mut connection_manager = self.connection_manager.clone();

        let _: i64 = self
            .release_lock_script
            .key(lock_key)
            .arg(lock_token)
            .invoke_async(&mut connection_manager)
            .await?;

        Ok(())
    }
}

impl Storage for RedisStorage {
    async fn ping(&self) -> Result<(), BucketError> {
        let mut connection_manager = self.connection_manager.clone();

        let _: String = redis::cmd("PING")
            .query_async(&mut connection_manager)
            .await
            .map_err(|err| BucketError::Connectivity {
                reason: err.to_string(),
            })?;

        Ok(())
    }

    async fn create(&self, name: &BucketName, capacity: u64) -> Result<(), BucketError> {
        let key = self.key_generator.get_count_key(name);
        let capacity = to_redis_int(name, capacity)?;
        let mut connection_manager = self.connection_manager.clone();

        let existing: Option<String> = connection_manager.get(&*key).await?;

        let conflict = |reason| BucketError::CreationConflict {
            name: name.to_string(),
            reason,
        };

        match existing {
            None => {
                let created: bool = connection_manager.set_nx(&*key, capacity).await?;
                if !created {
                    tracing::debug!(key = %key, "Bucket key was created concurrently, sharing it");
                }
                Ok(())
            }
            Some(value) if value.is_empty() => {
                let _: () = connection_manager.set(&*key, capacity).await?;
                Ok(())
            }
            Some(value) => match value.parse::<i64>() {
                Err(_) => Err(conflict(ConflictReason::NotANumber { value })),
                Ok(0) => Err(conflict(ConflictReason::Depleted)),
                Ok(n) if n < 0 => Err(conflict(ConflictReason::Negative(n))),
                Ok(_) => Ok(()),
            },
        }
    } // end method create

    async fn take(&self, name: &BucketName, tokens: u64) -> Result<(), BucketError> {
        match self.take_strategy {
            TakeStrategy::Script => self.take_with_script(name, tokens).await,
            TakeStrategy::Lock => self.take_with_lock(name, tokens).await,
        }
    }

    async fn put(&self, name: &BucketName, amount: u64) -> Result<(), BucketError> {
        let amount = to_redis_int(name, amount)?;
        let mut connection_manager = self.connection_manager.clone();

        let _: i64 = connection_manager
            .incr(&*self.key_generator.get_count_key(name), amount)
            .await?;

        Ok(())
    }

    async fn count(&self, name: &BucketName) -> Result<u64, BucketError> {
        let mut connection_manager = self.connection_manager.clone();

        let raw: Option<String> = connection_manager
            .get(&*self.key_generator.get_count_key(name))
            .await?;

        parse_count(name, raw)
    }

    async fn take_all(&self, name: &BucketName) -> Result<u64, BucketError> {
        let mut connection_manager = self.connection_manager.clone();

        let count: i64 = self
            .take_all_script
            .key(&*self.key_generator.get_count_key(name))
            .invoke_async(&mut connection_manager)
            .await?;

        u64::try_from(count).map_err(|_| BucketError::InvalidCount {
            name: name.to_string(),
            value: count.to_string(),
        })
    }

    async fn set(&self, name: &BucketName, value: u64) -> Result<(), BucketError> {
        let value = to_redis_int(name, value)?;
        let mut connection_manager = self.connection_manager.clone();

        let _: () = connection_manager
            .set(&*self.key_generator.get_count_key(name), value)
            .await?;

        Ok(())
    }
}

fn to_redis_int(name: &BucketName, value: u64) -> Result<i64, BucketError> {
    i64::try_from(value).map_err(|_| BucketError::Overflow {
        name: name.to_string(),
    })
}

fn parse_count(name: &BucketName, raw: Option<String>) -> Result<u64, BucketError> {
    match raw {
        None => Ok(0),
        Some(value) => value.parse::<u64>().map_err(|_| BucketError::InvalidCount {
            name: name.to_string(),
            value,
        }),
    }
}
