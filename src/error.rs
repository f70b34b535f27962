use std::time::Duration;

/// Why an existing backend value could not be adopted by a new bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictReason {
    /// The key holds something that is not an integer, most likely data owned by
    /// something else.
    NotANumber {
        /// The raw value found under the key.
        value: String,
    },
    /// The key holds exactly `0`.
    ///
    /// Reusing a drained bucket is almost always a leftover name, so it is refused.
    Depleted,
    /// The key holds a negative integer.
    Negative(i64),
}

impl std::fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotANumber { value } => write!(f, "existing value {value:?} is not a token count"),
            Self::Depleted => f.write_str("existing bucket holds 0 tokens; put tokens back before reusing it"),
            Self::Negative(n) => write!(f, "existing value {n} is negative"),
        }
    }
}

/// Error type for this crate.
#[derive(Debug, thiserror::Error)]
pub enum BucketError {
    /// Redis error.
    #[cfg(any(feature = "redis-tokio", feature = "redis-smol"))]
    #[error("redis error: {0}")]
    RedisError(#[from] redis::RedisError),

    /// The storage backend failed its liveness check.
    #[error("storage backend unreachable: {reason}")]
    Connectivity {
        /// Backend-specific description of the failure.
        reason: String,
    },

    /// The bucket name already exists with a value that cannot be reused.
    #[error("cannot create bucket `{name}`: {reason}")]
    CreationConflict {
        /// Bucket name.
        name: String,
        /// What was wrong with the existing value.
        reason: ConflictReason,
    },

    /// `take` asked for more tokens than the bucket holds.
    #[error("insufficient tokens in `{name}`: requested {requested}, available {available}")]
    InsufficientTokens {
        /// Bucket name.
        name: String,
        /// Tokens asked for.
        requested: u64,
        /// Tokens observed in the bucket when the take was refused.
        available: u64,
    },

    /// A refill tick failed; the fill loop has stopped.
    #[error("refill failed: {0}")]
    Refill(#[source] Box<BucketError>),

    /// A watch did not acquire its tokens before the deadline.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Cancelled with an explicit reason.
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// The background task went away without reporting a result.
    #[error("background task ended without a result")]
    Abandoned,

    /// The Take lock was held by someone else for longer than the wait timeout.
    #[error("could not obtain lock `{key}`")]
    LockNotObtained {
        /// Lock key.
        key: String,
    },

    /// The stored value is not a non-negative integer.
    #[error("bucket `{name}` holds an invalid count {value:?}")]
    InvalidCount {
        /// Bucket name.
        name: String,
        /// Raw stored value.
        value: String,
    },

    /// An amount does not fit the backend's integer range.
    #[error("token count overflow in `{name}`")]
    Overflow {
        /// Bucket name.
        name: String,
    },

    /// A poll or fill interval of zero was given.
    #[error("interval must be non-zero")]
    InvalidInterval,

    /// Bucket name validation failed.
    #[error("invalid bucket name: {0}")]
    InvalidBucketName(String),
}

impl BucketError {
    /// Whether this is the expected "not enough tokens" outcome of `take`.
    pub fn is_insufficient_tokens(&self) -> bool {
        matches!(self, Self::InsufficientTokens { .. })
    }
}
