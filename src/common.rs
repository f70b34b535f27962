use std::{ops::Deref, sync::Arc};

use crate::BucketError;

/// A validated newtype for bucket names.
///
/// The name is the key under which a backend stores the token count, so it has
/// the following constraints:
/// - Must not be empty
/// - Must not be longer than 255 bytes
#[derive(Debug, Clone, PartialEq, PartialOrd, Hash, Eq)]
pub struct BucketName(Arc<str>);

impl Deref for BucketName {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::fmt::Display for BucketName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for BucketName {
    type Error = BucketError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.is_empty() {
            Err(BucketError::InvalidBucketName(
                "Bucket name must not be empty".to_string(),
            ))
        } else if value.len() > 255 {
            Err(BucketError::InvalidBucketName(
                "Bucket name must not be longer than 255 characters".to_string(),
            ))
        } else {
            Ok(Self(Arc::from(value)))
        }
    }
}

impl TryFrom<&str> for BucketName {
    type Error = BucketError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::try_from(value.to_string())
    }
}

/// How a fill loop brings the bucket back to its target on each tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FillMode {
    /// Overwrite the count with the target.
    ///
    /// Idempotent per tick and needs no prior read: whatever the count was, it is
    /// the target afterwards.
    #[default]
    Overwrite,
    /// Read the count and `put` the difference when it is below the target.
    ///
    /// The read and the put are separate operations. A `take` landing between them
    /// is not seen by the tick, so the bucket can end a tick below the target, and
    /// a concurrent `put` can push it above. Use only when increments from other
    /// writers must be preserved rather than flattened.
    Delta,
}
