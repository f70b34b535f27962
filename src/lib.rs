#![doc = include_str!("../README.md")]
#![deny(missing_docs)]
#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

#[cfg(not(any(feature = "tokio", feature = "smol")))]
compile_error!("tokenpail needs a runtime: enable the `tokio` (default) or `smol` feature");

mod storage;
pub use storage::*;

pub mod local;
pub use local::MemoryStorage;

#[cfg(any(feature = "redis-tokio", feature = "redis-smol"))]
#[cfg_attr(docsrs, doc(cfg(any(feature = "redis-tokio", feature = "redis-smol"))))]
pub mod redis;

mod bucket;
pub use bucket::*;

mod watchable;
pub use watchable::{WatchCanceller, WatchDone, WatchOutcome, WatchResult, Watchable};

mod error;
pub use error::*;

mod common;
pub use common::{BucketName, FillMode};

mod runtime;

#[cfg(test)]
mod tests;
