//! Redis storage provider.
//!
//! [`RedisStorage`] keeps token counts in Redis so that buckets with the same name
//! in different processes draw from one count.
//!
//! # Key Characteristics
//!
//! - **Shared:** Any process pointing at the same Redis and prefix shares buckets
//! - **Atomic take:** Lua script (default) or a short-lived per-bucket lock
//! - **Plain keys:** Counts are integer strings, readable with `GET`
//!
//! # Requirements
//!
//! - **Redis:** >= 6.2.0
//! - **Runtime:** Tokio or Smol (via `redis-tokio` or `redis-smol`)

mod common;
pub use common::*;

mod redis_storage;
pub use redis_storage::*;
