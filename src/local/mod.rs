//! In-process storage provider.
//!
//! [`MemoryStorage`] keeps token counts within the current process using a
//! thread-safe map ([`DashMap`](dashmap::DashMap)).
//!
//! # Key Characteristics
//!
//! - **Thread-safe:** Safe for concurrent use across threads and tasks
//! - **Zero external dependencies:** No network or database required
//! - **Low latency:** Every operation is a single map access, no I/O
//! - **Process-scoped:** Counts are not shared across processes
//!
//! # When to Use
//!
//! ✅ **Use local storage when:**
//! - Single-process application
//! - Per-session or per-connection buckets
//! - Tests and local development
//!
//! ❌ **Don't use local storage when:**
//! - Multiple application instances must draw from the same bucket
//! - Counts must survive process restarts

mod memory_storage;
pub use memory_storage::*;
