//! Expiring in-process cache backend.
//!
//! [`MemoryCache`] stores values in a sharded concurrent map with optional
//! per-entry expiration. It is the usual first tier of a
//! [`TieredCache`](tiercache_core::TieredCache): lookups never leave the
//! process, and a slower shared tier repopulates it on every miss.

mod cache;

pub use cache::{MemoryCache, MemoryCacheConfig, MemoryCacheStats};
