//! # tiercache-core
//!
//! Composable key/value cache abstraction.
//!
//! This crate defines the [`Cache`] contract and two decorators that
//! implement it themselves, so any composition is again a drop-in cache:
//!
//! - [`RetryCache`] re-runs failed operations of one inner cache under a
//!   bounded, jittered exponential backoff with per-attempt deadlines.
//! - [`TieredCache`] turns an ordered list of caches (fastest first) into one
//!   logical cache with read-through write-back and fan-out writes.
//!
//! Concrete backends live in separate crates (`tiercache-memory`,
//! `tiercache-redis`).
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tiercache_core::prelude::*;
//!
//! let local: DynCache<String> = Arc::new(memory);
//! let remote: DynCache<String> = Arc::new(RetryCache::new(redis, RetryConfig::default()));
//! let cache = TieredCache::new("sessions", vec![local, remote]);
//!
//! let ctx = CacheContext::new().with_timeout(Duration::from_secs(2));
//! match cache.get(&ctx, "session:42").await {
//!     Ok(session) => { /* hit in some tier */ }
//!     Err(e) if e.is_miss() => { /* load from the source of truth */ }
//!     Err(e) => return Err(e.into()),
//! }
//! ```

pub mod backoff;
mod cache;
mod context;
mod error;
pub mod retry;
pub mod tiered;

pub use backoff::{BackoffPolicy, ExponentialBackoff};
pub use cache::{Cache, CacheFuture};
pub use context::CacheContext;
pub use error::{BoxError, CacheError, ErrorCategory, TierErrors, TierFailure};
pub use retry::{Operation, RetryCache, RetryConfig, RetryEvent, RetryNotify};
pub use tiered::{TieredCache, WriteBack};

/// Type alias for a cache result.
pub type CacheResult<T> = Result<T, CacheError>;

/// Type alias for a shared cache trait object.
pub type DynCache<V> = std::sync::Arc<dyn Cache<V>>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use tiercache_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::backoff::BackoffPolicy;
    pub use crate::cache::Cache;
    pub use crate::context::CacheContext;
    pub use crate::error::{CacheError, TierErrors};
    pub use crate::retry::{RetryCache, RetryConfig, RetryEvent};
    pub use crate::tiered::{TieredCache, WriteBack};
    pub use crate::{CacheResult, DynCache};
}
