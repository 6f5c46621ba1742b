//! Redis cache backend.
//!
//! [`RedisCache`] is the shared, slower tier of a typical stack. Values are
//! stored as JSON strings so any `Serialize + DeserializeOwned` type can be
//! cached and inspected with `redis-cli`.
//!
//! ## Overwrite policy
//!
//! With `overwrite = false` writes use `SET ... NX`, so an existing live key
//! is never replaced and the write fails with
//! [`CacheError::AlreadyExists`](tiercache_core::CacheError::AlreadyExists).

mod cache;
mod config;

pub use cache::RedisCache;
pub use config::RedisCacheConfig;
