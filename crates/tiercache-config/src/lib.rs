//! Configuration for tiercache.
//!
//! Settings are read from a TOML file and environment variables
//! (`TIERCACHE__SECTION__FIELD`), validated, and turned into a ready
//! [`TieredCache`](tiercache_core::TieredCache) by [`build_cache`].
//!
//! ```toml
//! [retry]
//! max_retries = 5
//!
//! [[tiers]]
//! kind = "memory"
//! default_expiration_ms = 60000
//!
//! [[tiers]]
//! kind = "redis"
//! url = "redis://127.0.0.1:6379"
//! key_prefix = "sessions:"
//! ```

mod build;
mod error;
pub mod loader;
pub mod observability;
mod settings;

pub use build::build_cache;
pub use error::ConfigError;
pub use loader::load_settings;
pub use observability::init_tracing;
pub use settings::{
    CacheSettings, LoggingConfig, MemoryTierSettings, RedisTierSettings, RetrySettings,
    TierSettings, TieredSettings, WriteBackMode,
};
