use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tiercache_core::{Cache, DynCache, RetryCache, RetryConfig, TieredCache};
use tiercache_memory::MemoryCache;
use tiercache_redis::RedisCache;

use crate::error::ConfigError;
use crate::settings::{CacheSettings, TierSettings};

/// Builds the cache stack described by `settings`.
///
/// Each tier is wrapped in a [`RetryCache`] when its `retry` flag is set,
/// then all tiers are composed in order into one [`TieredCache`]. Memory
/// tiers start their background sweep when called inside a tokio runtime.
pub fn build_cache<V>(settings: &CacheSettings) -> Result<TieredCache<V>, ConfigError>
where
    V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    settings.validate()?;
    let retry = settings.retry.to_retry_config();

    let mut tiers: Vec<DynCache<V>> = Vec::with_capacity(settings.tiers.len());
    for (index, tier) in settings.tiers.iter().enumerate() {
        let cache = match tier {
            TierSettings::Memory(memory) => {
                let cache = Arc::new(MemoryCache::new(memory.name.clone(), memory.to_config()));
                if let Some(interval) = memory.cleanup_interval() {
                    if tokio::runtime::Handle::try_current().is_ok() {
                        cache.spawn_cleanup(interval);
                    } else {
                        tracing::warn!(
                            tier = index,
                            name = %memory.name,
                            "no tokio runtime; expired entries are only removed on read"
                        );
                    }
                }
                with_retry(cache, memory.retry, &retry)
            }
            TierSettings::Redis(redis) => {
                let cache = RedisCache::connect(redis.name.clone(), redis.to_config(index)?)
                    .map_err(|source| ConfigError::Build {
                        tier: redis.name.clone(),
                        source,
                    })?;
                with_retry(Arc::new(cache), redis.retry, &retry)
            }
        };

        tracing::info!(
            tier = index,
            kind = tier.kind(),
            name = %tier.name(),
            retry = tier.retry(),
            "cache tier configured"
        );
        tiers.push(cache);
    }

    Ok(TieredCache::new(settings.tiered.name.clone(), tiers)
        .with_write_back(settings.tiered.write_back.into()))
}

fn with_retry<V, C>(cache: Arc<C>, retry: bool, config: &RetryConfig) -> DynCache<V>
where
    V: Send + Sync + 'static,
    C: Cache<V> + 'static,
{
    if retry {
        Arc::new(RetryCache::new(cache, config.clone()))
    } else {
        cache
    }
}
