use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tiercache_core::{Cache, CacheContext, CacheError, CacheResult};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Configuration for [`MemoryCache`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryCacheConfig {
    /// Lifetime of entries written through [`Cache::set`]. `None` keeps
    /// entries until they are removed or the cache is cleared.
    pub default_expiration: Option<Duration>,
    /// Whether `set` may replace a live entry. When false, writing a key that
    /// is still live fails with `AlreadyExists`.
    pub overwrite: bool,
}

impl Default for MemoryCacheConfig {
    fn default() -> Self {
        Self {
            default_expiration: Some(Duration::from_secs(5 * 60)),
            overwrite: true,
        }
    }
}

/// Cache statistics for monitoring.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryCacheStats {
    /// Number of entries currently stored, including expired ones not yet swept.
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    /// Entries dropped because they expired.
    pub evictions: u64,
}

impl MemoryCacheStats {
    /// Calculate hit rate as a percentage.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

struct CachedEntry<V> {
    value: V,
    expires_at: Option<Instant>,
}

impl<V> CachedEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-process cache with TTL-based expiration.
///
/// Thread-safe and cheap to share behind an `Arc`. Expired entries read as a
/// miss and are removed on access; [`cleanup_expired`](Self::cleanup_expired)
/// or [`spawn_cleanup`](Self::spawn_cleanup) reclaim entries nobody reads.
pub struct MemoryCache<V> {
    name: String,
    entries: DashMap<String, CachedEntry<V>>,
    config: MemoryCacheConfig,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<V> MemoryCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create a new memory cache.
    ///
    /// # Example
    ///
    /// ```
    /// use std::time::Duration;
    /// use tiercache_memory::{MemoryCache, MemoryCacheConfig};
    ///
    /// let cache: MemoryCache<String> = MemoryCache::new(
    ///     "local",
    ///     MemoryCacheConfig {
    ///         default_expiration: Some(Duration::from_secs(60)),
    ///         overwrite: true,
    ///     },
    /// );
    /// assert!(cache.is_empty());
    /// ```
    pub fn new(name: impl Into<String>, config: MemoryCacheConfig) -> Self {
        Self {
            name: name.into(),
            entries: DashMap::new(),
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &MemoryCacheConfig {
        &self.config
    }

    /// Stores `value` with an explicit lifetime, ignoring the configured
    /// default. The overwrite policy still applies.
    pub fn insert_with_expiration(
        &self,
        key: &str,
        value: V,
        expiration: Option<Duration>,
    ) -> CacheResult<()> {
        let now = Instant::now();
        let entry = CachedEntry {
            value,
            expires_at: expiration.map(|ttl| now + ttl),
        };

        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if !self.config.overwrite && !occupied.get().is_expired(now) {
                    return Err(CacheError::already_exists(key));
                }
                occupied.insert(entry);
            }
            Entry::Vacant(vacant) => {
                vacant.insert(entry);
            }
        }
        Ok(())
    }

    /// Removes `key`, returning whether a live entry was present.
    pub fn remove(&self, key: &str) -> bool {
        let now = Instant::now();
        self.entries
            .remove(key)
            .is_some_and(|(_, entry)| !entry.is_expired(now))
    }

    /// Clear all cached entries.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of stored entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> MemoryCacheStats {
        MemoryCacheStats {
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    /// Clean up expired entries.
    ///
    /// Returns the number of entries removed.
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;

        self.entries.retain(|_, entry| {
            if entry.is_expired(now) {
                removed += 1;
                false
            } else {
                true
            }
        });

        if removed > 0 {
            self.evictions.fetch_add(removed as u64, Ordering::Relaxed);
        }

        removed
    }

    /// Start background cleanup task.
    ///
    /// The task holds only a weak reference and stops once the cache is
    /// dropped. Must be called from within a tokio runtime.
    pub fn spawn_cleanup(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let cache: Weak<Self> = Arc::downgrade(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                ticker.tick().await;

                let Some(cache) = cache.upgrade() else {
                    break;
                };
                let removed = cache.cleanup_expired();
                if removed > 0 {
                    tracing::debug!(cache = %cache.name, removed, "Expired cache entries swept");
                }
            }
        })
    }
}

#[async_trait]
impl<V> Cache<V> for MemoryCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, ctx: &CacheContext, key: &str) -> CacheResult<V> {
        if let Some(err) = ctx.err() {
            return Err(err);
        }

        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired(now) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(entry.value.clone());
            }
            // Entry expired, remove it
            drop(entry);
            if self
                .entries
                .remove_if(key, |_, entry| entry.is_expired(now))
                .is_some()
            {
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        Err(CacheError::Miss)
    }

    async fn set(&self, ctx: &CacheContext, key: &str, value: &V) -> CacheResult<()> {
        if let Some(err) = ctx.err() {
            return Err(err);
        }
        self.insert_with_expiration(key, value.clone(), self.config.default_expiration)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl<V> std::fmt::Debug for MemoryCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache")
            .field("name", &self.name)
            .field("entries", &self.entries.len())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate_calculation() {
        let stats = MemoryCacheStats {
            entries: 10,
            hits: 75,
            misses: 25,
            evictions: 5,
        };

        assert!((stats.hit_rate() - 75.0).abs() < 0.001);
        assert!((MemoryCacheStats::default().hit_rate() - 0.0).abs() < 0.001);
    }

    #[test]
    fn test_entry_without_expiration_never_expires() {
        let entry = CachedEntry {
            value: 1,
            expires_at: None,
        };
        assert!(!entry.is_expired(Instant::now() + Duration::from_secs(86_400)));
    }
}
