//! Multi-level cache composition.
//!
//! ## Lookup Order
//!
//! ```text
//! get(key) → tier 0 → tier 1 → ... → tier N-1
//!              miss     miss          hit ──┐
//!               ▲        ▲                  │
//!               └────────┴── write-back ◄───┘
//! ```
//!
//! Tiers are queried strictly in order, never in parallel. The first tier
//! that answers with a value or a non-miss error ends the search. A value
//! found at tier `k` is written back into tiers `0..k`; failures there are
//! logged and never reach the caller. A non-miss error is returned as-is so
//! that an outage is not mistaken for a miss.
//!
//! ## Write Strategy
//!
//! `set` writes every tier, even after one fails, and reports all failures
//! together as [`CacheError::Tiers`]. Repeating such a write through
//! [`Cache::retry_set`] only touches the tiers whose failure was retryable;
//! tiers that already hold the value are left alone.

use std::fmt;

use async_trait::async_trait;

use crate::cache::{Cache, CacheFuture};
use crate::context::CacheContext;
use crate::error::{CacheError, TierErrors};
use crate::{CacheResult, DynCache};

/// When write-back into faster tiers happens relative to `get` returning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WriteBack {
    /// Populate faster tiers before `get` returns.
    #[default]
    Sync,
    /// Spawn population onto the tokio runtime; `get` returns immediately.
    /// The spawned task inherits the caller's context, so cancelling it
    /// also aborts pending population.
    Background,
}

/// An ordered set of caches, fastest first, presented as one cache.
///
/// The composition holds no data and no mutable state after construction.
pub struct TieredCache<V> {
    name: String,
    tiers: Vec<DynCache<V>>,
    write_back: WriteBack,
}

impl<V> TieredCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create a tiered cache from tiers ordered fastest to slowest.
    ///
    /// `name` identifies this composition in log events. An empty tier list
    /// yields a cache that always misses and accepts every write.
    #[must_use]
    pub fn new(name: impl Into<String>, tiers: Vec<DynCache<V>>) -> Self {
        let name = name.into();
        if tiers.is_empty() {
            tracing::warn!(cache = %name, "tiered cache created without tiers; every get will miss");
        } else {
            tracing::debug!(
                cache = %name,
                tiers = ?tiers.iter().map(|t| t.name()).collect::<Vec<_>>(),
                "tiered cache created"
            );
        }
        Self {
            name,
            tiers,
            write_back: WriteBack::default(),
        }
    }

    /// Set the write-back policy.
    #[must_use]
    pub fn with_write_back(mut self, write_back: WriteBack) -> Self {
        self.write_back = write_back;
        self
    }

    #[must_use]
    pub fn write_back(&self) -> WriteBack {
        self.write_back
    }

    #[must_use]
    pub fn tiers(&self) -> &[DynCache<V>] {
        &self.tiers
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }

    async fn write_back_to(&self, ctx: &CacheContext, key: &str, value: &V, hit_tier: usize) {
        if hit_tier == 0 {
            return;
        }

        match self.write_back {
            WriteBack::Sync => {
                populate(&self.name, ctx, key, value, &self.tiers[..hit_tier]).await;
            }
            WriteBack::Background => match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let name = self.name.clone();
                    let ctx = ctx.clone();
                    let key = key.to_string();
                    let value = value.clone();
                    let tiers = self.tiers[..hit_tier].to_vec();
                    handle.spawn(async move {
                        populate(&name, &ctx, &key, &value, &tiers).await;
                    });
                }
                Err(_) => {
                    tracing::debug!(
                        cache = %self.name,
                        "no tokio runtime for background write-back, populating inline"
                    );
                    populate(&self.name, ctx, key, value, &self.tiers[..hit_tier]).await;
                }
            },
        }
    }
}

/// Best-effort write of `value` into each of `tiers`.
async fn populate<V>(name: &str, ctx: &CacheContext, key: &str, value: &V, tiers: &[DynCache<V>])
where
    V: Send + Sync,
{
    for (index, tier) in tiers.iter().enumerate() {
        if let Err(e) = tier.set(ctx, key, value).await {
            tracing::warn!(
                cache = name,
                tier = index,
                tier_name = tier.name(),
                key,
                error = %e,
                "failed populating cache tier"
            );
        }
    }
}

impl<V> fmt::Debug for TieredCache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TieredCache")
            .field("name", &self.name)
            .field(
                "tiers",
                &self.tiers.iter().map(|t| t.name()).collect::<Vec<_>>(),
            )
            .field("write_back", &self.write_back)
            .finish()
    }
}

#[async_trait]
impl<V> Cache<V> for TieredCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, ctx: &CacheContext, key: &str) -> CacheResult<V> {
        for (index, tier) in self.tiers.iter().enumerate() {
            match tier.get(ctx, key).await {
                Ok(value) => {
                    tracing::trace!(cache = %self.name, tier = index, key, "cache hit");
                    self.write_back_to(ctx, key, &value, index).await;
                    return Ok(value);
                }
                Err(e) if e.is_miss() => {
                    tracing::trace!(cache = %self.name, tier = index, key, "cache miss");
                }
                Err(e) => {
                    tracing::debug!(
                        cache = %self.name,
                        tier = index,
                        tier_name = tier.name(),
                        key,
                        error = %e,
                        "cache tier failed"
                    );
                    return Err(e);
                }
            }
        }
        Err(CacheError::Miss)
    }

    async fn set(&self, ctx: &CacheContext, key: &str, value: &V) -> CacheResult<()> {
        let mut errors = TierErrors::new(key);
        for (index, tier) in self.tiers.iter().enumerate() {
            if let Err(e) = tier.set(ctx, key, value).await {
                errors.push(index, tier.name(), e);
            }
        }
        errors.into_result()
    }

    fn retry_set<'a>(
        &'a self,
        ctx: &'a CacheContext,
        key: &'a str,
        value: &'a V,
        previous: CacheError,
    ) -> CacheFuture<'a, ()> {
        Box::pin(async move {
            let CacheError::Tiers(previous) = previous else {
                return self.set(ctx, key, value).await;
            };

            let mut errors = TierErrors::new(key);
            for failure in previous.into_vec() {
                let tier = match self.tiers.get(failure.index) {
                    Some(tier) if failure.error.is_retryable() => tier,
                    // Final failures are reported again without touching the tier.
                    _ => {
                        errors.push(failure.index, failure.name, failure.error);
                        continue;
                    }
                };
                tracing::debug!(
                    cache = %self.name,
                    tier = failure.index,
                    tier_name = tier.name(),
                    key,
                    "repeating failed tier write"
                );
                if let Err(e) = tier.retry_set(ctx, key, value, failure.error).await {
                    errors.push(failure.index, tier.name(), e);
                }
            }
            errors.into_result()
        })
    }

    async fn ping(&self) -> CacheResult<()> {
        for (index, tier) in self.tiers.iter().enumerate() {
            if let Err(e) = tier.ping().await {
                tracing::warn!(
                    cache = %self.name,
                    tier = index,
                    tier_name = tier.name(),
                    error = %e,
                    "cache tier ping failed"
                );
                return Err(e);
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
