//! The cache contract implemented by every backend and decorator.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;

use crate::context::CacheContext;
use crate::error::CacheError;
use crate::CacheResult;

/// Boxed future returned by the non-`async` methods of [`Cache`].
pub type CacheFuture<'a, T> = Pin<Box<dyn Future<Output = CacheResult<T>> + Send + 'a>>;

/// The contract every cache-like component implements.
///
/// Backends, the retry decorator and the tiered composition all implement
/// this trait, so they nest freely: a tiered cache of retry-wrapped
/// backends, a retry-wrapped tiered cache, and so on.
///
/// Implementations must be safe for concurrent use (`Send + Sync`). The
/// decorators in this crate hold no mutable state of their own and rely on
/// the wrapped backends for that guarantee.
///
/// # Example
///
/// ```ignore
/// use tiercache_core::{Cache, CacheContext, CacheError};
///
/// async fn lookup(cache: &dyn Cache<String>, key: &str) -> Result<Option<String>, CacheError> {
///     match cache.get(&CacheContext::new(), key).await {
///         Ok(value) => Ok(Some(value)),
///         Err(e) if e.is_miss() => Ok(None),
///         Err(e) => Err(e),
///     }
/// }
/// ```
#[async_trait]
pub trait Cache<V>: Send + Sync {
    /// Gets the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Miss` if the key is absent. Any other error is an
    /// operational failure; no value accompanies an error.
    async fn get(&self, ctx: &CacheContext, key: &str) -> CacheResult<V>;

    /// Stores `value` under `key`.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::AlreadyExists` if the backend rejects overwrites
    /// and the key is live, or a backend-specific error otherwise.
    async fn set(&self, ctx: &CacheContext, key: &str, value: &V) -> CacheResult<()>;

    /// Repeats a `set` that failed with `previous`.
    ///
    /// The retry decorator calls this for every attempt after the first.
    /// Composite caches narrow the write to the parts that failed, so parts
    /// that already hold the value are not written twice. The default
    /// repeats the whole write.
    fn retry_set<'a>(
        &'a self,
        ctx: &'a CacheContext,
        key: &'a str,
        value: &'a V,
        previous: CacheError,
    ) -> CacheFuture<'a, ()> {
        drop(previous);
        self.set(ctx, key, value)
    }

    /// Reports liveness without touching stored data.
    ///
    /// Backends without a meaningful health check keep the default.
    async fn ping(&self) -> CacheResult<()> {
        Ok(())
    }

    /// Returns the name of this cache for logging/debugging.
    fn name(&self) -> &str;
}

#[async_trait]
impl<V, C> Cache<V> for Arc<C>
where
    V: Send + Sync,
    C: Cache<V> + ?Sized,
{
    async fn get(&self, ctx: &CacheContext, key: &str) -> CacheResult<V> {
        (**self).get(ctx, key).await
    }

    async fn set(&self, ctx: &CacheContext, key: &str, value: &V) -> CacheResult<()> {
        (**self).set(ctx, key, value).await
    }

    fn retry_set<'a>(
        &'a self,
        ctx: &'a CacheContext,
        key: &'a str,
        value: &'a V,
        previous: CacheError,
    ) -> CacheFuture<'a, ()> {
        (**self).retry_set(ctx, key, value, previous)
    }

    async fn ping(&self) -> CacheResult<()> {
        (**self).ping().await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

#[async_trait]
impl<V, C> Cache<V> for Box<C>
where
    V: Send + Sync,
    C: Cache<V> + ?Sized,
{
    async fn get(&self, ctx: &CacheContext, key: &str) -> CacheResult<V> {
        (**self).get(ctx, key).await
    }

    async fn set(&self, ctx: &CacheContext, key: &str, value: &V) -> CacheResult<()> {
        (**self).set(ctx, key, value).await
    }

    fn retry_set<'a>(
        &'a self,
        ctx: &'a CacheContext,
        key: &'a str,
        value: &'a V,
        previous: CacheError,
    ) -> CacheFuture<'a, ()> {
        (**self).retry_set(ctx, key, value, previous)
    }

    async fn ping(&self) -> CacheResult<()> {
        (**self).ping().await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::block_on;

    struct Fixed;

    #[async_trait]
    impl Cache<u32> for Fixed {
        async fn get(&self, _ctx: &CacheContext, key: &str) -> CacheResult<u32> {
            match key {
                "answer" => Ok(42),
                _ => Err(CacheError::Miss),
            }
        }

        async fn set(&self, _ctx: &CacheContext, key: &str, _value: &u32) -> CacheResult<()> {
            Err(CacheError::already_exists(key))
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    #[test]
    fn test_smart_pointers_delegate() {
        let ctx = CacheContext::new();
        let shared: Arc<dyn Cache<u32>> = Arc::new(Fixed);
        let boxed: Box<dyn Cache<u32>> = Box::new(Fixed);

        assert_eq!(block_on(Cache::<u32>::get(&shared, &ctx, "answer")).unwrap(), 42);
        assert!(block_on(Cache::<u32>::get(&boxed, &ctx, "other")).unwrap_err().is_miss());
        assert!(
            block_on(Cache::<u32>::set(&shared, &ctx, "answer", &1))
                .unwrap_err()
                .is_already_exists()
        );
        assert_eq!(Cache::<u32>::name(&boxed), "fixed");
        assert!(block_on(Cache::<u32>::ping(&boxed)).is_ok());
    }

    #[test]
    fn test_default_retry_set_repeats_the_write() {
        let ctx = CacheContext::new();
        let boxed: Box<dyn Cache<u32>> = Box::new(Fixed);

        let err = block_on(Cache::<u32>::retry_set(
            &boxed,
            &ctx,
            "answer",
            &1,
            CacheError::backend("fixed", "reset"),
        ))
        .unwrap_err();

        assert!(err.is_already_exists());
    }
}
