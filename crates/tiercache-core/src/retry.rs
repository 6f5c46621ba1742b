//! Automatic retry decorator with bounded exponential backoff.
//!
//! [`RetryCache`] wraps any [`Cache`] and re-runs failed `get`/`set` calls
//! under a [`BackoffPolicy`]. Each attempt runs under its own deadline
//! derived from the caller's context. A miss is a final answer and is never
//! retried; neither are other non-retryable errors (see
//! [`CacheError::is_retryable`]).
//!
//! A repeated `set` goes through [`Cache::retry_set`] with the previous
//! error, so a composite inner cache only rewrites the parts that failed.
//!
//! When the budget runs out the caller receives exactly the inner cache's
//! last error. If the caller's context finishes first, the operation fails
//! with `Cancelled` or `DeadlineExceeded`.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::backoff::BackoffPolicy;
use crate::cache::{Cache, CacheFuture};
use crate::context::CacheContext;
use crate::error::CacheError;
use crate::CacheResult;

/// Configuration for the retry decorator.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Delay growth and retry budget.
    pub backoff: BackoffPolicy,
    /// Deadline applied to each individual attempt. `None` leaves attempts
    /// bounded only by the caller's context.
    pub attempt_timeout: Option<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            backoff: BackoffPolicy::default(),
            attempt_timeout: Some(Duration::from_secs(5)),
        }
    }
}

impl RetryConfig {
    #[must_use]
    pub fn new(backoff: BackoffPolicy) -> Self {
        Self {
            backoff,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_attempt_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// A configuration for testing with fast, deterministic timings.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            backoff: BackoffPolicy::for_testing(),
            attempt_timeout: Some(Duration::from_millis(200)),
        }
    }
}

/// The cache operation being retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Get,
    Set,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => write!(f, "get"),
            Self::Set => write!(f, "set"),
        }
    }
}

/// Details of a failed attempt that is about to be retried.
#[derive(Debug)]
pub struct RetryEvent<'a> {
    pub operation: Operation,
    pub key: &'a str,
    /// The attempt that just failed, starting at 1.
    pub attempt: u32,
    pub error: &'a CacheError,
    /// Delay before the next attempt.
    pub backoff: Duration,
}

/// Receives one notification per retry. Does not affect control flow.
pub trait RetryNotify: Send + Sync {
    fn on_retry(&self, event: &RetryEvent<'_>);
}

impl<F> RetryNotify for F
where
    F: Fn(&RetryEvent<'_>) + Send + Sync,
{
    fn on_retry(&self, event: &RetryEvent<'_>) {
        self(event)
    }
}

/// Cache decorator that retries transient failures of the wrapped cache.
pub struct RetryCache<C> {
    inner: C,
    config: RetryConfig,
    notify: Option<Arc<dyn RetryNotify>>,
}

impl<C> RetryCache<C> {
    /// Wraps `inner` with the given retry configuration.
    #[must_use]
    pub fn new(inner: C, config: RetryConfig) -> Self {
        Self {
            inner,
            config,
            notify: None,
        }
    }

    /// Registers a callback invoked once per retry, in addition to logging.
    #[must_use]
    pub fn with_notify(mut self, notify: impl RetryNotify + 'static) -> Self {
        self.notify = Some(Arc::new(notify));
        self
    }

    #[must_use]
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Get a reference to the wrapped cache.
    #[must_use]
    pub fn inner(&self) -> &C {
        &self.inner
    }

    #[must_use]
    pub fn into_inner(self) -> C {
        self.inner
    }

    async fn execute<T, F, Fut>(
        &self,
        ctx: &CacheContext,
        operation: Operation,
        cache_name: &str,
        key: &str,
        mut previous: Option<CacheError>,
        mut attempt_fn: F,
    ) -> CacheResult<T>
    where
        F: FnMut(CacheContext, Option<CacheError>) -> Fut + Send,
        Fut: Future<Output = CacheResult<T>> + Send,
        T: Send,
    {
        let mut backoff = self.config.backoff.start();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            let attempt_ctx = match self.config.attempt_timeout {
                Some(timeout) => ctx.with_timeout(timeout),
                None => ctx.child(),
            };

            let attempt_fut = attempt_fn(attempt_ctx.clone(), previous.take());
            let error = match attempt_ctx.run(attempt_fut).await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::debug!(
                            cache = cache_name,
                            %operation,
                            key,
                            attempt,
                            "cache operation succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(e) => e,
            };

            if !error.is_retryable() {
                return Err(error);
            }

            // The caller's own context finished; the attempt error is only a symptom.
            if let Some(ctx_error) = ctx.err() {
                return Err(ctx_error);
            }

            let Some(delay) = backoff.next_backoff() else {
                tracing::warn!(
                    cache = cache_name,
                    %operation,
                    key,
                    attempts = attempt,
                    elapsed_ms = backoff.elapsed().as_millis() as u64,
                    error = %error,
                    "cache operation failed, retry budget exhausted"
                );
                return Err(error);
            };

            tracing::warn!(
                cache = cache_name,
                %operation,
                key,
                attempt,
                max_retries = self.config.backoff.max_retries,
                error = %error,
                backoff_ms = delay.as_millis() as u64,
                "cache operation failed, retrying"
            );

            if let Some(notify) = &self.notify {
                notify.on_retry(&RetryEvent {
                    operation,
                    key,
                    attempt,
                    error: &error,
                    backoff: delay,
                });
            }

            ctx.sleep(delay).await?;
            previous = Some(error);
        }
    }

    async fn write<V>(
        &self,
        ctx: &CacheContext,
        key: &str,
        value: &V,
        previous: Option<CacheError>,
    ) -> CacheResult<()>
    where
        V: Send + Sync,
        C: Cache<V>,
    {
        let inner = &self.inner;
        self.execute(
            ctx,
            Operation::Set,
            inner.name(),
            key,
            previous,
            move |attempt_ctx, previous| async move {
                match previous {
                    Some(previous) => inner.retry_set(&attempt_ctx, key, value, previous).await,
                    None => inner.set(&attempt_ctx, key, value).await,
                }
            },
        )
        .await
    }
}

impl<C> fmt::Debug for RetryCache<C>
where
    C: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryCache")
            .field("inner", &self.inner)
            .field("config", &self.config)
            .field("notify", &self.notify.is_some())
            .finish()
    }
}

#[async_trait]
impl<V, C> Cache<V> for RetryCache<C>
where
    V: Send + Sync,
    C: Cache<V>,
{
    async fn get(&self, ctx: &CacheContext, key: &str) -> CacheResult<V> {
        let inner = &self.inner;
        self.execute(
            ctx,
            Operation::Get,
            inner.name(),
            key,
            None,
            move |attempt_ctx, _| async move { inner.get(&attempt_ctx, key).await },
        )
        .await
    }

    async fn set(&self, ctx: &CacheContext, key: &str, value: &V) -> CacheResult<()> {
        self.write(ctx, key, value, None).await
    }

    fn retry_set<'a>(
        &'a self,
        ctx: &'a CacheContext,
        key: &'a str,
        value: &'a V,
        previous: CacheError,
    ) -> CacheFuture<'a, ()> {
        Box::pin(self.write(ctx, key, value, Some(previous)))
    }

    async fn ping(&self) -> CacheResult<()> {
        self.inner.ping().await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
