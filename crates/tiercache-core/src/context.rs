//! Cancellation and deadline propagation for cache operations.
//!
//! Every cache operation receives a [`CacheContext`]. Child contexts share
//! the parent's cancellation: cancelling a parent aborts every in-flight
//! child operation and pending backoff sleep, while cancelling a child never
//! reaches the parent.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::CacheError;
use crate::CacheResult;

/// Cancellation token plus optional deadline carried by every operation.
#[derive(Debug, Clone, Default)]
pub struct CacheContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl CacheContext {
    /// Creates a root context with no deadline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a root context bound to an existing cancellation token.
    #[must_use]
    pub fn from_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Creates a child context with the same deadline.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Creates a child context that expires after `timeout`, or at the
    /// parent's deadline if that comes first.
    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Creates a child context that expires at `deadline`, or at the
    /// parent's deadline if that comes first.
    #[must_use]
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(parent) if parent < deadline => parent,
            _ => deadline,
        };
        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
        }
    }

    /// Cancels this context and all of its children.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, `None` when there is no deadline.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// The underlying cancellation token.
    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Returns why the context is done, or `None` while it is still live.
    #[must_use]
    pub fn err(&self) -> Option<CacheError> {
        if self.token.is_cancelled() {
            return Some(CacheError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(CacheError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Runs `fut` until it completes, the context is cancelled, or the
    /// deadline passes. Cancellation wins ties.
    pub async fn run<T, F>(&self, fut: F) -> CacheResult<T>
    where
        F: Future<Output = CacheResult<T>>,
    {
        if let Some(err) = self.err() {
            return Err(err);
        }

        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(CacheError::Cancelled),
            _ = deadline_elapsed(self.deadline) => Err(CacheError::DeadlineExceeded),
            result = fut => result,
        }
    }

    /// Sleeps for `duration` unless the context finishes first.
    pub async fn sleep(&self, duration: Duration) -> CacheResult<()> {
        self.run(async {
            tokio::time::sleep(duration).await;
            Ok(())
        })
        .await
    }
}

async fn deadline_elapsed(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parent_cancel_reaches_child() {
        let parent = CacheContext::new();
        let child = parent.child();
        let grandchild = child.with_timeout(Duration::from_secs(5));

        parent.cancel();

        assert!(child.is_cancelled());
        assert!(grandchild.is_cancelled());
        assert!(matches!(grandchild.err(), Some(CacheError::Cancelled)));
    }

    #[test]
    fn test_child_cancel_does_not_reach_parent() {
        let parent = CacheContext::new();
        let child = parent.child();

        child.cancel();

        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());
        assert!(parent.err().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_child_deadline_never_outlives_parent() {
        let parent = CacheContext::new().with_timeout(Duration::from_millis(100));
        let child = parent.with_timeout(Duration::from_secs(10));
        assert_eq!(child.deadline(), parent.deadline());

        let tighter = parent.with_timeout(Duration::from_millis(10));
        assert!(tighter.deadline() < parent.deadline());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_returns_deadline_exceeded() {
        let ctx = CacheContext::new().with_timeout(Duration::from_millis(50));

        let result: CacheResult<()> = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(CacheError::DeadlineExceeded)));
        assert!(matches!(ctx.err(), Some(CacheError::DeadlineExceeded)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_passes_through_result() {
        let ctx = CacheContext::new().with_timeout(Duration::from_secs(1));

        let value = ctx.run(async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);

        let miss: CacheResult<u8> = ctx.run(async { Err(CacheError::Miss) }).await;
        assert!(miss.unwrap_err().is_miss());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_is_cancelled_promptly() {
        let ctx = CacheContext::new();
        let sleeper = ctx.clone();

        let handle = tokio::spawn(async move { sleeper.sleep(Duration::from_secs(3600)).await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        ctx.cancel();

        let result = handle.await.unwrap();
        assert!(matches!(result, Err(CacheError::Cancelled)));
    }

    #[tokio::test]
    async fn test_run_on_cancelled_context_skips_future() {
        let ctx = CacheContext::new();
        ctx.cancel();

        let polled = std::sync::atomic::AtomicBool::new(false);
        let result: CacheResult<()> = ctx
            .run(async {
                polled.store(true, std::sync::atomic::Ordering::SeqCst);
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(CacheError::Cancelled)));
        assert!(!polled.load(std::sync::atomic::Ordering::SeqCst));
    }
}
