//! Bounded, jittered exponential backoff.

use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;

/// Parameters governing retry delay growth and the retry budget.
///
/// Both ceilings are enforced: retrying stops at `max_retries` retries or
/// once `max_elapsed_time` would be exceeded, whichever comes first.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    pub initial_interval: Duration,
    /// Growth factor applied per retry.
    pub multiplier: f64,
    /// Jitter factor in `[0, 1]`; the delay is scaled by a uniform factor in
    /// `[1 - r, 1 + r]`.
    pub randomization_factor: f64,
    /// Cap on the un-jittered delay.
    pub max_interval: Duration,
    /// Total time budget measured from the first attempt. `None` disables it.
    pub max_elapsed_time: Option<Duration>,
    /// Retries allowed after the first attempt.
    pub max_retries: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(500),
            multiplier: 1.5,
            randomization_factor: 0.5,
            max_interval: Duration::from_secs(60),
            max_elapsed_time: Some(Duration::from_secs(15 * 60)),
            max_retries: 3,
        }
    }
}

impl BackoffPolicy {
    /// A policy that never retries.
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// A deterministic policy with fast timeouts for tests.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            initial_interval: Duration::from_millis(10),
            multiplier: 2.0,
            randomization_factor: 0.0,
            max_interval: Duration::from_millis(100),
            max_elapsed_time: Some(Duration::from_secs(5)),
            max_retries: 3,
        }
    }

    #[must_use]
    pub fn with_initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = interval;
        self
    }

    #[must_use]
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    #[must_use]
    pub fn with_randomization_factor(mut self, factor: f64) -> Self {
        self.randomization_factor = factor;
        self
    }

    #[must_use]
    pub fn with_max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }

    #[must_use]
    pub fn with_max_elapsed_time(mut self, budget: Option<Duration>) -> Self {
        self.max_elapsed_time = budget;
        self
    }

    #[must_use]
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Checks that the parameters describe a usable policy.
    pub fn validate(&self) -> Result<(), String> {
        if self.initial_interval.is_zero() {
            return Err("initial_interval must be > 0".into());
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(format!("multiplier must be >= 1.0, got {}", self.multiplier));
        }
        if !(0.0..=1.0).contains(&self.randomization_factor) {
            return Err(format!(
                "randomization_factor must be within [0, 1], got {}",
                self.randomization_factor
            ));
        }
        if self.max_interval < self.initial_interval {
            return Err("max_interval must be >= initial_interval".into());
        }
        if self.max_elapsed_time.is_some_and(|budget| budget.is_zero()) {
            return Err("max_elapsed_time must be > 0 when set".into());
        }
        Ok(())
    }

    /// The un-jittered delay before retry `retry` (0-based):
    /// `min(max_interval, initial_interval * multiplier^retry)`.
    #[must_use]
    pub fn base_delay(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let scaled = self.initial_interval.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = scaled.min(self.max_interval.as_secs_f64());
        if capped.is_finite() && capped >= 0.0 {
            Duration::from_secs_f64(capped)
        } else {
            self.max_interval
        }
    }

    /// Starts a fresh backoff sequence; the elapsed-time budget starts now.
    #[must_use]
    pub fn start(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            policy: self.clone(),
            started: Instant::now(),
            retries: 0,
        }
    }
}

/// Running state of one retry sequence.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    policy: BackoffPolicy,
    started: Instant,
    retries: u32,
}

impl ExponentialBackoff {
    /// Returns the delay before the next retry, or `None` once the retry
    /// count or the elapsed-time budget is exhausted.
    pub fn next_backoff(&mut self) -> Option<Duration> {
        if self.retries >= self.policy.max_retries {
            return None;
        }

        let delay = randomize(
            self.policy.base_delay(self.retries),
            self.policy.randomization_factor,
        );

        if let Some(budget) = self.policy.max_elapsed_time {
            if self.started.elapsed() + delay > budget {
                return None;
            }
        }

        self.retries += 1;
        Some(delay)
    }

    /// Retries handed out so far.
    #[must_use]
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Time since the sequence started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Restarts the sequence and its elapsed-time budget.
    pub fn reset(&mut self) {
        self.started = Instant::now();
        self.retries = 0;
    }

    #[must_use]
    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }
}

/// Scales `delay` by a uniform factor in `[1 - factor, 1 + factor]`.
///
/// Policies are not required to pass [`BackoffPolicy::validate`], so a
/// non-finite factor disables jitter and anything above 1 is clamped.
fn randomize(delay: Duration, factor: f64) -> Duration {
    let factor = if factor.is_finite() { factor.min(1.0) } else { 0.0 };
    if factor <= 0.0 || delay.is_zero() {
        return delay;
    }
    let secs = delay.as_secs_f64();
    let delta = factor * secs;
    let jittered = rand::thread_rng().gen_range((secs - delta)..=(secs + delta));
    Duration::try_from_secs_f64(jittered.max(0.0)).unwrap_or(delay)
}
