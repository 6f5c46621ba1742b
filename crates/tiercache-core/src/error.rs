//! Error and miss signaling shared by every cache layer.
//!
//! Two conditions drive control flow across layers: [`CacheError::Miss`]
//! (the key is absent) and [`CacheError::AlreadyExists`] (a no-overwrite
//! backend rejected a write). Layers must hand these back unchanged so that
//! callers and the tiered cache can branch on the variant.

use std::fmt;

/// Boxed error used as the source of backend failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur during cache operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The key is not present. This is a normal result, not a failure.
    #[error("cache miss")]
    Miss,

    /// A write was rejected because the key is live and the backend does not
    /// allow overwrites.
    #[error("cache entry already exists: {key}")]
    AlreadyExists {
        /// The key that was already present.
        key: String,
    },

    /// The backend failed (I/O, transport, pool exhaustion, ...).
    #[error("{backend} error: {message}")]
    Backend {
        /// Name of the backend that failed.
        backend: String,
        /// Description of the failure.
        message: String,
        /// Underlying error, if any.
        #[source]
        source: Option<BoxError>,
    },

    /// A value could not be encoded or decoded.
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of the encoding failure.
        message: String,
    },

    /// The operation's deadline passed before it completed.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,

    /// One or more tiers failed during a fan-out write.
    #[error("{0}")]
    Tiers(TierErrors),
}

impl CacheError {
    /// Creates a new `AlreadyExists` error.
    #[must_use]
    pub fn already_exists(key: impl Into<String>) -> Self {
        Self::AlreadyExists { key: key.into() }
    }

    /// Creates a new `Backend` error without an underlying source.
    #[must_use]
    pub fn backend(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Backend {
            backend: backend.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new `Backend` error wrapping the underlying failure.
    #[must_use]
    pub fn backend_source<E>(backend: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Backend {
            backend: backend.into(),
            message: source.to_string(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a new `Serialization` error.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Returns `true` if this is a cache miss.
    #[must_use]
    pub fn is_miss(&self) -> bool {
        matches!(self, Self::Miss)
    }

    /// Returns `true` if a write was rejected by a no-overwrite policy.
    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    /// Returns `true` for cancellation and deadline errors.
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineExceeded)
    }

    /// Returns `true` if repeating the operation may succeed.
    ///
    /// Misses, rejected writes, encoding failures and caller cancellation
    /// are final. A tier aggregate is retryable when any of its failures is;
    /// repeating it through [`Cache::retry_set`](crate::Cache::retry_set)
    /// rewrites only those tiers.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Backend { .. } | Self::DeadlineExceeded => true,
            Self::Tiers(errors) => errors.iter().any(|f| f.error.is_retryable()),
            Self::Miss
            | Self::AlreadyExists { .. }
            | Self::Serialization { .. }
            | Self::Cancelled => false,
        }
    }

    /// Returns the per-tier failures if this is a tier aggregate.
    #[must_use]
    pub fn tier_errors(&self) -> Option<&TierErrors> {
        match self {
            Self::Tiers(errors) => Some(errors),
            _ => None,
        }
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Miss => ErrorCategory::Miss,
            Self::AlreadyExists { .. } => ErrorCategory::Conflict,
            Self::Backend { .. } => ErrorCategory::Backend,
            Self::Serialization { .. } => ErrorCategory::Serialization,
            Self::DeadlineExceeded => ErrorCategory::Timeout,
            Self::Cancelled => ErrorCategory::Cancelled,
            Self::Tiers(_) => ErrorCategory::Partial,
        }
    }
}

impl From<TierErrors> for CacheError {
    fn from(errors: TierErrors) -> Self {
        Self::Tiers(errors)
    }
}

/// Categories of cache errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Key not present.
    Miss,
    /// Write rejected by a no-overwrite policy.
    Conflict,
    /// Backend or transport failure.
    Backend,
    /// Value encoding failure.
    Serialization,
    /// Deadline exceeded.
    Timeout,
    /// Cancelled by the caller.
    Cancelled,
    /// Some tiers of a composition failed.
    Partial,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Miss => write!(f, "miss"),
            Self::Conflict => write!(f, "conflict"),
            Self::Backend => write!(f, "backend"),
            Self::Serialization => write!(f, "serialization"),
            Self::Timeout => write!(f, "timeout"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Partial => write!(f, "partial"),
        }
    }
}

// =============================================================================
// Tier aggregate
// =============================================================================

/// A single tier's failure inside a [`TierErrors`] aggregate.
#[derive(Debug)]
pub struct TierFailure {
    /// Position of the tier, 0 being the fastest.
    pub index: usize,
    /// Name reported by the tier.
    pub name: String,
    /// The error the tier returned.
    pub error: CacheError,
}

/// Failures collected from a fan-out write, in tier order.
#[derive(Debug)]
pub struct TierErrors {
    key: String,
    failures: Vec<TierFailure>,
}

impl TierErrors {
    /// Creates an empty aggregate for writes of `key`.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            failures: Vec::new(),
        }
    }

    /// Records a tier failure.
    pub fn push(&mut self, index: usize, name: impl Into<String>, error: CacheError) {
        self.failures.push(TierFailure {
            index,
            name: name.into(),
            error,
        });
    }

    /// The key whose write failed.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TierFailure> {
        self.failures.iter()
    }

    /// Returns the failure recorded for the tier at `index`.
    #[must_use]
    pub fn for_tier(&self, index: usize) -> Option<&TierFailure> {
        self.failures.iter().find(|f| f.index == index)
    }

    /// Converts the aggregate into a result: `Ok` when nothing failed.
    pub fn into_result(self) -> Result<(), CacheError> {
        if self.failures.is_empty() {
            Ok(())
        } else {
            Err(CacheError::Tiers(self))
        }
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<TierFailure> {
        self.failures
    }
}

impl fmt::Display for TierErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed setting cache key {:?}: ", self.key)?;
        for (i, failure) in self.failures.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(
                f,
                "tier {} ({}): {}",
                failure.index, failure.name, failure.error
            )?;
        }
        Ok(())
    }
}
