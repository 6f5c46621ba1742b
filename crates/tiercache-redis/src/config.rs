use std::time::Duration;

/// Connection and write policy for [`RedisCache`](crate::RedisCache).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisCacheConfig {
    /// Redis connection URL, e.g. `redis://127.0.0.1:6379`.
    pub url: String,
    /// Maximum number of pooled connections.
    pub pool_size: usize,
    /// Timeout for waiting on, creating and recycling pooled connections.
    pub timeout_ms: u64,
    /// Lifetime of written keys. `None` stores keys without expiry.
    pub expiration: Option<Duration>,
    /// Whether `set` may replace an existing key.
    pub overwrite: bool,
    /// Prepended to every key, e.g. `"sessions:"`.
    pub key_prefix: Option<String>,
}

impl Default for RedisCacheConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            pool_size: 16,
            timeout_ms: 5000,
            expiration: Some(Duration::from_secs(5 * 60)),
            overwrite: false,
            key_prefix: None,
        }
    }
}

impl RedisCacheConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// The key as stored in Redis.
    pub(crate) fn full_key(&self, key: &str) -> String {
        match &self.key_prefix {
            Some(prefix) => format!("{prefix}{key}"),
            None => key.to_string(),
        }
    }
}
