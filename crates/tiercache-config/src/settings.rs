use std::time::Duration;

use serde::{Deserialize, Serialize};
use tiercache_core::{BackoffPolicy, RetryConfig, WriteBack};
use tiercache_memory::MemoryCacheConfig;
use tiercache_redis::RedisCacheConfig;

use crate::error::ConfigError;

/// Top-level configuration of a cache stack.
///
/// Every duration is an integer number of milliseconds; `0` disables the
/// corresponding limit where noted.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CacheSettings {
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Backoff applied to tiers with `retry = true`
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub tiered: TieredSettings,
    /// Ordered fastest first
    #[serde(default)]
    pub tiers: Vec<TierSettings>,
}

impl CacheSettings {
    /// Parses settings from a TOML document without validating them.
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        toml::from_str(input).map_err(|e| ConfigError::parse(e.to_string()))
    }

    /// Renders the settings as TOML.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::parse(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(ConfigError::validation(format!(
                "logging.level must be one of {valid_levels:?}"
            )));
        }

        // Retry validation
        self.retry
            .to_retry_config()
            .backoff
            .validate()
            .map_err(|e| ConfigError::validation(format!("retry: {e}")))?;

        // Tier validation
        if self.tiers.is_empty() {
            return Err(ConfigError::missing("tiers"));
        }
        for (index, tier) in self.tiers.iter().enumerate() {
            tier.validate(index)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Backoff settings shared by every retrying tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_initial_interval_ms")]
    pub initial_interval_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default = "default_randomization_factor")]
    pub randomization_factor: f64,
    #[serde(default = "default_max_interval_ms")]
    pub max_interval_ms: u64,
    /// 0 = no elapsed-time budget
    #[serde(default = "default_max_elapsed_time_ms")]
    pub max_elapsed_time_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// 0 = attempts bounded only by the caller's deadline
    #[serde(default = "default_attempt_timeout_ms")]
    pub attempt_timeout_ms: u64,
}

fn default_initial_interval_ms() -> u64 {
    500
}

fn default_multiplier() -> f64 {
    1.5
}

fn default_randomization_factor() -> f64 {
    0.5
}

fn default_max_interval_ms() -> u64 {
    60_000
}

fn default_max_elapsed_time_ms() -> u64 {
    15 * 60 * 1000
}

fn default_max_retries() -> u32 {
    3
}

fn default_attempt_timeout_ms() -> u64 {
    5000
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            initial_interval_ms: default_initial_interval_ms(),
            multiplier: default_multiplier(),
            randomization_factor: default_randomization_factor(),
            max_interval_ms: default_max_interval_ms(),
            max_elapsed_time_ms: default_max_elapsed_time_ms(),
            max_retries: default_max_retries(),
            attempt_timeout_ms: default_attempt_timeout_ms(),
        }
    }
}

impl RetrySettings {
    pub fn to_retry_config(&self) -> RetryConfig {
        let backoff = BackoffPolicy {
            initial_interval: Duration::from_millis(self.initial_interval_ms),
            multiplier: self.multiplier,
            randomization_factor: self.randomization_factor,
            max_interval: Duration::from_millis(self.max_interval_ms),
            max_elapsed_time: non_zero_millis(self.max_elapsed_time_ms),
            max_retries: self.max_retries,
        };
        RetryConfig::new(backoff).with_attempt_timeout(non_zero_millis(self.attempt_timeout_ms))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TieredSettings {
    /// Name used in logs for the composed cache
    #[serde(default = "default_tiered_name")]
    pub name: String,
    #[serde(default)]
    pub write_back: WriteBackMode,
}

fn default_tiered_name() -> String {
    "tiercache".into()
}

impl Default for TieredSettings {
    fn default() -> Self {
        Self {
            name: default_tiered_name(),
            write_back: WriteBackMode::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WriteBackMode {
    #[default]
    Sync,
    Background,
}

impl From<WriteBackMode> for WriteBack {
    fn from(mode: WriteBackMode) -> Self {
        match mode {
            WriteBackMode::Sync => WriteBack::Sync,
            WriteBackMode::Background => WriteBack::Background,
        }
    }
}

/// One tier of the stack, selected by `kind`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TierSettings {
    Memory(MemoryTierSettings),
    Redis(RedisTierSettings),
}

impl TierSettings {
    pub fn name(&self) -> &str {
        match self {
            Self::Memory(tier) => &tier.name,
            Self::Redis(tier) => &tier.name,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Memory(_) => "memory",
            Self::Redis(_) => "redis",
        }
    }

    pub fn retry(&self) -> bool {
        match self {
            Self::Memory(tier) => tier.retry,
            Self::Redis(tier) => tier.retry,
        }
    }

    fn validate(&self, index: usize) -> Result<(), ConfigError> {
        if self.name().trim().is_empty() {
            return Err(ConfigError::missing(format!("tiers[{index}].name")));
        }
        match self {
            Self::Memory(_) => Ok(()),
            Self::Redis(tier) => {
                tier.url(index)?;
                if tier.pool_size == 0 {
                    return Err(ConfigError::validation(format!(
                        "tiers[{index}].pool_size must be > 0"
                    )));
                }
                if tier.timeout_ms == 0 {
                    return Err(ConfigError::validation(format!(
                        "tiers[{index}].timeout_ms must be > 0"
                    )));
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryTierSettings {
    #[serde(default = "default_memory_name")]
    pub name: String,
    /// 0 = entries never expire
    #[serde(default = "default_expiration_ms")]
    pub default_expiration_ms: u64,
    #[serde(default = "default_memory_overwrite")]
    pub overwrite: bool,
    /// 0 = expired entries are only removed when read
    #[serde(default = "default_cleanup_interval_ms")]
    pub cleanup_interval_ms: u64,
    #[serde(default)]
    pub retry: bool,
}

fn default_memory_name() -> String {
    "memory".into()
}

fn default_expiration_ms() -> u64 {
    5 * 60 * 1000
}

fn default_memory_overwrite() -> bool {
    true
}

fn default_cleanup_interval_ms() -> u64 {
    60_000
}

impl Default for MemoryTierSettings {
    fn default() -> Self {
        Self {
            name: default_memory_name(),
            default_expiration_ms: default_expiration_ms(),
            overwrite: default_memory_overwrite(),
            cleanup_interval_ms: default_cleanup_interval_ms(),
            retry: false,
        }
    }
}

impl MemoryTierSettings {
    pub fn to_config(&self) -> MemoryCacheConfig {
        MemoryCacheConfig {
            default_expiration: non_zero_millis(self.default_expiration_ms),
            overwrite: self.overwrite,
        }
    }

    pub fn cleanup_interval(&self) -> Option<Duration> {
        non_zero_millis(self.cleanup_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisTierSettings {
    #[serde(default = "default_redis_name")]
    pub name: String,
    /// Redis connection URL (e.g., "redis://localhost:6379"); required
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_redis_pool_size")]
    pub pool_size: usize,
    #[serde(default = "default_redis_timeout_ms")]
    pub timeout_ms: u64,
    /// 0 = keys never expire
    #[serde(default = "default_expiration_ms")]
    pub expiration_ms: u64,
    #[serde(default)]
    pub overwrite: bool,
    #[serde(default)]
    pub key_prefix: Option<String>,
    #[serde(default = "default_redis_retry")]
    pub retry: bool,
}

fn default_redis_name() -> String {
    "redis".into()
}

fn default_redis_pool_size() -> usize {
    16
}

fn default_redis_timeout_ms() -> u64 {
    5000
}

fn default_redis_retry() -> bool {
    true
}

impl RedisTierSettings {
    fn url(&self, index: usize) -> Result<&str, ConfigError> {
        self.url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| ConfigError::missing(format!("tiers[{index}].url")))
    }

    pub fn to_config(&self, index: usize) -> Result<RedisCacheConfig, ConfigError> {
        Ok(RedisCacheConfig {
            url: self.url(index)?.to_string(),
            pool_size: self.pool_size,
            timeout_ms: self.timeout_ms,
            expiration: non_zero_millis(self.expiration_ms),
            overwrite: self.overwrite,
            key_prefix: self.key_prefix.clone(),
        })
    }
}

fn non_zero_millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}
