use std::fmt;
use std::marker::PhantomData;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Connection, Pool, PoolConfig, Runtime};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tiercache_core::{Cache, CacheContext, CacheError, CacheResult};

use crate::config::RedisCacheConfig;

/// Redis-backed cache storing JSON-encoded values.
///
/// Connections are pooled with `deadpool-redis`; the cache itself is cheap
/// to clone and share.
pub struct RedisCache<V> {
    name: String,
    pool: Pool,
    config: RedisCacheConfig,
    _value: PhantomData<fn() -> V>,
}

impl<V> Clone for RedisCache<V> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            pool: self.pool.clone(),
            config: self.config.clone(),
            _value: PhantomData,
        }
    }
}

impl<V> RedisCache<V> {
    /// Creates the connection pool. No connection is opened until the first
    /// operation; use [`Cache::ping`] to check reachability.
    pub fn connect(name: impl Into<String>, config: RedisCacheConfig) -> CacheResult<Self> {
        let name = name.into();
        let timeout = Some(config.timeout());

        let mut redis_config = deadpool_redis::Config::from_url(&config.url);
        let mut pool_config = PoolConfig::new(config.pool_size);
        pool_config.timeouts.wait = timeout;
        pool_config.timeouts.create = timeout;
        pool_config.timeouts.recycle = timeout;
        redis_config.pool = Some(pool_config);

        let pool = redis_config
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| CacheError::backend_source(name.clone(), e))?;

        tracing::info!(
            cache = %name,
            url = %config.url,
            pool_size = config.pool_size,
            "Redis cache pool created"
        );

        Ok(Self::from_pool(name, pool, config))
    }

    /// Wraps an existing pool. `config.url`, `pool_size` and `timeout_ms`
    /// are informational only.
    pub fn from_pool(name: impl Into<String>, pool: Pool, config: RedisCacheConfig) -> Self {
        Self {
            name: name.into(),
            pool,
            config,
            _value: PhantomData,
        }
    }

    pub fn config(&self) -> &RedisCacheConfig {
        &self.config
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    async fn connection(&self) -> CacheResult<Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| CacheError::backend_source(self.name.clone(), e))
    }

    fn redis_error(&self, op: &str, key: &str, error: redis::RedisError) -> CacheError {
        tracing::warn!(
            cache = %self.name,
            key = %key,
            command = op,
            error = %error,
            "Redis command failed"
        );
        CacheError::backend_source(self.name.clone(), error)
    }
}

/// Builds the `SET` command for one write.
fn set_command(
    key: &str,
    payload: &str,
    expiration: Option<Duration>,
    overwrite: bool,
) -> redis::Cmd {
    let mut cmd = redis::cmd("SET");
    cmd.arg(key).arg(payload);
    if let Some(ttl) = expiration.filter(|ttl| !ttl.is_zero()) {
        let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        cmd.arg("PX").arg(millis);
    }
    if !overwrite {
        cmd.arg("NX");
    }
    cmd
}

#[async_trait]
impl<V> Cache<V> for RedisCache<V>
where
    V: Serialize + DeserializeOwned + Send + Sync,
{
    async fn get(&self, ctx: &CacheContext, key: &str) -> CacheResult<V> {
        let full_key = self.config.full_key(key);

        let raw = ctx
            .run(async {
                let mut conn = self.connection().await?;
                let reply: Option<String> = redis::cmd("GET")
                    .arg(&full_key)
                    .query_async(&mut conn)
                    .await
                    .map_err(|e| self.redis_error("GET", key, e))?;
                Ok(reply)
            })
            .await?;

        match raw {
            Some(raw) => serde_json::from_str(&raw).map_err(|e| {
                CacheError::serialization(format!("decoding value for key {key:?}: {e}"))
            }),
            None => {
                tracing::debug!(cache = %self.name, key = %key, "cache miss");
                Err(CacheError::Miss)
            }
        }
    }

    async fn set(&self, ctx: &CacheContext, key: &str, value: &V) -> CacheResult<()> {
        let payload = serde_json::to_string(value).map_err(|e| {
            CacheError::serialization(format!("encoding value for key {key:?}: {e}"))
        })?;
        let cmd = set_command(
            &self.config.full_key(key),
            &payload,
            self.config.expiration,
            self.config.overwrite,
        );

        let stored = ctx
            .run(async {
                let mut conn = self.connection().await?;
                // `SET ... NX` replies nil when the key already exists.
                let reply: Option<String> = cmd
                    .query_async(&mut conn)
                    .await
                    .map_err(|e| self.redis_error("SET", key, e))?;
                Ok(reply.is_some())
            })
            .await?;

        if !stored {
            return Err(CacheError::already_exists(key));
        }
        tracing::debug!(cache = %self.name, key = %key, "cache set");
        Ok(())
    }

    async fn ping(&self) -> CacheResult<()> {
        let mut conn = self.connection().await?;
        let _pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::backend_source(self.name.clone(), e))?;
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl<V> fmt::Debug for RedisCache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisCache")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish()
    }
}
