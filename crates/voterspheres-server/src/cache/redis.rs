//! Redis primary backend

use async_trait::async_trait;
use fred::prelude::{ClientLike, EventInterface, KeysInterface, Pool, ReconnectPolicy};
use fred::types::config::Config as RedisConfig;
use fred::types::{Builder, Expiration};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

use super::{CacheBackend, CacheError, CacheResult};

/// Connections in the fred pool
pub const DEFAULT_POOL_SIZE: usize = 4;

#[derive(Clone)]
pub struct RedisBackend {
    pool: Pool,
}

impl RedisBackend {
    /// Build the pool and start connecting.
    ///
    /// Waits up to `connect_timeout` for the first connection. If Redis is not
    /// reachable by then the backend is still returned; commands fail (and the
    /// facade falls back) until the reconnect policy gets through.
    pub async fn connect(
        url: &str,
        pool_size: usize,
        command_timeout: Duration,
        connect_timeout: Duration,
    ) -> CacheResult<Self> {
        let config = RedisConfig::from_url(url).map_err(|e| CacheError::Config(e.to_string()))?;

        let pool = Builder::from_config(config)
            .with_connection_config(|config| {
                config.internal_command_timeout = command_timeout;
            })
            .with_performance_config(|config| {
                config.default_command_timeout = command_timeout;
            })
            // max_attempts = 0: keep reconnecting forever
            .set_policy(ReconnectPolicy::new_exponential(0, 100, 30_000, 2))
            .build_pool(pool_size.max(1))
            .map_err(|e| CacheError::Config(e.to_string()))?;

        for client in pool.clients() {
            let mut error_rx = client.error_rx();
            tokio::spawn(async move {
                loop {
                    match error_rx.recv().await {
                        Ok((error, _server)) => error!("Redis client error: {error:?}"),
                        Err(RecvError::Lagged(_)) => continue,
                        Err(RecvError::Closed) => break,
                    }
                }
            });
        }

        let _handles = pool.connect_pool();
        match tokio::time::timeout(connect_timeout, pool.wait_for_connect()).await {
            Ok(Ok(())) => info!(pool_size, "Connected to Redis"),
            Ok(Err(e)) => warn!(error = %e, "Redis connection failed, serving from local cache"),
            Err(_) => warn!(
                timeout_ms = connect_timeout.as_millis() as u64,
                "Redis not reachable yet, serving from local cache"
            ),
        }

        Ok(Self { pool })
    }

    pub async fn quit(&self) {
        if let Err(e) = self.pool.quit().await {
            debug!(error = %e, "Redis quit failed");
        }
    }
}

#[async_trait]
impl CacheBackend for RedisBackend {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        self.pool
            .get::<Option<String>, _>(key)
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        let seconds = ttl.as_secs().max(1) as i64;
        self.pool
            .set::<(), _, _>(key, value, Some(Expiration::EX(seconds)), None, false)
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.pool
            .del::<(), _>(key)
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))
    }
}
