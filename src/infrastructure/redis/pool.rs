//! Redis connection pool for the queue storage backend.

use redis::aio::MultiplexedConnection;
use redis::{Client, RedisError, RedisResult};
use tokio::sync::RwLock;

use crate::config::RedisConfig;

/// Error type for Redis pool operations.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// Redis operation failed
    #[error("Redis error: {0}")]
    Redis(#[from] RedisError),

    /// Connection not available
    #[error("Connection not available: {0}")]
    ConnectionUnavailable(String),
}

/// Redis connection pool for data operations.
///
/// Holds one multiplexed connection shared across tasks. The connection is
/// opened lazily and dropped after connection-level failures so the next
/// call reconnects.
pub struct RedisPool {
    client: Client,
    connection: RwLock<Option<MultiplexedConnection>>,
    config: RedisConfig,
}

impl RedisPool {
    /// Create a new Redis pool. Does not connect.
    pub fn new(config: RedisConfig) -> Result<Self, PoolError> {
        let client = Client::open(config.url.as_str())?;

        Ok(Self {
            client,
            connection: RwLock::new(None),
            config,
        })
    }

    /// Get a connection, establishing one if none exists.
    pub async fn get_connection(&self) -> Result<MultiplexedConnection, PoolError> {
        {
            let conn = self.connection.read().await;
            if let Some(ref c) = *conn {
                return Ok(c.clone());
            }
        }

        self.connect().await
    }

    async fn connect(&self) -> Result<MultiplexedConnection, PoolError> {
        let mut conn_guard = self.connection.write().await;

        // Another task may have connected while we waited
        if let Some(ref c) = *conn_guard {
            return Ok(c.clone());
        }

        match self.client.get_multiplexed_tokio_connection().await {
            Ok(conn) => {
                *conn_guard = Some(conn.clone());
                tracing::info!("Redis pool connection established");
                Ok(conn)
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to connect to Redis");
                Err(PoolError::ConnectionUnavailable(e.to_string()))
            }
        }
    }

    /// Run a command against the shared connection.
    ///
    /// Dropped or broken connections are discarded so the next call
    /// reconnects.
    pub async fn execute<F, T, Fut>(&self, f: F) -> Result<T, PoolError>
    where
        F: FnOnce(MultiplexedConnection) -> Fut,
        Fut: std::future::Future<Output = RedisResult<T>>,
    {
        let conn = self.get_connection().await?;

        match f(conn).await {
            Ok(result) => Ok(result),
            Err(e) => {
                if e.is_connection_dropped() || e.is_io_error() {
                    let mut conn_guard = self.connection.write().await;
                    *conn_guard = None;
                    tracing::warn!(error = %e, "Redis connection lost, will reconnect");
                }
                Err(PoolError::Redis(e))
            }
        }
    }

    /// Get the Redis URL (for debugging).
    pub fn url(&self) -> &str {
        &self.config.url
    }

    /// Ping Redis to check connectivity.
    pub async fn ping(&self) -> Result<(), PoolError> {
        let _: String = self
            .execute(|mut conn| async move { redis::cmd("PING").query_async(&mut conn).await })
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_creation_does_not_connect() {
        let pool = RedisPool::new(RedisConfig {
            url: "redis://127.0.0.1:1".to_string(),
        })
        .unwrap();

        assert_eq!(pool.url(), "redis://127.0.0.1:1");
    }

    #[test]
    fn test_invalid_url_rejected() {
        let result = RedisPool::new(RedisConfig {
            url: "not a url".to_string(),
        });

        assert!(matches!(result, Err(PoolError::Redis(_))));
    }

    #[tokio::test]
    async fn test_unreachable_server_reports_unavailable() {
        let pool = RedisPool::new(RedisConfig {
            url: "redis://127.0.0.1:1".to_string(),
        })
        .unwrap();

        let result = pool.ping().await;
        assert!(matches!(result, Err(PoolError::ConnectionUnavailable(_))));
    }
}
