use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;

use crate::{Client, CustomRedisError};

/// A Redis-backed cache-store client over a single multiplexed connection.
///
/// The connection is established once, at construction time, and shared by
/// every pipeline invocation afterwards. Construct this before accepting
/// events so that initialization never races with event processing.
pub struct RedisClient {
    connection: MultiplexedConnection,
}

impl RedisClient {
    /// Connect with no response or connection timeout.
    pub async fn new(addr: String) -> Result<RedisClient, CustomRedisError> {
        Self::with_timeouts(addr, None, None).await
    }

    /// Connect with optional response and connection timeouts. `None` means
    /// the operation blocks indefinitely.
    pub async fn with_timeouts(
        addr: String,
        response_timeout: Option<Duration>,
        connection_timeout: Option<Duration>,
    ) -> Result<RedisClient, CustomRedisError> {
        let client = redis::Client::open(addr)?;

        let mut config = redis::AsyncConnectionConfig::new();
        if let Some(timeout) = response_timeout {
            config = config.set_response_timeout(timeout);
        }
        if let Some(timeout) = connection_timeout {
            config = config.set_connection_timeout(timeout);
        }

        let connection = client
            .get_multiplexed_async_connection_with_config(&config)
            .await?;

        Ok(RedisClient { connection })
    }
}

#[async_trait]
impl Client for RedisClient {
    async fn setex(&self, k: String, v: String, seconds: u64) -> Result<(), CustomRedisError> {
        let mut conn = self.connection.clone();
        conn.set_ex::<_, _, ()>(k, v, seconds).await?;
        Ok(())
    }

    async fn get(&self, k: String) -> Result<String, CustomRedisError> {
        let mut conn = self.connection.clone();
        let raw_bytes: Vec<u8> = conn.get(k).await?;

        // return NotFound error when empty
        if raw_bytes.is_empty() {
            return Err(CustomRedisError::NotFound);
        }

        Ok(String::from_utf8(raw_bytes)?)
    }

    async fn exists(&self, k: String) -> Result<bool, CustomRedisError> {
        let mut conn = self.connection.clone();
        let result = conn.exists(k).await?;
        Ok(result)
    }

    async fn ttl(&self, k: String) -> Result<i64, CustomRedisError> {
        let mut conn = self.connection.clone();
        let result = conn.ttl(k).await?;
        Ok(result)
    }
}
