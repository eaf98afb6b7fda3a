use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

pub mod cache;
pub mod client;
pub mod metrics;
pub mod mock;

pub use client::RedisClient;
pub use mock::MockRedisClient;

#[derive(Error, Debug, Clone)]
pub enum CustomRedisError {
    #[error("not found in redis")]
    NotFound,
    #[error("parse error: {0}")]
    ParseError(String),
    #[error("timeout error")]
    Timeout,
    #[error(transparent)]
    Redis(#[from] Arc<redis::RedisError>),
}

impl From<redis::RedisError> for CustomRedisError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_timeout() {
            CustomRedisError::Timeout
        } else {
            CustomRedisError::Redis(Arc::new(err))
        }
    }
}

impl From<std::string::FromUtf8Error> for CustomRedisError {
    fn from(err: std::string::FromUtf8Error) -> Self {
        CustomRedisError::ParseError(err.to_string())
    }
}

/// The key-value operations the enrichment pipeline needs from the cache
/// store: set-with-expiry plus the read-side operations consumers use to
/// validate freshness.
#[async_trait]
pub trait Client {
    async fn setex(&self, k: String, v: String, seconds: u64) -> Result<(), CustomRedisError>;
    async fn get(&self, k: String) -> Result<String, CustomRedisError>;
    async fn exists(&self, k: String) -> Result<bool, CustomRedisError>;
    async fn ttl(&self, k: String) -> Result<i64, CustomRedisError>;
}
