use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::{Client, CustomRedisError};

/// A call-recording mock of the cache-store client.
///
/// Writes succeed unless a return value is stubbed for the key; reads miss
/// unless stubbed. Every call is recorded so tests can assert on the exact
/// sequence of keys, values and TTLs written.
#[derive(Clone, Default)]
pub struct MockRedisClient {
    setex_ret: HashMap<String, Result<(), CustomRedisError>>,
    get_ret: HashMap<String, Result<String, CustomRedisError>>,
    exists_ret: HashMap<String, bool>,
    ttl_ret: HashMap<String, i64>,
    calls: Arc<Mutex<Vec<MockRedisCall>>>,
}

#[derive(Debug, Clone)]
pub enum MockRedisValue {
    None,
    String(String),
    StringWithTtl(String, u64),
}

#[derive(Debug, Clone)]
pub struct MockRedisCall {
    pub op: String,
    pub key: String,
    pub value: MockRedisValue,
}

impl MockRedisClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_calls(&self) -> std::sync::MutexGuard<'_, Vec<MockRedisCall>> {
        match self.calls.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn setex_ret(&mut self, key: &str, ret: Result<(), CustomRedisError>) -> Self {
        self.setex_ret.insert(key.to_owned(), ret);
        self.clone()
    }

    pub fn get_ret(&mut self, key: &str, ret: Result<String, CustomRedisError>) -> Self {
        self.get_ret.insert(key.to_owned(), ret);
        self.clone()
    }

    pub fn exists_ret(&mut self, key: &str, ret: bool) -> Self {
        self.exists_ret.insert(key.to_owned(), ret);
        self.clone()
    }

    pub fn ttl_ret(&mut self, key: &str, ret: i64) -> Self {
        self.ttl_ret.insert(key.to_owned(), ret);
        self.clone()
    }

    pub fn get_calls(&self) -> Vec<MockRedisCall> {
        self.lock_calls().clone()
    }

    /// The subset of recorded calls that were writes, as `(key, value, ttl)`.
    pub fn writes(&self) -> Vec<(String, String, u64)> {
        self.lock_calls()
            .iter()
            .filter_map(|call| match &call.value {
                MockRedisValue::StringWithTtl(value, ttl) if call.op == "setex" => {
                    Some((call.key.clone(), value.clone(), *ttl))
                }
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl Client for MockRedisClient {
    async fn setex(&self, key: String, value: String, seconds: u64) -> Result<(), CustomRedisError> {
        self.lock_calls().push(MockRedisCall {
            op: "setex".to_string(),
            key: key.clone(),
            value: MockRedisValue::StringWithTtl(value, seconds),
        });

        self.setex_ret.get(&key).cloned().unwrap_or(Ok(()))
    }

    async fn get(&self, key: String) -> Result<String, CustomRedisError> {
        self.lock_calls().push(MockRedisCall {
            op: "get".to_string(),
            key: key.clone(),
            value: MockRedisValue::None,
        });

        self.get_ret
            .get(&key)
            .cloned()
            .unwrap_or(Err(CustomRedisError::NotFound))
    }

    async fn exists(&self, key: String) -> Result<bool, CustomRedisError> {
        self.lock_calls().push(MockRedisCall {
            op: "exists".to_string(),
            key: key.clone(),
            value: MockRedisValue::None,
        });

        Ok(self.exists_ret.get(&key).copied().unwrap_or(false))
    }

    async fn ttl(&self, key: String) -> Result<i64, CustomRedisError> {
        self.lock_calls().push(MockRedisCall {
            op: "ttl".to_string(),
            key: key.clone(),
            value: MockRedisValue::None,
        });

        // -2 is what redis reports for a missing key
        Ok(self.ttl_ret.get(&key).copied().unwrap_or(-2))
    }
}
