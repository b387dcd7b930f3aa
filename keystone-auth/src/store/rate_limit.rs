use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use keystone_shared::clients::redis::RedisClient;

use super::{RateLimitStore, StoreError};

pub struct RedisRateLimitStore {
    redis: RedisClient,
}

impl RedisRateLimitStore {
    pub fn new(redis: RedisClient) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl RateLimitStore for RedisRateLimitStore {
    async fn hit(&self, key: &str, limit: u64, window: Duration) -> Result<bool, StoreError> {
        let secs = window.as_secs().max(1);
        Ok(self.redis.rate_limit_check(key, limit, secs).await?)
    }
}

/// Fixed windows held in process memory. Counts are not shared between nodes.
#[derive(Default)]
pub struct MemoryRateLimitStore {
    windows: Mutex<HashMap<String, (u64, Instant)>>,
}

impl MemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RateLimitStore for MemoryRateLimitStore {
    async fn hit(&self, key: &str, limit: u64, window: Duration) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut windows = self
            .windows
            .lock()
            .map_err(|_| StoreError::Unavailable("rate limit map poisoned".into()))?;

        let entry = windows.entry(key.to_string()).or_insert((0, now + window));
        if entry.1 <= now {
            *entry = (0, now + window);
        }
        entry.0 += 1;
        Ok(entry.0 <= limit)
    }
}
