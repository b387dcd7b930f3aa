use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use keystone_shared::clients::redis::RedisClient;

use super::{CredentialStore, StoreError};

impl From<redis::RedisError> for StoreError {
    fn from(e: redis::RedisError) -> Self {
        if e.is_timeout() {
            StoreError::Timeout
        } else {
            StoreError::Unavailable(e.to_string())
        }
    }
}

pub struct RedisCredentialStore {
    redis: RedisClient,
}

impl RedisCredentialStore {
    pub fn new(redis: RedisClient) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl CredentialStore for RedisCredentialStore {
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        // SET EX rejects a zero expiry.
        let secs = ttl.as_secs().max(1);
        Ok(self.redis.set(key, value, secs).await?)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.redis.get(key).await?)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        Ok(self.redis.del(key).await?)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(self.redis.ping().await?)
    }
}

/// Process-local store with per-key expiry, for tests and single-node dev runs.
#[derive(Default)]
pub struct MemoryCredentialStore {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, (String, Instant)>>, StoreError> {
        self.entries
            .lock()
            .map_err(|_| StoreError::Unavailable("credential map poisoned".into()))
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let expires = Instant::now() + ttl;
        self.lock()?.insert(key.to_string(), (value.to_string(), expires));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut entries = self.lock()?;
        match entries.get(key) {
            Some((_, expires)) if *expires <= Instant::now() => {
                entries.remove(key);
                Ok(None)
            }
            Some((value, _)) => Ok(Some(value.clone())),
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.lock()?.remove(key);
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.lock().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_overwrites_and_deletes() {
        let store = MemoryCredentialStore::new();
        store.set("k", "one", Duration::from_secs(60)).await.unwrap();
        store.set("k", "two", Duration::from_secs(60)).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("two"));

        store.delete("k").await.unwrap();
        store.delete("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn memory_store_honours_ttl() {
        let store = MemoryCredentialStore::new();
        store.set("k", "v", Duration::from_millis(20)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
    }
}
