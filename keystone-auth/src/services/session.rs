use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use subtle::ConstantTimeEq;

use keystone_shared::types::auth::DeviceType;

use crate::error::AuthResult;
use crate::store::{self, CredentialStore, StoreError};

pub fn session_key(user_id: i64, device: DeviceType) -> String {
    format!("refresh:{user_id}:{device}")
}

/// Owns the single live refresh credential per (user, device).
pub struct SessionManager {
    store: Arc<dyn CredentialStore>,
    op_timeout: Duration,
}

impl SessionManager {
    pub fn new(store: Arc<dyn CredentialStore>, op_timeout: Duration) -> Self {
        Self { store, op_timeout }
    }

    async fn bounded<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        store::bounded(self.op_timeout, op).await
    }

    /// Overwrites whatever the device held before.
    pub async fn persist(&self, user_id: i64, device: DeviceType, token: &str, ttl: Duration) -> AuthResult<()> {
        let key = session_key(user_id, device);
        self.bounded(self.store.set(&key, token, ttl)).await?;
        tracing::debug!(user_id, device = %device, "session persisted");
        Ok(())
    }

    /// Fails closed: read errors and timeouts count as "not live".
    pub async fn validate(&self, user_id: i64, device: DeviceType, candidate: &str) -> bool {
        let key = session_key(user_id, device);
        match self.bounded(self.store.get(&key)).await {
            Ok(Some(stored)) => bool::from(stored.as_bytes().ct_eq(candidate.as_bytes())),
            Ok(None) => false,
            Err(e) => {
                tracing::warn!(user_id, device = %device, error = %e, "session lookup failed");
                false
            }
        }
    }

    pub async fn revoke(&self, user_id: i64, device: DeviceType) -> AuthResult<()> {
        let key = session_key(user_id, device);
        self.bounded(self.store.delete(&key)).await?;
        tracing::debug!(user_id, device = %device, "session revoked");
        Ok(())
    }

    /// Best effort across devices; only fails when no device could be revoked.
    pub async fn revoke_all(&self, user_id: i64) -> AuthResult<()> {
        let mut last_error = None;
        let mut revoked = 0usize;

        for device in DeviceType::ALL {
            match self.revoke(user_id, device).await {
                Ok(()) => revoked += 1,
                Err(e) => {
                    tracing::warn!(user_id, device = %device, error = %e, "device revoke failed");
                    last_error = Some(e);
                }
            }
        }

        match (revoked, last_error) {
            (0, Some(e)) => Err(e),
            _ => Ok(()),
        }
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        self.bounded(self.store.ping()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuthError;
    use crate::store::MemoryCredentialStore;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::Mutex;

    const TTL: Duration = Duration::from_secs(60);

    fn manager() -> SessionManager {
        SessionManager::new(Arc::new(MemoryCredentialStore::new()), Duration::from_secs(1))
    }

    /// Fails deletes for the listed keys and every read.
    struct FlakyStore {
        inner: MemoryCredentialStore,
        failing_deletes: Mutex<HashSet<String>>,
    }

    #[async_trait]
    impl CredentialStore for FlakyStore {
        async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
            self.inner.set(key, value, ttl).await
        }
        async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::Unavailable("down".into()))
        }
        async fn delete(&self, key: &str) -> Result<(), StoreError> {
            if self.failing_deletes.lock().unwrap().contains(key) {
                return Err(StoreError::Unavailable("down".into()));
            }
            self.inner.delete(key).await
        }
        async fn ping(&self) -> Result<(), StoreError> {
            Ok(())
        }
    }

    fn flaky(failing: &[String]) -> SessionManager {
        let store = FlakyStore {
            inner: MemoryCredentialStore::new(),
            failing_deletes: Mutex::new(failing.iter().cloned().collect()),
        };
        SessionManager::new(Arc::new(store), Duration::from_secs(1))
    }

    #[test]
    fn key_layout() {
        assert_eq!(session_key(7, DeviceType::Web), "refresh:7:web");
        assert_eq!(session_key(7, DeviceType::Mobile), "refresh:7:mobile");
    }

    #[tokio::test]
    async fn devices_are_independent() {
        let sessions = manager();
        sessions.persist(1, DeviceType::Web, "w", TTL).await.unwrap();
        sessions.persist(1, DeviceType::Mobile, "m", TTL).await.unwrap();

        sessions.revoke(1, DeviceType::Web).await.unwrap();
        assert!(!sessions.validate(1, DeviceType::Web, "w").await);
        assert!(sessions.validate(1, DeviceType::Mobile, "m").await);
    }

    #[tokio::test]
    async fn persist_overwrites_previous_token() {
        let sessions = manager();
        sessions.persist(1, DeviceType::Web, "old", TTL).await.unwrap();
        sessions.persist(1, DeviceType::Web, "new", TTL).await.unwrap();
        assert!(!sessions.validate(1, DeviceType::Web, "old").await);
        assert!(sessions.validate(1, DeviceType::Web, "new").await);
    }

    #[tokio::test]
    async fn revoke_is_idempotent() {
        let sessions = manager();
        sessions.revoke(1, DeviceType::Web).await.unwrap();
        sessions.revoke(1, DeviceType::Web).await.unwrap();
    }

    #[tokio::test]
    async fn revoke_all_clears_every_device() {
        let sessions = manager();
        sessions.persist(1, DeviceType::Web, "w", TTL).await.unwrap();
        sessions.persist(1, DeviceType::Mobile, "m", TTL).await.unwrap();
        sessions.persist(2, DeviceType::Web, "other", TTL).await.unwrap();

        sessions.revoke_all(1).await.unwrap();
        assert!(!sessions.validate(1, DeviceType::Web, "w").await);
        assert!(!sessions.validate(1, DeviceType::Mobile, "m").await);
        assert!(sessions.validate(2, DeviceType::Web, "other").await);
    }

    #[tokio::test]
    async fn revoke_all_tolerates_partial_failure() {
        let sessions = flaky(&[session_key(1, DeviceType::Web)]);
        assert!(sessions.revoke_all(1).await.is_ok());
    }

    #[tokio::test]
    async fn revoke_all_fails_when_every_device_fails() {
        let sessions = flaky(&[session_key(1, DeviceType::Web), session_key(1, DeviceType::Mobile)]);
        assert!(matches!(
            sessions.revoke_all(1).await,
            Err(AuthError::Store(StoreError::Unavailable(_)))
        ));
    }

    #[tokio::test]
    async fn read_failure_fails_closed() {
        let sessions = flaky(&[]);
        sessions.persist(1, DeviceType::Web, "w", TTL).await.unwrap();
        assert!(!sessions.validate(1, DeviceType::Web, "w").await);
    }
}
