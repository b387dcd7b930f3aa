use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use keystone_shared::types::auth::OAuthProvider;

use crate::models::{IdentityLink, NewIdentityLink, NewUser, User, UserChanges};

pub mod credential;
pub mod memory;
pub mod postgres;
pub mod rate_limit;

pub use credential::{MemoryCredentialStore, RedisCredentialStore};
pub use rate_limit::{MemoryRateLimitStore, RedisRateLimitStore};
pub use memory::MemoryUserStore;
pub use postgres::PgUserStore;

#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store operation timed out")]
    Timeout,
}

/// Key-value store holding one refresh credential per (user, device).
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    /// Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Per-key request counter over a fixed window.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Counts one hit against `key`; `false` once the window holds more
    /// than `limit` hits.
    async fn hit(&self, key: &str, limit: u64, window: Duration) -> Result<bool, StoreError>;
}

/// Relational store for users and their external identity links.
///
/// Emails handed to this trait are already normalised; implementations
/// compare them verbatim.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn get_user_by_id(&self, id: i64) -> Result<Option<User>, StoreError>;
    /// Fails with `Conflict` when the email is taken.
    async fn create_user(&self, user: NewUser) -> Result<User, StoreError>;
    async fn update_user(&self, id: i64, changes: UserChanges) -> Result<(), StoreError>;
    async fn set_verification_token(
        &self,
        id: i64,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;
    async fn set_reset_token(&self, id: i64, token: &str, expires_at: DateTime<Utc>) -> Result<(), StoreError>;
    async fn update_password(&self, id: i64, password_hash: &str) -> Result<(), StoreError>;
    async fn mark_email_verified(&self, id: i64) -> Result<(), StoreError>;
    async fn set_blocked(&self, id: i64, blocked: bool) -> Result<(), StoreError>;

    /// Atomically marks the holder of `token` verified and clears the token,
    /// provided its expiry is strictly after `now`. Returns `None` and leaves
    /// every row untouched otherwise.
    async fn verify_email(&self, token: &str, now: DateTime<Utc>) -> Result<Option<User>, StoreError>;

    /// Same contract as `verify_email`, replacing the password digest and
    /// clearing the reset token.
    async fn reset_password(
        &self,
        token: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, StoreError>;

    async fn is_admin(&self, id: i64) -> Result<bool, StoreError>;

    /// Fails with `Conflict` when (provider, external_id) is already claimed.
    async fn create_link(&self, link: NewIdentityLink) -> Result<IdentityLink, StoreError>;
    async fn get_link(
        &self,
        provider: OAuthProvider,
        external_id: &str,
    ) -> Result<Option<IdentityLink>, StoreError>;
    async fn get_links_by_user(&self, user_id: i64) -> Result<Vec<IdentityLink>, StoreError>;
    /// Returns whether a link was removed.
    async fn delete_link(&self, user_id: i64, provider: OAuthProvider) -> Result<bool, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

/// Bounds a store call. An elapsed deadline becomes `StoreError::Timeout`.
pub(crate) async fn bounded<T, F>(limit: Duration, op: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    tokio::time::timeout(limit, op)
        .await
        .map_err(|_| StoreError::Timeout)?
}
