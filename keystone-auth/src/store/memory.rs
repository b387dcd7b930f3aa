use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use keystone_shared::types::auth::OAuthProvider;

use crate::models::{IdentityLink, NewIdentityLink, NewUser, User, UserChanges};

use super::{StoreError, UserStore};

#[derive(Default)]
struct Tables {
    users: HashMap<i64, User>,
    links: Vec<IdentityLink>,
    admins: HashSet<i64>,
    next_user_id: i64,
    next_link_id: i64,
}

impl Tables {
    fn user_mut(&mut self, id: i64) -> Option<&mut User> {
        self.users.get_mut(&id)
    }
}

/// In-memory user store with the same uniqueness guarantees as the
/// Postgres schema.
#[derive(Default)]
pub struct MemoryUserStore {
    tables: Mutex<Tables>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant_admin(&self, user_id: i64) {
        if let Ok(mut tables) = self.tables.lock() {
            tables.admins.insert(user_id);
        }
    }

    pub fn user_count(&self) -> usize {
        self.tables.lock().map(|t| t.users.len()).unwrap_or(0)
    }

    pub fn link_count(&self) -> usize {
        self.tables.lock().map(|t| t.links.len()).unwrap_or(0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Unavailable("user tables poisoned".into()))
    }

    fn update<F>(&self, id: i64, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut User),
    {
        let mut tables = self.lock()?;
        if let Some(user) = tables.user_mut(id) {
            f(user);
            user.updated_at = Utc::now();
        }
        Ok(())
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let tables = self.lock()?;
        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }

    async fn get_user_by_id(&self, id: i64) -> Result<Option<User>, StoreError> {
        Ok(self.lock()?.users.get(&id).cloned())
    }

    async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        let mut tables = self.lock()?;
        if tables.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::Conflict(format!("email {} already exists", user.email)));
        }
        tables.next_user_id += 1;
        let now = Utc::now();
        let row = User {
            id: tables.next_user_id,
            email: user.email,
            name: user.name,
            avatar_url: user.avatar_url,
            password_hash: user.password_hash,
            email_verified: user.email_verified,
            verification_token: user.verification_token,
            verification_expires_at: user.verification_expires_at,
            reset_token: None,
            reset_expires_at: None,
            is_blocked: false,
            created_at: now,
            updated_at: now,
        };
        tables.users.insert(row.id, row.clone());
        Ok(row)
    }

    async fn update_user(&self, id: i64, changes: UserChanges) -> Result<(), StoreError> {
        self.update(id, |u| {
            if let Some(name) = changes.name {
                u.name = name;
            }
            if let Some(avatar) = changes.avatar_url {
                u.avatar_url = Some(avatar);
            }
        })
    }

    async fn set_verification_token(
        &self,
        id: i64,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.update(id, |u| {
            u.verification_token = Some(token.to_string());
            u.verification_expires_at = Some(expires_at);
        })
    }

    async fn set_reset_token(&self, id: i64, token: &str, expires_at: DateTime<Utc>) -> Result<(), StoreError> {
        self.update(id, |u| {
            u.reset_token = Some(token.to_string());
            u.reset_expires_at = Some(expires_at);
        })
    }

    async fn update_password(&self, id: i64, password_hash: &str) -> Result<(), StoreError> {
        self.update(id, |u| u.password_hash = Some(password_hash.to_string()))
    }

    async fn mark_email_verified(&self, id: i64) -> Result<(), StoreError> {
        self.update(id, |u| u.email_verified = true)
    }

    async fn set_blocked(&self, id: i64, blocked: bool) -> Result<(), StoreError> {
        self.update(id, |u| u.is_blocked = blocked)
    }

    async fn verify_email(&self, token: &str, now: DateTime<Utc>) -> Result<Option<User>, StoreError> {
        let mut tables = self.lock()?;
        let user = tables.users.values_mut().find(|u| {
            u.verification_token.as_deref() == Some(token)
                && u.verification_expires_at.is_some_and(|exp| exp > now)
        });
        Ok(user.map(|u| {
            u.email_verified = true;
            u.verification_token = None;
            u.verification_expires_at = None;
            u.updated_at = now;
            u.clone()
        }))
    }

    async fn reset_password(
        &self,
        token: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, StoreError> {
        let mut tables = self.lock()?;
        let user = tables.users.values_mut().find(|u| {
            u.reset_token.as_deref() == Some(token) && u.reset_expires_at.is_some_and(|exp| exp > now)
        });
        Ok(user.map(|u| {
            u.password_hash = Some(password_hash.to_string());
            u.reset_token = None;
            u.reset_expires_at = None;
            u.updated_at = now;
            u.clone()
        }))
    }

    async fn is_admin(&self, id: i64) -> Result<bool, StoreError> {
        Ok(self.lock()?.admins.contains(&id))
    }

    async fn create_link(&self, link: NewIdentityLink) -> Result<IdentityLink, StoreError> {
        let mut tables = self.lock()?;
        if tables
            .links
            .iter()
            .any(|l| l.provider == link.provider && l.external_id == link.external_id)
        {
            return Err(StoreError::Conflict(format!(
                "{} identity {} already linked",
                link.provider, link.external_id
            )));
        }
        tables.next_link_id += 1;
        let row = IdentityLink {
            id: tables.next_link_id,
            user_id: link.user_id,
            provider: link.provider,
            external_id: link.external_id,
            email: link.email,
            linked_at: Utc::now(),
        };
        tables.links.push(row.clone());
        Ok(row)
    }

    async fn get_link(
        &self,
        provider: OAuthProvider,
        external_id: &str,
    ) -> Result<Option<IdentityLink>, StoreError> {
        let tables = self.lock()?;
        Ok(tables
            .links
            .iter()
            .find(|l| l.provider == provider.as_str() && l.external_id == external_id)
            .cloned())
    }

    async fn get_links_by_user(&self, user_id: i64) -> Result<Vec<IdentityLink>, StoreError> {
        let tables = self.lock()?;
        Ok(tables.links.iter().filter(|l| l.user_id == user_id).cloned().collect())
    }

    async fn delete_link(&self, user_id: i64, provider: OAuthProvider) -> Result<bool, StoreError> {
        let mut tables = self.lock()?;
        let before = tables.links.len();
        tables
            .links
            .retain(|l| !(l.user_id == user_id && l.provider == provider.as_str()));
        Ok(tables.links.len() != before)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.lock().map(|_| ())
    }
}
