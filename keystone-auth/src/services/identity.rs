use std::sync::Arc;

use keystone_shared::types::auth::OAuthProvider;

use crate::error::{AuthError, AuthResult};
use crate::models::{NewIdentityLink, NewUser, User, UserChanges};
use crate::services::oauth::ExternalProfile;
use crate::services::password::CredentialHasher;
use crate::store::{StoreError, UserStore};

/// How an OAuth login mapped onto the user table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The external identity was already linked.
    Existing,
    /// Linked to a user that already held the provider's email.
    Linked,
    /// A fresh user was created for this identity.
    Created,
}

impl Resolution {
    pub fn is_new_user(&self) -> bool {
        matches!(self, Resolution::Created)
    }
}

/// Trims and lowercases; all store lookups by email go through this.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub struct IdentityResolver {
    users: Arc<dyn UserStore>,
    hasher: Arc<dyn CredentialHasher>,
}

impl IdentityResolver {
    pub fn new(users: Arc<dyn UserStore>, hasher: Arc<dyn CredentialHasher>) -> Self {
        Self { users, hasher }
    }

    pub async fn resolve_oauth(
        &self,
        provider: OAuthProvider,
        profile: &ExternalProfile,
    ) -> AuthResult<(User, Resolution)> {
        if profile.external_id.trim().is_empty() {
            return Err(AuthError::Validation("provider returned no subject id".into()));
        }
        let email = normalize_email(&profile.email);
        if email.is_empty() {
            return Err(AuthError::Validation("provider did not share an email address".into()));
        }

        let (user, resolution) = match self.users.get_link(provider, &profile.external_id).await? {
            Some(link) => {
                let user = self
                    .users
                    .get_user_by_id(link.user_id)
                    .await?
                    .ok_or(AuthError::DanglingLink(link.user_id))?;
                (user, Resolution::Existing)
            }
            None => match self.users.get_user_by_email(&email).await? {
                Some(existing) => self.link_existing(provider, profile, &email, existing).await?,
                None => self.create_from_profile(provider, profile, &email).await?,
            },
        };

        if user.is_blocked {
            tracing::info!(user_id = user.id, provider = %provider, "oauth login refused, account blocked");
            return Err(AuthError::AccountBlocked);
        }

        tracing::info!(
            user_id = user.id,
            provider = %provider,
            resolution = ?resolution,
            "oauth identity resolved"
        );
        Ok((user, resolution))
    }

    async fn link_existing(
        &self,
        provider: OAuthProvider,
        profile: &ExternalProfile,
        email: &str,
        user: User,
    ) -> AuthResult<(User, Resolution)> {
        match self.create_link(user.id, provider, profile, email).await {
            Ok(()) => {}
            // Lost a race with a concurrent login for the same identity.
            Err(AuthError::Store(StoreError::Conflict(_))) => {
                return self.reload_linked(provider, &profile.external_id).await;
            }
            Err(e) => return Err(e),
        }

        if user.avatar_url.is_none() {
            if let Some(avatar) = &profile.avatar_url {
                let changes = UserChanges {
                    avatar_url: Some(avatar.clone()),
                    ..Default::default()
                };
                if let Err(e) = self.users.update_user(user.id, changes).await {
                    tracing::warn!(user_id = user.id, error = %e, "failed to adopt provider avatar");
                }
            }
        }

        if !user.email_verified {
            match self.users.mark_email_verified(user.id).await {
                Ok(()) => tracing::info!(user_id = user.id, provider = %provider, "email verified by provider"),
                Err(e) => tracing::warn!(user_id = user.id, error = %e, "failed to auto-verify email"),
            }
        }

        let refreshed = self.users.get_user_by_id(user.id).await?.unwrap_or(user);
        Ok((refreshed, Resolution::Linked))
    }

    async fn create_from_profile(
        &self,
        provider: OAuthProvider,
        profile: &ExternalProfile,
        email: &str,
    ) -> AuthResult<(User, Resolution)> {
        let new_user = NewUser {
            email: email.to_string(),
            name: display_name(profile, email),
            avatar_url: profile.avatar_url.clone(),
            password_hash: None,
            email_verified: true,
            verification_token: None,
            verification_expires_at: None,
        };

        let user = match self.users.create_user(new_user).await {
            Ok(user) => user,
            // A password registration or another OAuth login won the race for this email.
            Err(StoreError::Conflict(_)) => {
                let existing = self
                    .users
                    .get_user_by_email(email)
                    .await?
                    .ok_or_else(|| AuthError::Internal(format!("user {email} vanished after conflict")))?;
                return self.link_existing(provider, profile, email, existing).await;
            }
            Err(e) => return Err(e.into()),
        };

        match self.create_link(user.id, provider, profile, email).await {
            Ok(()) => Ok((user, Resolution::Created)),
            Err(AuthError::Store(StoreError::Conflict(_))) => {
                self.reload_linked(provider, &profile.external_id).await
            }
            Err(e) => Err(e),
        }
    }

    async fn create_link(
        &self,
        user_id: i64,
        provider: OAuthProvider,
        profile: &ExternalProfile,
        email: &str,
    ) -> AuthResult<()> {
        let link = NewIdentityLink {
            user_id,
            provider: provider.to_string(),
            external_id: profile.external_id.clone(),
            email: email.to_string(),
        };
        self.users.create_link(link).await?;
        Ok(())
    }

    async fn reload_linked(&self, provider: OAuthProvider, external_id: &str) -> AuthResult<(User, Resolution)> {
        let link = self
            .users
            .get_link(provider, external_id)
            .await?
            .ok_or_else(|| AuthError::Internal("identity link vanished after conflict".into()))?;
        let user = self
            .users
            .get_user_by_id(link.user_id)
            .await?
            .ok_or(AuthError::DanglingLink(link.user_id))?;
        Ok((user, Resolution::Existing))
    }

    /// Unknown email, passwordless account and wrong password all fail the same way.
    pub async fn resolve_local(&self, email: &str, password: &str) -> AuthResult<User> {
        let email = normalize_email(email);
        let user = self
            .users
            .get_user_by_email(&email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        let digest = user.password_hash.as_deref().ok_or(AuthError::InvalidCredentials)?;
        if !self.hasher.verify(password, digest)? {
            return Err(AuthError::InvalidCredentials);
        }

        if user.is_blocked {
            return Err(AuthError::AccountBlocked);
        }
        Ok(user)
    }
}

fn display_name(profile: &ExternalProfile, email: &str) -> String {
    let name = profile.name.trim();
    if !name.is_empty() {
        return name.to_string();
    }
    email.split('@').next().unwrap_or(email).to_string()
}
