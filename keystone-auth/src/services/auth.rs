use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use keystone_shared::types::auth::{DeviceType, OAuthProvider, TokenPair};
use keystone_shared::types::HealthCheck;

use crate::config::{SigningConfig, TokenPolicy};
use crate::error::{AuthError, AuthResult};
use crate::mail::{EmailMessage, Mailer};
use crate::models::{IdentityLink, NewUser, User};
use crate::services::identity::{normalize_email, IdentityResolver};
use crate::services::oauth::ProviderRegistry;
use crate::services::password::{generate_token, validate_password, CredentialHasher};
use crate::services::session::SessionManager;
use crate::services::signing::TokenSigner;
use crate::store::{CredentialStore, StoreError, UserStore};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "invalid email format"))]
    pub email: String,
    #[validate(length(min = 1, max = 100, message = "name must be between 1 and 100 characters"))]
    pub name: String,
    pub password: String,
}

/// Proof of identity handed over by an OAuth client.
#[derive(Debug, Clone)]
pub enum OAuthGrant {
    /// Authorization code from the consent redirect.
    Code(String),
    /// Google ID token or Facebook access token obtained on-device.
    Token(String),
}

#[derive(Debug, Serialize)]
pub struct AuthSession {
    pub user: User,
    #[serde(flatten)]
    pub tokens: TokenPair,
    pub is_admin: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_new_user: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct LinkedProvider {
    pub provider: OAuthProvider,
    pub linked_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct LinkedAccounts {
    pub email: String,
    pub password_set: bool,
    pub google: Option<LinkedProvider>,
    pub facebook: Option<LinkedProvider>,
}

#[derive(Debug, Serialize)]
pub struct Profile {
    pub user: User,
    pub is_admin: bool,
    pub linked_accounts: LinkedAccounts,
}

#[derive(Debug, Serialize)]
pub struct AuthorizationUrl {
    pub url: String,
    pub state: String,
}

/// Collaborators the orchestrator is assembled from.
pub struct AuthServiceParts {
    pub users: Arc<dyn UserStore>,
    pub credentials: Arc<dyn CredentialStore>,
    pub hasher: Arc<dyn CredentialHasher>,
    pub providers: ProviderRegistry,
    pub mailer: Arc<dyn Mailer>,
    pub signing: SigningConfig,
    pub tokens: TokenPolicy,
    pub store_timeout: Duration,
}

pub struct AuthService {
    users: Arc<dyn UserStore>,
    hasher: Arc<dyn CredentialHasher>,
    signer: TokenSigner,
    sessions: SessionManager,
    resolver: IdentityResolver,
    providers: ProviderRegistry,
    mailer: Arc<dyn Mailer>,
    tokens: TokenPolicy,
}

impl AuthService {
    pub fn new(parts: AuthServiceParts) -> Self {
        Self {
            signer: TokenSigner::new(&parts.signing),
            sessions: SessionManager::new(parts.credentials, parts.store_timeout),
            resolver: IdentityResolver::new(parts.users.clone(), parts.hasher.clone()),
            users: parts.users,
            hasher: parts.hasher,
            providers: parts.providers,
            mailer: parts.mailer,
            tokens: parts.tokens,
        }
    }

    pub fn signer(&self) -> &TokenSigner {
        &self.signer
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    pub async fn register(&self, req: RegisterRequest) -> AuthResult<User> {
        let req = RegisterRequest {
            email: normalize_email(&req.email),
            name: req.name.trim().to_string(),
            password: req.password,
        };
        req.validate().map_err(|e| AuthError::Validation(e.to_string()))?;
        validate_password(&req.password)?;

        if self.users.get_user_by_email(&req.email).await?.is_some() {
            return Err(AuthError::Conflict("email already registered".into()));
        }

        let password_hash = self.hasher.hash(&req.password)?;
        let token = generate_token();
        let new_user = NewUser {
            email: req.email,
            name: req.name,
            avatar_url: None,
            password_hash: Some(password_hash),
            email_verified: false,
            verification_token: Some(token.clone()),
            verification_expires_at: Some(Utc::now() + self.tokens.verification_ttl),
        };

        let user = self.users.create_user(new_user).await.map_err(|e| match e {
            StoreError::Conflict(_) => AuthError::Conflict("email already registered".into()),
            other => other.into(),
        })?;

        self.mailer.dispatch(
            &user.email,
            EmailMessage::Verification {
                name: user.name.clone(),
                token,
            },
        );

        metrics::counter!("keystone_auth_registrations_total").increment(1);
        tracing::info!(user_id = user.id, "user registered");
        Ok(user)
    }

    pub async fn login(&self, email: &str, password: &str, device: DeviceType) -> AuthResult<AuthSession> {
        let user = match self.resolver.resolve_local(email, password).await {
            Ok(user) => user,
            Err(e) => {
                metrics::counter!("keystone_auth_login_failures_total", "method" => "password").increment(1);
                return Err(e);
            }
        };

        let session = self.start_session(user, device, None).await?;
        metrics::counter!("keystone_auth_logins_total", "method" => "password").increment(1);
        tracing::info!(user_id = session.user.id, device = %device, "user logged in");
        Ok(session)
    }

    pub async fn oauth_authenticate(
        &self,
        provider: OAuthProvider,
        grant: OAuthGrant,
        device: DeviceType,
    ) -> AuthResult<AuthSession> {
        let idp = self.providers.get(provider)?;
        let profile = match grant {
            OAuthGrant::Code(code) => idp.exchange_code(&code).await?,
            OAuthGrant::Token(token) => idp.verify_token(&token).await?,
        };

        let (user, resolution) = self.resolver.resolve_oauth(provider, &profile).await?;
        let session = self
            .start_session(user, device, Some(resolution.is_new_user()))
            .await?;

        metrics::counter!("keystone_auth_logins_total", "method" => provider.as_str()).increment(1);
        tracing::info!(user_id = session.user.id, provider = %provider, device = %device, "oauth login");
        Ok(session)
    }

    /// Rotation: the presented refresh credential is consumed and a fresh
    /// session is returned with the current user snapshot.
    pub async fn refresh(&self, refresh_token: &str, device: DeviceType) -> AuthResult<AuthSession> {
        let claims = self
            .signer
            .verify_refresh_signature(refresh_token)
            .map_err(|e| {
                tracing::debug!(error = %e, "refresh credential rejected");
                AuthError::InvalidOrExpiredToken
            })?;
        let user_id = claims.sub;

        if !self.sessions.validate(user_id, device, refresh_token).await {
            tracing::info!(user_id, device = %device, "refresh with non-live credential");
            return Err(AuthError::InvalidOrExpiredToken);
        }

        self.sessions.revoke(user_id, device).await?;

        // Blocks applied since login take effect here.
        let user = self
            .users
            .get_user_by_id(user_id)
            .await?
            .ok_or(AuthError::InvalidOrExpiredToken)?;
        if user.is_blocked {
            tracing::info!(user_id, "refresh refused, account blocked");
            return Err(AuthError::AccountBlocked);
        }

        let session = self.start_session(user, device, None).await?;

        metrics::counter!("keystone_auth_refreshes_total").increment(1);
        tracing::info!(user_id, device = %device, "session rotated");
        Ok(session)
    }

    pub async fn logout(&self, user_id: i64, device: DeviceType) -> AuthResult<()> {
        self.sessions.revoke(user_id, device).await?;
        tracing::info!(user_id, device = %device, "user logged out");
        Ok(())
    }

    pub async fn logout_all(&self, user_id: i64) -> AuthResult<()> {
        self.sessions.revoke_all(user_id).await?;
        tracing::info!(user_id, "user logged out of all devices");
        Ok(())
    }

    pub async fn verify_email(&self, token: &str) -> AuthResult<User> {
        if token.trim().is_empty() {
            return Err(AuthError::InvalidOrExpiredToken);
        }
        let user = self
            .users
            .verify_email(token, Utc::now())
            .await?
            .ok_or(AuthError::InvalidOrExpiredToken)?;
        tracing::info!(user_id = user.id, "email verified");
        Ok(user)
    }

    pub async fn resend_verification(&self, email: &str) -> AuthResult<()> {
        let email = normalize_email(email);
        let user = self
            .users
            .get_user_by_email(&email)
            .await?
            .ok_or_else(|| AuthError::NotFound("user not found".into()))?;
        if user.email_verified {
            return Err(AuthError::Validation("email already verified".into()));
        }

        let token = generate_token();
        self.users
            .set_verification_token(user.id, &token, Utc::now() + self.tokens.verification_ttl)
            .await?;
        self.mailer.dispatch(
            &user.email,
            EmailMessage::Verification {
                name: user.name.clone(),
                token,
            },
        );
        tracing::info!(user_id = user.id, "verification email re-sent");
        Ok(())
    }

    pub async fn change_password(&self, user_id: i64, old_password: &str, new_password: &str) -> AuthResult<()> {
        let user = self
            .users
            .get_user_by_id(user_id)
            .await?
            .ok_or_else(|| AuthError::NotFound("user not found".into()))?;
        let digest = user
            .password_hash
            .as_deref()
            .ok_or_else(|| AuthError::Validation("account has no password set".into()))?;
        if !self.hasher.verify(old_password, digest)? {
            return Err(AuthError::Validation("current password is incorrect".into()));
        }
        validate_password(new_password)?;

        let new_digest = self.hasher.hash(new_password)?;
        self.users.update_password(user.id, &new_digest).await?;
        self.sign_out_after_credential_change(user.id).await;

        self.mailer
            .dispatch(&user.email, EmailMessage::PasswordChanged { name: user.name.clone() });
        tracing::info!(user_id = user.id, "password changed");
        Ok(())
    }

    /// Same outcome whether or not the email is registered.
    pub async fn forgot_password(&self, email: &str) {
        if let Err(e) = self.issue_reset(email).await {
            tracing::warn!(error = %e, "password reset request not fulfilled");
        }
    }

    async fn issue_reset(&self, email: &str) -> AuthResult<()> {
        let email = normalize_email(email);
        let Some(user) = self.users.get_user_by_email(&email).await? else {
            tracing::debug!("password reset requested for unknown email");
            return Ok(());
        };

        let token = generate_token();
        self.users
            .set_reset_token(user.id, &token, Utc::now() + self.tokens.reset_ttl)
            .await?;
        self.mailer.dispatch(
            &user.email,
            EmailMessage::PasswordReset {
                name: user.name.clone(),
                token,
            },
        );
        tracing::info!(user_id = user.id, "password reset issued");
        Ok(())
    }

    pub async fn reset_password(&self, token: &str, new_password: &str) -> AuthResult<()> {
        if token.trim().is_empty() {
            return Err(AuthError::InvalidOrExpiredToken);
        }
        validate_password(new_password)?;

        let digest = self.hasher.hash(new_password)?;
        let user = self
            .users
            .reset_password(token, &digest, Utc::now())
            .await?
            .ok_or(AuthError::InvalidOrExpiredToken)?;
        self.sign_out_after_credential_change(user.id).await;

        self.mailer
            .dispatch(&user.email, EmailMessage::PasswordChanged { name: user.name.clone() });
        tracing::info!(user_id = user.id, "password reset");
        Ok(())
    }

    pub async fn profile(&self, user_id: i64) -> AuthResult<Profile> {
        let user = self
            .users
            .get_user_by_id(user_id)
            .await?
            .ok_or_else(|| AuthError::NotFound("user not found".into()))?;
        if user.is_blocked {
            return Err(AuthError::AccountBlocked);
        }

        let links = self.users.get_links_by_user(user.id).await?;
        let is_admin = self.users.is_admin(user.id).await?;
        let linked_accounts = LinkedAccounts {
            email: user.email.clone(),
            password_set: user.has_password(),
            google: linked(&links, OAuthProvider::Google),
            facebook: linked(&links, OAuthProvider::Facebook),
        };

        Ok(Profile {
            user,
            is_admin,
            linked_accounts,
        })
    }

    pub fn authorization_url(&self, provider: OAuthProvider, state: Option<String>) -> AuthResult<AuthorizationUrl> {
        let idp = self.providers.get(provider)?;
        let state = state.filter(|s| !s.is_empty()).unwrap_or_else(generate_token);
        let url = idp.authorization_url(&state)?;
        Ok(AuthorizationUrl { url, state })
    }

    /// Blocks or unblocks a user. Blocking signs the user out everywhere.
    pub async fn set_blocked(&self, user_id: i64, blocked: bool) -> AuthResult<()> {
        self.users.set_blocked(user_id, blocked).await?;
        if blocked {
            self.logout_all(user_id).await?;
        }
        tracing::info!(user_id, blocked, "account block state changed");
        Ok(())
    }

    pub async fn check_stores(&self) -> Vec<HealthCheck> {
        vec![
            HealthCheck::probe("user_store", self.users.ping()).await,
            HealthCheck::probe("credential_store", self.sessions.ping()).await,
        ]
    }

    async fn start_session(
        &self,
        user: User,
        device: DeviceType,
        is_new_user: Option<bool>,
    ) -> AuthResult<AuthSession> {
        let tokens = self.signer.issue_pair(user.id, &user.email)?;
        self.sessions
            .persist(user.id, device, &tokens.refresh_token, self.refresh_ttl())
            .await?;
        let is_admin = self.users.is_admin(user.id).await?;

        Ok(AuthSession {
            user,
            tokens,
            is_admin,
            is_new_user,
        })
    }

    /// The credential is already replaced at this point, so a revoke failure
    /// is logged rather than reported as a failed password change.
    async fn sign_out_after_credential_change(&self, user_id: i64) {
        if let Err(e) = self.sessions.revoke_all(user_id).await {
            tracing::error!(user_id, error = %e, "failed to revoke sessions after credential change");
        } else {
            tracing::info!(user_id, "user logged out of all devices");
        }
    }

    fn refresh_ttl(&self) -> Duration {
        Duration::from_secs(self.signer.refresh_ttl().max(0) as u64)
    }
}

/// Registers help text for the orchestrator's counters with the installed recorder.
pub fn describe_metrics() {
    metrics::describe_counter!("keystone_auth_registrations_total", "Local accounts created");
    metrics::describe_counter!("keystone_auth_logins_total", "Sessions started, by method");
    metrics::describe_counter!("keystone_auth_login_failures_total", "Rejected password logins");
    metrics::describe_counter!("keystone_auth_refreshes_total", "Refresh credentials rotated");
    metrics::describe_counter!("keystone_auth_rate_limited_total", "Requests rejected by the per-address limiter");
}

fn linked(links: &[IdentityLink], provider: OAuthProvider) -> Option<LinkedProvider> {
    links
        .iter()
        .find(|l| l.provider == provider.as_str())
        .map(|l| LinkedProvider {
            provider,
            linked_at: l.linked_at,
        })
}
