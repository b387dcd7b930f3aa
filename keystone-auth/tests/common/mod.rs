#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use keystone_auth::config::{CookieConfig, RateLimitPolicy, SigningConfig, TokenPolicy};
use keystone_auth::mail::{EmailMessage, Mailer};
use keystone_auth::services::auth::RegisterRequest;
use keystone_auth::services::oauth::{ExternalProfile, IdentityProvider, ProviderError, ProviderRegistry};
use keystone_auth::services::password::Argon2Hasher;
use keystone_auth::services::{AuthService, AuthServiceParts};
use keystone_auth::rate_limit::RateLimiter;
use keystone_auth::store::{CredentialStore, MemoryCredentialStore, MemoryRateLimitStore, MemoryUserStore, StoreError};
use keystone_auth::AppState;
use keystone_shared::types::auth::OAuthProvider;

pub const PASSWORD: &str = "hunter2222";

#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<(String, EmailMessage)>>,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<(String, EmailMessage)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn last_verification_token(&self) -> Option<String> {
        self.sent().into_iter().rev().find_map(|(_, m)| match m {
            EmailMessage::Verification { token, .. } => Some(token),
            _ => None,
        })
    }

    pub fn last_reset_token(&self) -> Option<String> {
        self.sent().into_iter().rev().find_map(|(_, m)| match m {
            EmailMessage::PasswordReset { token, .. } => Some(token),
            _ => None,
        })
    }
}

impl Mailer for RecordingMailer {
    fn dispatch(&self, to: &str, message: EmailMessage) {
        self.sent.lock().unwrap().push((to.to_string(), message));
    }
}

/// Provider double that answers codes and tokens from a fixed table.
pub struct StubProvider {
    kind: OAuthProvider,
    profiles: Mutex<HashMap<String, ExternalProfile>>,
}

impl StubProvider {
    pub fn new(kind: OAuthProvider) -> Self {
        Self {
            kind,
            profiles: Mutex::new(HashMap::new()),
        }
    }

    /// Registers a profile reachable by code or token `grant`.
    pub fn answer(&self, grant: &str, profile: ExternalProfile) {
        self.profiles.lock().unwrap().insert(grant.to_string(), profile);
    }

    fn lookup(&self, grant: &str) -> Result<ExternalProfile, ProviderError> {
        self.profiles
            .lock()
            .unwrap()
            .get(grant)
            .cloned()
            .ok_or_else(|| ProviderError::Rejected("unknown grant".into()))
    }
}

#[async_trait]
impl IdentityProvider for StubProvider {
    fn kind(&self) -> OAuthProvider {
        self.kind
    }

    fn authorization_url(&self, state: &str) -> Result<String, ProviderError> {
        Ok(format!("https://idp.test/{}/auth?state={state}", self.kind))
    }

    async fn exchange_code(&self, code: &str) -> Result<ExternalProfile, ProviderError> {
        self.lookup(code)
    }

    async fn verify_token(&self, token: &str) -> Result<ExternalProfile, ProviderError> {
        self.lookup(token)
    }
}

pub fn profile(external_id: &str, email: &str) -> ExternalProfile {
    ExternalProfile {
        external_id: external_id.to_string(),
        email: email.to_string(),
        name: "Grace Hopper".to_string(),
        avatar_url: Some("https://idp.test/avatar.png".to_string()),
    }
}

pub fn signing_config() -> SigningConfig {
    SigningConfig {
        access_secret: "access-secret-for-tests-0123456789abcdef".to_string(),
        refresh_secret: "refresh-secret-for-tests-0123456789abcdef".to_string(),
        access_ttl: 900,
        refresh_ttl: 604_800,
        issuer: "keystone-auth".to_string(),
    }
}

/// Memory credential store whose deletes can be switched to fail.
#[derive(Default)]
pub struct FlakyCredentials {
    inner: MemoryCredentialStore,
    fail_deletes: AtomicBool,
}

impl FlakyCredentials {
    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl CredentialStore for FlakyCredentials {
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        self.inner.set(key, value, ttl).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.get(key).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection reset".into()));
        }
        self.inner.delete(key).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.inner.ping().await
    }
}

pub struct HarnessOptions {
    pub email_password_enabled: bool,
    pub rate_limit: Option<RateLimitPolicy>,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            email_password_enabled: true,
            rate_limit: None,
        }
    }
}

/// Auth core over in-memory stores. Google is enabled, Facebook is not.
pub struct Harness {
    pub state: Arc<AppState>,
    pub users: Arc<MemoryUserStore>,
    pub credentials: Arc<FlakyCredentials>,
    pub mailer: Arc<RecordingMailer>,
    pub google: Arc<StubProvider>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_options(HarnessOptions::default())
    }

    pub fn with_options(options: HarnessOptions) -> Self {
        let users = Arc::new(MemoryUserStore::new());
        let credentials = Arc::new(FlakyCredentials::default());
        let mailer = Arc::new(RecordingMailer::default());
        let google = Arc::new(StubProvider::new(OAuthProvider::Google));

        let auth = AuthService::new(AuthServiceParts {
            users: users.clone(),
            credentials: credentials.clone(),
            hasher: Arc::new(Argon2Hasher::with_cost(1024, 1).unwrap()),
            providers: ProviderRegistry::new().with(google.clone()),
            mailer: mailer.clone(),
            signing: signing_config(),
            tokens: TokenPolicy {
                verification_ttl: chrono::Duration::hours(24),
                reset_ttl: chrono::Duration::hours(1),
            },
            store_timeout: Duration::from_secs(1),
        });

        let state = Arc::new(AppState {
            auth,
            cookies: CookieConfig {
                domain: None,
                secure: false,
                access_max_age: 900,
                refresh_max_age: 604_800,
            },
            email_password_enabled: options.email_password_enabled,
            limiter: options
                .rate_limit
                .map(|policy| RateLimiter::new(Arc::new(MemoryRateLimitStore::new()), policy)),
        });

        Self {
            state,
            users,
            credentials,
            mailer,
            google,
        }
    }

    pub async fn block_in_store(&self, user_id: i64) {
        use keystone_auth::store::UserStore;
        self.users.set_blocked(user_id, true).await.unwrap();
    }

    pub fn auth(&self) -> &AuthService {
        &self.state.auth
    }

    pub async fn register(&self, email: &str) -> keystone_auth::models::User {
        self.auth()
            .register(RegisterRequest {
                email: email.to_string(),
                name: "Ada Lovelace".to_string(),
                password: PASSWORD.to_string(),
            })
            .await
            .unwrap()
    }
}
