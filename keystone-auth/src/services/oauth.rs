use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use keystone_shared::errors::{AppError, ErrorCode};
use keystone_shared::types::auth::OAuthProvider;

use crate::config::{AppConfig, ProviderConfig};

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v3/userinfo";
const GOOGLE_TOKENINFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";
const GOOGLE_SCOPES: &str = "openid email profile";

const FACEBOOK_AUTH_URL: &str = "https://www.facebook.com/v18.0/dialog/oauth";
const FACEBOOK_TOKEN_URL: &str = "https://graph.facebook.com/v18.0/oauth/access_token";
const FACEBOOK_ME_URL: &str = "https://graph.facebook.com/v18.0/me";
const FACEBOOK_SCOPES: &str = "email,public_profile";

/// Identity as confirmed by an external provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalProfile {
    pub external_id: String,
    pub email: String,
    pub name: String,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("provider is not enabled")]
    Disabled,

    /// The provider refused the code or token.
    #[error("provider rejected credential: {0}")]
    Rejected(String),

    /// Network failure or provider outage; the caller may retry.
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("unexpected provider response: {0}")]
    InvalidResponse(String),
}

impl From<ProviderError> for AppError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Disabled => AppError::new(ErrorCode::ProviderDisabled, "provider is not enabled"),
            ProviderError::Rejected(_) => {
                AppError::new(ErrorCode::OAuthError, "provider rejected the credential")
            }
            ProviderError::Unavailable(msg) | ProviderError::InvalidResponse(msg) => {
                tracing::warn!(error = %msg, "identity provider call failed");
                AppError::new(ErrorCode::ProviderUnavailable, "identity provider unavailable, try again")
            }
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ProviderError::InvalidResponse(e.to_string())
        } else {
            ProviderError::Unavailable(e.to_string())
        }
    }
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, ProviderError> {
    let status = response.status();
    if status.is_server_error() {
        return Err(ProviderError::Unavailable(format!("status {status}")));
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ProviderError::Rejected(format!("status {status}: {body}")));
    }
    response
        .json::<T>()
        .await
        .map_err(|e| ProviderError::InvalidResponse(e.to_string()))
}

fn build_client(timeout: Duration) -> Result<Client, ProviderError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ProviderError::InvalidResponse(format!("http client: {e}")))
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    fn kind(&self) -> OAuthProvider;
    fn authorization_url(&self, state: &str) -> Result<String, ProviderError>;
    async fn exchange_code(&self, code: &str) -> Result<ExternalProfile, ProviderError>;
    async fn verify_token(&self, token: &str) -> Result<ExternalProfile, ProviderError>;
}

// --- Google ---

pub struct GoogleProvider {
    client: Client,
    config: ProviderConfig,
}

#[derive(Debug, Deserialize)]
struct GoogleTokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    sub: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    picture: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleTokenInfo {
    sub: String,
    aud: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    picture: Option<String>,
}

impl GoogleTokenInfo {
    fn into_profile(self, client_id: &str) -> Result<ExternalProfile, ProviderError> {
        if self.aud != client_id {
            return Err(ProviderError::Rejected("id token issued for another client".into()));
        }
        Ok(ExternalProfile {
            external_id: self.sub,
            email: self.email,
            name: self.name,
            avatar_url: self.picture.filter(|p| !p.is_empty()),
        })
    }
}

impl GoogleProvider {
    pub fn new(config: ProviderConfig, timeout: Duration) -> Result<Self, ProviderError> {
        Ok(Self {
            client: build_client(timeout)?,
            config,
        })
    }
}

#[async_trait]
impl IdentityProvider for GoogleProvider {
    fn kind(&self) -> OAuthProvider {
        OAuthProvider::Google
    }

    fn authorization_url(&self, state: &str) -> Result<String, ProviderError> {
        let url = Url::parse_with_params(
            GOOGLE_AUTH_URL,
            &[
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", GOOGLE_SCOPES),
                ("access_type", "offline"),
                ("state", state),
            ],
        )
        .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        Ok(url.into())
    }

    async fn exchange_code(&self, code: &str) -> Result<ExternalProfile, ProviderError> {
        let response = self
            .client
            .post(GOOGLE_TOKEN_URL)
            .form(&[
                ("code", code),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await?;
        let token: GoogleTokenResponse = read_json(response).await?;

        let response = self
            .client
            .get(GOOGLE_USERINFO_URL)
            .bearer_auth(&token.access_token)
            .send()
            .await?;
        let info: GoogleUserInfo = read_json(response).await?;

        Ok(ExternalProfile {
            external_id: info.sub,
            email: info.email,
            name: info.name,
            avatar_url: info.picture.filter(|p| !p.is_empty()),
        })
    }

    async fn verify_token(&self, token: &str) -> Result<ExternalProfile, ProviderError> {
        let response = self
            .client
            .get(GOOGLE_TOKENINFO_URL)
            .query(&[("id_token", token)])
            .send()
            .await?;
        let info: GoogleTokenInfo = read_json(response).await?;
        info.into_profile(&self.config.client_id)
    }
}

// --- Facebook ---

pub struct FacebookProvider {
    client: Client,
    config: ProviderConfig,
}

#[derive(Debug, Deserialize)]
struct FacebookTokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct FacebookPictureData {
    #[serde(default)]
    url: String,
}

#[derive(Debug, Deserialize)]
struct FacebookPicture {
    data: FacebookPictureData,
}

#[derive(Debug, Deserialize)]
struct FacebookMe {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    picture: Option<FacebookPicture>,
}

impl From<FacebookMe> for ExternalProfile {
    fn from(me: FacebookMe) -> Self {
        ExternalProfile {
            external_id: me.id,
            email: me.email,
            name: me.name,
            avatar_url: me.picture.map(|p| p.data.url).filter(|u| !u.is_empty()),
        }
    }
}

impl FacebookProvider {
    pub fn new(config: ProviderConfig, timeout: Duration) -> Result<Self, ProviderError> {
        Ok(Self {
            client: build_client(timeout)?,
            config,
        })
    }

    async fn me(&self, access_token: &str) -> Result<ExternalProfile, ProviderError> {
        let response = self
            .client
            .get(FACEBOOK_ME_URL)
            .query(&[("fields", "id,name,email,picture"), ("access_token", access_token)])
            .send()
            .await?;
        let me: FacebookMe = read_json(response).await?;
        Ok(me.into())
    }
}

#[async_trait]
impl IdentityProvider for FacebookProvider {
    fn kind(&self) -> OAuthProvider {
        OAuthProvider::Facebook
    }

    fn authorization_url(&self, state: &str) -> Result<String, ProviderError> {
        let url = Url::parse_with_params(
            FACEBOOK_AUTH_URL,
            &[
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", FACEBOOK_SCOPES),
                ("state", state),
            ],
        )
        .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        Ok(url.into())
    }

    async fn exchange_code(&self, code: &str) -> Result<ExternalProfile, ProviderError> {
        let response = self
            .client
            .get(FACEBOOK_TOKEN_URL)
            .query(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("code", code),
            ])
            .send()
            .await?;
        let token: FacebookTokenResponse = read_json(response).await?;
        self.me(&token.access_token).await
    }

    async fn verify_token(&self, token: &str) -> Result<ExternalProfile, ProviderError> {
        self.me(token).await
    }
}

// --- Registry ---

/// Enabled providers by discriminant. Absent means disabled.
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    providers: HashMap<OAuthProvider, Arc<dyn IdentityProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, ProviderError> {
        let mut registry = Self::new();
        let timeout = config.provider_timeout();

        let google = config.provider(OAuthProvider::Google);
        if google.enabled {
            registry = registry.with(Arc::new(GoogleProvider::new(google, timeout)?));
        }
        let facebook = config.provider(OAuthProvider::Facebook);
        if facebook.enabled {
            registry = registry.with(Arc::new(FacebookProvider::new(facebook, timeout)?));
        }

        Ok(registry)
    }

    pub fn with(mut self, provider: Arc<dyn IdentityProvider>) -> Self {
        self.providers.insert(provider.kind(), provider);
        self
    }

    pub fn is_enabled(&self, kind: OAuthProvider) -> bool {
        self.providers.contains_key(&kind)
    }

    pub fn get(&self, kind: OAuthProvider) -> Result<Arc<dyn IdentityProvider>, ProviderError> {
        self.providers.get(&kind).cloned().ok_or(ProviderError::Disabled)
    }
}
