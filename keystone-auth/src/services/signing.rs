use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};

use keystone_shared::types::auth::{Claims, TokenPair};

use crate::config::SigningConfig;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("invalid token signature")]
    InvalidSignature,

    #[error("token expired")]
    Expired,

    #[error("malformed token")]
    Malformed,

    #[error("token signing failed: {0}")]
    Signing(String),
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        match e.kind() {
            ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => TokenError::InvalidSignature,
            ErrorKind::ExpiredSignature => TokenError::Expired,
            _ => TokenError::Malformed,
        }
    }
}

struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl KeyPair {
    fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

/// Mints and verifies HS256 access and refresh credentials, each family
/// under its own secret.
pub struct TokenSigner {
    access: KeyPair,
    refresh: KeyPair,
    access_ttl: i64,
    refresh_ttl: i64,
    issuer: String,
    validation: Validation,
}

impl TokenSigner {
    pub fn new(config: &SigningConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_issuer(&[config.issuer.as_str()]);

        Self {
            access: KeyPair::from_secret(&config.access_secret),
            refresh: KeyPair::from_secret(&config.refresh_secret),
            access_ttl: config.access_ttl,
            refresh_ttl: config.refresh_ttl,
            issuer: config.issuer.clone(),
            validation,
        }
    }

    pub fn access_ttl(&self) -> i64 {
        self.access_ttl
    }

    pub fn refresh_ttl(&self) -> i64 {
        self.refresh_ttl
    }

    pub fn issue_access(&self, user_id: i64, email: &str) -> Result<String, TokenError> {
        self.sign(user_id, email, self.access_ttl, &self.access.encoding)
    }

    pub fn issue_refresh(&self, user_id: i64, email: &str) -> Result<String, TokenError> {
        self.sign(user_id, email, self.refresh_ttl, &self.refresh.encoding)
    }

    pub fn issue_pair(&self, user_id: i64, email: &str) -> Result<TokenPair, TokenError> {
        let access_token = self.issue_access(user_id, email)?;
        let refresh_token = self.issue_refresh(user_id, email)?;
        Ok(TokenPair::new(access_token, refresh_token, self.access_ttl))
    }

    /// Stateless: signature and expiry only.
    pub fn verify_access(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify(token, &self.access.decoding)
    }

    /// Proves the refresh credential was minted here and has not expired.
    /// Liveness is the session manager's call.
    pub fn verify_refresh_signature(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify(token, &self.refresh.decoding)
    }

    fn sign(&self, user_id: i64, email: &str, ttl: i64, key: &EncodingKey) -> Result<String, TokenError> {
        let claims = Claims::new(user_id, email, self.issuer.as_str(), ttl);
        encode(&Header::new(Algorithm::HS256), &claims, key).map_err(|e| TokenError::Signing(e.to_string()))
    }

    fn verify(&self, token: &str, key: &DecodingKey) -> Result<Claims, TokenError> {
        let data = decode::<Claims>(token, key, &self.validation)?;
        Ok(data.claims)
    }
}
