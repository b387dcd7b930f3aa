use keystone_shared::errors::{AppError, ErrorCode};

use crate::services::oauth::ProviderError;
use crate::services::signing::TokenError;
use crate::store::StoreError;

/// Domain failures raised by the resolver, session manager and orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Unknown email, no password set, or wrong password. Never distinguished.
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("account blocked")]
    AccountBlocked,

    /// Missing, revoked, expired or otherwise unusable credential or
    /// single-use email token.
    #[error("invalid or expired token")]
    InvalidOrExpiredToken,

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error("password too weak: {0}")]
    WeakPassword(String),

    #[error("{0}")]
    Malformed(String),

    /// An identity link points at a user that no longer exists.
    #[error("identity link references missing user {0}")]
    DanglingLink(i64),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{0}")]
    Internal(String),
}

pub type AuthResult<T> = Result<T, AuthError>;

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => {
                AppError::new(ErrorCode::InvalidCredentials, "invalid email or password")
            }
            AuthError::AccountBlocked => {
                tracing::info!("authentication refused for blocked account");
                AppError::unauthorized("authentication failed")
            }
            AuthError::InvalidOrExpiredToken => {
                AppError::new(ErrorCode::TokenInvalid, "invalid or expired token")
            }
            AuthError::Conflict(msg) => AppError::new(ErrorCode::EmailAlreadyExists, msg),
            AuthError::NotFound(msg) => AppError::not_found(msg),
            AuthError::Validation(msg) => AppError::new(ErrorCode::ValidationError, msg),
            AuthError::WeakPassword(msg) => AppError::new(ErrorCode::PasswordTooWeak, msg),
            AuthError::Malformed(msg) => AppError::bad_request(msg),
            AuthError::Token(TokenError::Expired) => {
                AppError::new(ErrorCode::TokenExpired, "token expired")
            }
            AuthError::Token(TokenError::Signing(msg)) => {
                AppError::internal(format!("token signing failed: {msg}"))
            }
            AuthError::Token(_) => AppError::new(ErrorCode::TokenInvalid, "invalid token"),
            AuthError::Provider(e) => e.into(),
            AuthError::DanglingLink(user_id) => {
                AppError::internal(format!("identity link references missing user {user_id}"))
            }
            AuthError::Store(e) => AppError::internal(e.to_string()),
            AuthError::Internal(msg) => AppError::internal(msg),
        }
    }
}
