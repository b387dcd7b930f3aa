use std::sync::Arc;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use keystone_shared::errors::{AppError, ErrorCode};

use crate::cookies::{read_cookie, ACCESS_COOKIE};
use crate::services::signing::TokenError;
use crate::AppState;

/// Caller identity taken from a verified access credential.
///
/// The `Authorization: Bearer` header wins over the `access_token` cookie.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user_id: i64,
    pub email: String,
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let bearer = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string);

        let token = bearer
            .or_else(|| read_cookie(&parts.headers, ACCESS_COOKIE))
            .ok_or_else(|| AppError::unauthorized("missing access token"))?;

        let claims = state.auth.signer().verify_access(&token).map_err(|e| match e {
            TokenError::Expired => AppError::new(ErrorCode::TokenExpired, "access token expired"),
            _ => AppError::new(ErrorCode::TokenInvalid, "invalid access token"),
        })?;

        Ok(CurrentUser {
            user_id: claims.sub,
            email: claims.email,
        })
    }
}
