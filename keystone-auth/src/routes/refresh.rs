use axum::extract::State;
use axum::http::{HeaderMap, HeaderName};
use axum::response::AppendHeaders;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;

use keystone_shared::errors::{AppError, AppResult};
use keystone_shared::types::ApiResponse;

use crate::cookies::{read_cookie, session_cookies, REFRESH_COOKIE};
use crate::routes::{device_type, ApiJson};
use crate::services::auth::AuthSession;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub device_type: Option<String>,
}

pub async fn refresh_token(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ApiJson(req): ApiJson<RefreshRequest>,
) -> AppResult<(AppendHeaders<[(HeaderName, String); 2]>, Json<ApiResponse<AuthSession>>)> {
    let device = device_type(req.device_type.as_deref())?;

    // Body wins over cookie.
    let token = req
        .refresh_token
        .filter(|t| !t.is_empty())
        .or_else(|| read_cookie(&headers, REFRESH_COOKIE))
        .ok_or_else(|| AppError::unauthorized("missing refresh token"))?;

    let session = state.auth.refresh(&token, device).await?;
    let cookies = session_cookies(&state.cookies, &session.tokens);
    Ok((AppendHeaders(cookies), Json(ApiResponse::ok(session))))
}
