use axum::extract::State;
use axum::http::HeaderName;
use axum::response::AppendHeaders;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;

use keystone_shared::errors::AppResult;
use keystone_shared::types::ApiResponse;

use crate::cookies::cleared_cookies;
use crate::extractors::CurrentUser;
use crate::routes::{device_type, ApiJson};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct LogoutRequest {
    pub device_type: Option<String>,
}

type Cleared = AppendHeaders<[(HeaderName, String); 2]>;

pub async fn logout(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiJson(req): ApiJson<LogoutRequest>,
) -> AppResult<(Cleared, Json<ApiResponse<()>>)> {
    let device = device_type(req.device_type.as_deref())?;
    state.auth.logout(user.user_id, device).await?;
    Ok((
        AppendHeaders(cleared_cookies(&state.cookies)),
        Json(ApiResponse::message("logged out")),
    ))
}

pub async fn logout_all(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> AppResult<(Cleared, Json<ApiResponse<()>>)> {
    state.auth.logout_all(user.user_id).await?;
    Ok((
        AppendHeaders(cleared_cookies(&state.cookies)),
        Json(ApiResponse::message("logged out of all devices")),
    ))
}
