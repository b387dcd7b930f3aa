use axum::extract::State;
use axum::response::AppendHeaders;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;

use keystone_shared::errors::AppResult;
use keystone_shared::types::ApiResponse;

use crate::cookies::session_cookies;
use crate::routes::{device_type, ApiJson};
use crate::services::auth::AuthSession;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    pub device_type: Option<String>,
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> AppResult<(AppendHeaders<[(axum::http::HeaderName, String); 2]>, Json<ApiResponse<AuthSession>>)> {
    let device = device_type(req.device_type.as_deref())?;
    let session = state.auth.login(&req.email, &req.password, device).await?;
    let cookies = session_cookies(&state.cookies, &session.tokens);
    Ok((AppendHeaders(cookies), Json(ApiResponse::ok_with_message(session, "login successful"))))
}
