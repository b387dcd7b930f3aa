use axum::extract::{Path, Query, State};
use axum::http::HeaderName;
use axum::response::AppendHeaders;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;

use keystone_shared::errors::{AppError, AppResult};
use keystone_shared::types::ApiResponse;

use crate::cookies::session_cookies;
use crate::routes::{device_type, provider, ApiJson};
use crate::services::auth::{AuthSession, AuthorizationUrl, OAuthGrant};
use crate::AppState;

type SessionResponse = (AppendHeaders<[(HeaderName, String); 2]>, Json<ApiResponse<AuthSession>>);

#[derive(Debug, Deserialize)]
pub struct AuthorizationUrlQuery {
    pub state: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ExchangeRequest {
    #[serde(default)]
    pub code: String,
    pub device_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VerifyTokenRequest {
    #[serde(default, alias = "id_token", alias = "access_token")]
    pub token: String,
    pub device_type: Option<String>,
}

pub async fn authorization_url(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(query): Query<AuthorizationUrlQuery>,
) -> AppResult<Json<ApiResponse<AuthorizationUrl>>> {
    let provider = provider(&name)?;
    let url = state.auth.authorization_url(provider, query.state)?;
    Ok(Json(ApiResponse::ok(url)))
}

pub async fn exchange_code(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    ApiJson(req): ApiJson<ExchangeRequest>,
) -> AppResult<SessionResponse> {
    let provider = provider(&name)?;
    let device = device_type(req.device_type.as_deref())?;
    if req.code.is_empty() {
        return Err(AppError::bad_request("code is required"));
    }

    let session = state
        .auth
        .oauth_authenticate(provider, OAuthGrant::Code(req.code), device)
        .await?;
    respond(&state, session)
}

pub async fn verify_token(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    ApiJson(req): ApiJson<VerifyTokenRequest>,
) -> AppResult<SessionResponse> {
    let provider = provider(&name)?;
    let device = device_type(req.device_type.as_deref())?;
    if req.token.is_empty() {
        return Err(AppError::bad_request("token is required"));
    }

    let session = state
        .auth
        .oauth_authenticate(provider, OAuthGrant::Token(req.token), device)
        .await?;
    respond(&state, session)
}

fn respond(state: &AppState, session: AuthSession) -> AppResult<SessionResponse> {
    let cookies = session_cookies(&state.cookies, &session.tokens);
    Ok((AppendHeaders(cookies), Json(ApiResponse::ok_with_message(session, "authentication successful"))))
}
