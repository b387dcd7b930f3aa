use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;

use keystone_shared::errors::AppResult;
use keystone_shared::types::ApiResponse;

use crate::routes::ApiJson;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<ResetPasswordRequest>,
) -> AppResult<Json<ApiResponse<()>>> {
    state.auth.reset_password(&req.token, &req.new_password).await?;
    Ok(Json(ApiResponse::message("password reset, please log in again")))
}
