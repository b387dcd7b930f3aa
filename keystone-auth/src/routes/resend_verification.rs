use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;

use keystone_shared::errors::AppResult;
use keystone_shared::types::ApiResponse;

use crate::routes::ApiJson;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ResendVerificationRequest {
    pub email: String,
}

pub async fn resend_verification(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<ResendVerificationRequest>,
) -> AppResult<Json<ApiResponse<()>>> {
    state.auth.resend_verification(&req.email).await?;
    Ok(Json(ApiResponse::message("verification email sent")))
}
