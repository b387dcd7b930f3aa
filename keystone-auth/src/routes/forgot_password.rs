use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;

use keystone_shared::errors::AppResult;
use keystone_shared::types::ApiResponse;

use crate::routes::ApiJson;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

pub async fn forgot_password(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<ForgotPasswordRequest>,
) -> AppResult<Json<ApiResponse<()>>> {
    state.auth.forgot_password(&req.email).await;
    Ok(Json(ApiResponse::message(
        "if an account exists for this email, a reset link has been sent",
    )))
}
