use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use std::sync::Arc;

use keystone_shared::errors::AppResult;
use keystone_shared::types::ApiResponse;

use crate::models::User;
use crate::routes::ApiJson;
use crate::services::auth::RegisterRequest;
use crate::AppState;

pub async fn register(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<User>>)> {
    let user = state.auth.register(req).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok_with_message(
            user,
            "registration successful, check your email to verify your account",
        )),
    ))
}
