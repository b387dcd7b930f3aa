use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;

use keystone_shared::errors::AppResult;
use keystone_shared::types::ApiResponse;

use crate::extractors::CurrentUser;
use crate::routes::ApiJson;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

pub async fn change_password(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiJson(req): ApiJson<ChangePasswordRequest>,
) -> AppResult<Json<ApiResponse<()>>> {
    state
        .auth
        .change_password(user.user_id, &req.old_password, &req.new_password)
        .await?;
    Ok(Json(ApiResponse::message("password changed, please log in again")))
}
