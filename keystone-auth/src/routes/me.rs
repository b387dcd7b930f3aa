use axum::extract::State;
use axum::Json;
use std::sync::Arc;

use keystone_shared::errors::AppResult;
use keystone_shared::types::ApiResponse;

use crate::extractors::CurrentUser;
use crate::services::auth::Profile;
use crate::AppState;

pub async fn me(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> AppResult<Json<ApiResponse<Profile>>> {
    let profile = state.auth.profile(user.user_id).await?;
    Ok(Json(ApiResponse::ok(profile)))
}
