use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;

use keystone_shared::errors::{AppError, AppResult};
use keystone_shared::types::ApiResponse;

use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct VerifyEmailQuery {
    #[serde(default)]
    pub token: String,
}

pub async fn verify_email(
    State(state): State<Arc<AppState>>,
    query: Result<Query<VerifyEmailQuery>, axum::extract::rejection::QueryRejection>,
) -> AppResult<Json<ApiResponse<()>>> {
    let Query(query) = query.map_err(AppError::from)?;
    state.auth.verify_email(&query.token).await?;
    Ok(Json(ApiResponse::message("email verified")))
}
