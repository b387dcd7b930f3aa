use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use std::sync::Arc;

use keystone_shared::types::HealthResponse;

use crate::AppState;

pub async fn health_check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
    let checks = state.auth.check_stores().await;
    let response = HealthResponse::new("keystone-auth", env!("CARGO_PKG_VERSION"), checks);

    let status = if response.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(response))
}
