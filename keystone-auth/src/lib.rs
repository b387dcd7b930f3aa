use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub mod config;
pub mod cookies;
pub mod error;
pub mod extractors;
pub mod mail;
pub mod models;
pub mod rate_limit;
pub mod routes;
pub mod schema;
pub mod services;
pub mod store;

use config::CookieConfig;
use rate_limit::RateLimiter;
use services::AuthService;

pub struct AppState {
    pub auth: AuthService,
    pub cookies: CookieConfig,
    /// Registers the local email/password routes.
    pub email_password_enabled: bool,
    /// `None` disables per-address limiting on `/auth`.
    pub limiter: Option<RateLimiter>,
}

pub fn router(state: Arc<AppState>) -> Router {
    let mut auth = Router::new()
        .route("/auth/refresh", post(routes::refresh::refresh_token))
        .route("/auth/logout", post(routes::logout::logout))
        .route("/auth/logout-all", post(routes::logout::logout_all))
        .route("/auth/me", get(routes::me::me))
        .route("/auth/:provider/url", get(routes::oauth::authorization_url))
        .route("/auth/:provider/exchange", post(routes::oauth::exchange_code))
        .route("/auth/:provider/verify", post(routes::oauth::verify_token));

    if state.email_password_enabled {
        auth = auth.merge(local_credential_routes());
    }
    if state.limiter.is_some() {
        auth = auth.route_layer(middleware::from_fn_with_state(state.clone(), rate_limit::enforce));
    }

    Router::new()
        .route("/health", get(routes::health::health_check))
        .merge(auth)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn local_credential_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/register", post(routes::register::register))
        .route("/auth/login", post(routes::login::login))
        .route("/auth/verify-email", get(routes::verify_email::verify_email))
        .route("/auth/resend-verification", post(routes::resend_verification::resend_verification))
        .route("/auth/forgot-password", post(routes::forgot_password::forgot_password))
        .route("/auth/reset-password", post(routes::reset_password::reset_password))
        .route("/auth/change-password", post(routes::change_password::change_password))
}
