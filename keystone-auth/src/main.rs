use axum::http::{header, HeaderValue, Method};
use axum::{middleware, routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use keystone_auth::config::{AppConfig, EmailBackend, StorageBackend};
use keystone_auth::mail::{
    EmailSender, EmailTemplates, LogEmailSender, QueuedMailer, ResendEmailSender, SmtpEmailSender,
};
use keystone_auth::rate_limit::RateLimiter;
use keystone_auth::services::oauth::ProviderRegistry;
use keystone_auth::services::password::Argon2Hasher;
use keystone_auth::services::{AuthService, AuthServiceParts};
use keystone_auth::store::{
    postgres, CredentialStore, MemoryCredentialStore, MemoryRateLimitStore, MemoryUserStore, PgUserStore,
    RateLimitStore, RedisCredentialStore, RedisRateLimitStore, UserStore,
};
use keystone_auth::AppState;
use keystone_shared::clients::email::EmailClient;
use keystone_shared::clients::redis::RedisClient;
use keystone_shared::clients::smtp::SmtpClient;

const MAIL_QUEUE_CAPACITY: usize = 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    keystone_shared::middleware::init_tracing("keystone-auth");

    let config = AppConfig::load()?;
    let port = config.port;

    let (users, credentials, counters): (Arc<dyn UserStore>, Arc<dyn CredentialStore>, Arc<dyn RateLimitStore>) =
        match config.storage_backend {
            StorageBackend::Postgres => {
                let pool = postgres::connect(&config.database_url, 10, config.store_timeout())?;
                let redis = RedisClient::connect(&config.redis_url).await?;
                (
                    Arc::new(PgUserStore::new(pool, config.store_timeout())),
                    Arc::new(RedisCredentialStore::new(redis.clone())),
                    Arc::new(RedisRateLimitStore::new(redis)),
                )
            }
            StorageBackend::Memory => {
                tracing::warn!("using in-memory stores, state is lost on restart");
                (
                    Arc::new(MemoryUserStore::new()),
                    Arc::new(MemoryCredentialStore::new()),
                    Arc::new(MemoryRateLimitStore::new()),
                )
            }
        };

    let templates = EmailTemplates::new(&config.frontend_url, &config.from_name);
    let sender: Arc<dyn EmailSender> = match config.email_backend {
        EmailBackend::Log => Arc::new(LogEmailSender::new(templates)),
        EmailBackend::Resend => {
            let client = EmailClient::new(
                &config.resend_api_key,
                &config.from_email,
                &config.from_name,
                config.provider_timeout(),
            )?;
            Arc::new(ResendEmailSender::new(client, templates))
        }
        EmailBackend::Smtp => {
            let smtp = config.smtp();
            let client = SmtpClient::new(
                &smtp.host,
                smtp.port,
                &smtp.username,
                &smtp.password,
                &config.from_email,
                &config.from_name,
                config.provider_timeout(),
            )?;
            Arc::new(SmtpEmailSender::new(client, templates))
        }
    };
    let mailer = Arc::new(QueuedMailer::spawn(sender, MAIL_QUEUE_CAPACITY));

    let providers = ProviderRegistry::from_config(&config)?;

    let auth = AuthService::new(AuthServiceParts {
        users,
        credentials,
        hasher: Arc::new(Argon2Hasher::new()),
        providers,
        mailer,
        signing: config.signing(),
        tokens: config.token_policy(),
        store_timeout: config.store_timeout(),
    });

    let state = Arc::new(AppState {
        auth,
        cookies: config.cookies(),
        email_password_enabled: config.email_password_enabled,
        limiter: config.rate_limit().map(|policy| RateLimiter::new(counters, policy)),
    });
    if !config.email_password_enabled {
        tracing::info!("email/password routes disabled");
    }

    let metrics_handle = keystone_shared::middleware::init_metrics()?;
    keystone_auth::services::auth::describe_metrics();

    let cors = CorsLayer::new()
        .allow_origin(config.frontend_url.parse::<HeaderValue>()?)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true);

    let app = keystone_auth::router(state)
        .merge(Router::new().route("/metrics", get(move || async move { metrics_handle.render() })))
        .layer(middleware::from_fn(keystone_shared::middleware::metrics_middleware))
        .layer(cors);

    let addr = format!("0.0.0.0:{port}");
    tracing::info!(addr = %addr, "keystone-auth starting");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
    tracing::info!("shutting down");
}
