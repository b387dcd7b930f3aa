use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use keystone_shared::errors::AppError;

use crate::config::RateLimitPolicy;
use crate::store::RateLimitStore;
use crate::AppState;

/// Per-client-address request budget for the `/auth` routes.
///
/// Fails open: a store error lets the request through.
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    policy: RateLimitPolicy,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>, policy: RateLimitPolicy) -> Self {
        Self { store, policy }
    }

    pub async fn allow(&self, client: &str) -> bool {
        let key = format!("rate_limit:{client}");
        match self.store.hit(&key, self.policy.max_requests, self.policy.window).await {
            Ok(allowed) => allowed,
            Err(e) => {
                tracing::warn!(client, error = %e, "rate limit store unavailable, allowing request");
                true
            }
        }
    }
}

/// First `X-Forwarded-For` hop, then the socket peer.
pub fn client_address(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

pub async fn enforce(State(state): State<Arc<AppState>>, req: Request<Body>, next: Next) -> Response {
    let Some(limiter) = state.limiter.as_ref() else {
        return next.run(req).await;
    };

    let peer = req.extensions().get::<ConnectInfo<SocketAddr>>().map(|info| info.0);
    let client = client_address(req.headers(), peer);

    if !limiter.allow(&client).await {
        tracing::warn!(client = %client, path = %req.uri().path(), "rate limit exceeded");
        metrics::counter!("keystone_auth_rate_limited_total").increment(1);
        return AppError::rate_limited().into_response();
    }

    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::time::Duration;

    use crate::store::{MemoryRateLimitStore, StoreError};

    struct DownStore;

    #[async_trait]
    impl RateLimitStore for DownStore {
        async fn hit(&self, _key: &str, _limit: u64, _window: Duration) -> Result<bool, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
    }

    fn policy(max_requests: u64) -> RateLimitPolicy {
        RateLimitPolicy {
            max_requests,
            window: Duration::from_secs(60),
        }
    }

    #[test]
    fn forwarded_header_wins_over_peer() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.7, 10.0.0.1".parse().unwrap());
        let peer = Some("10.0.0.9:4000".parse().unwrap());
        assert_eq!(client_address(&headers, peer), "203.0.113.7");

        assert_eq!(client_address(&HeaderMap::new(), peer), "10.0.0.9");
        assert_eq!(client_address(&HeaderMap::new(), None), "unknown");
    }

    #[tokio::test]
    async fn store_outage_fails_open() {
        let limiter = RateLimiter::new(Arc::new(DownStore), policy(1));
        for _ in 0..3 {
            assert!(limiter.allow("203.0.113.7").await);
        }
    }

    #[tokio::test]
    async fn budget_is_per_client() {
        let limiter = RateLimiter::new(Arc::new(MemoryRateLimitStore::new()), policy(1));
        assert!(limiter.allow("203.0.113.7").await);
        assert!(!limiter.allow("203.0.113.7").await);
        assert!(limiter.allow("198.51.100.2").await);
    }
}
