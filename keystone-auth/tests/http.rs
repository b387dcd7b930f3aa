mod common;

use axum::body::{to_bytes, Body};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE, COOKIE, SET_COOKIE};
use axum::http::{Method, Request, StatusCode};
use axum::response::Response;
use serde_json::{json, Value};
use tower::ServiceExt;

use std::time::Duration;

use keystone_auth::config::RateLimitPolicy;

use common::{profile, Harness, HarnessOptions, PASSWORD};

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn send(h: &Harness, req: Request<Body>) -> Response {
    keystone_auth::router(h.state.clone()).oneshot(req).await.unwrap()
}

async fn body(res: Response) -> Value {
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn set_cookies(res: &Response) -> Vec<String> {
    res.headers()
        .get_all(SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect()
}

async fn login(h: &Harness, device: &str) -> Response {
    send(
        h,
        post(
            "/auth/login",
            json!({ "email": "ada@x.com", "password": PASSWORD, "device_type": device }),
        ),
    )
    .await
}

#[tokio::test]
async fn register_returns_created_without_secrets() {
    let h = Harness::new();
    let res = send(
        &h,
        post(
            "/auth/register",
            json!({ "email": "ada@x.com", "name": "Ada", "password": PASSWORD }),
        ),
    )
    .await;
    assert_eq!(res.status(), StatusCode::CREATED);

    let json = body(res).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["data"]["email"], "ada@x.com");
    assert!(json["data"].get("password_hash").is_none());
}

#[tokio::test]
async fn duplicate_registration_conflicts() {
    let h = Harness::new();
    h.register("ada@x.com").await;
    let res = send(
        &h,
        post(
            "/auth/register",
            json!({ "email": "Ada@X.com", "name": "Ada", "password": PASSWORD }),
        ),
    )
    .await;
    assert_eq!(res.status(), StatusCode::CONFLICT);
    assert_eq!(body(res).await["success"], false);
}

#[tokio::test]
async fn login_requires_device_type() {
    let h = Harness::new();
    h.register("ada@x.com").await;

    let res = send(&h, post("/auth/login", json!({ "email": "ada@x.com", "password": PASSWORD }))).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = login(&h, "tablet").await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn login_sets_session_cookies() {
    let h = Harness::new();
    h.register("ada@x.com").await;

    let res = login(&h, "web").await;
    assert_eq!(res.status(), StatusCode::OK);

    let cookies = set_cookies(&res);
    assert_eq!(cookies.len(), 2);
    assert!(cookies.iter().any(|c| c.starts_with("access_token=") && c.contains("HttpOnly")));
    assert!(cookies.iter().any(|c| c.starts_with("refresh_token=") && c.contains("Max-Age=604800")));

    let json = body(res).await;
    assert_eq!(json["data"]["token_type"], "Bearer");
    assert_eq!(json["data"]["expires_in"], 900);
    assert_eq!(json["data"]["is_admin"], false);
}

#[tokio::test]
async fn bad_credentials_are_unauthorized() {
    let h = Harness::new();
    h.register("ada@x.com").await;

    let res = send(
        &h,
        post(
            "/auth/login",
            json!({ "email": "ada@x.com", "password": "wrong-pass1", "device_type": "web" }),
        ),
    )
    .await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn refresh_reads_cookie_when_body_has_none() {
    let h = Harness::new();
    h.register("ada@x.com").await;
    let json = body(login(&h, "web").await).await;
    let refresh = json["data"]["refresh_token"].as_str().unwrap().to_string();

    let mut req = post("/auth/refresh", json!({ "device_type": "web" }));
    req.headers_mut()
        .insert(COOKIE, format!("theme=dark; refresh_token={refresh}").parse().unwrap());
    let res = send(&h, req).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(set_cookies(&res).len(), 2);

    // Rotated away.
    let res = send(
        &h,
        post("/auth/refresh", json!({ "refresh_token": refresh, "device_type": "web" })),
    )
    .await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn refresh_without_credential_is_unauthorized() {
    let h = Harness::new();
    let res = send(&h, post("/auth/refresh", json!({ "device_type": "mobile" }))).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn me_requires_access_token() {
    let h = Harness::new();
    h.register("ada@x.com").await;
    let json = body(login(&h, "mobile").await).await;
    let access = json["data"]["access_token"].as_str().unwrap().to_string();
    let refresh = json["data"]["refresh_token"].as_str().unwrap().to_string();

    let res = send(&h, get("/auth/me")).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let mut req = get("/auth/me");
    req.headers_mut()
        .insert(AUTHORIZATION, format!("Bearer {refresh}").parse().unwrap());
    assert_eq!(send(&h, req).await.status(), StatusCode::UNAUTHORIZED);

    let mut req = get("/auth/me");
    req.headers_mut()
        .insert(AUTHORIZATION, format!("Bearer {access}").parse().unwrap());
    let res = send(&h, req).await;
    assert_eq!(res.status(), StatusCode::OK);
    let json = body(res).await;
    assert_eq!(json["data"]["user"]["email"], "ada@x.com");
    assert_eq!(json["data"]["linked_accounts"]["password_set"], true);

    let mut req = get("/auth/me");
    req.headers_mut()
        .insert(COOKIE, format!("access_token={access}").parse().unwrap());
    assert_eq!(send(&h, req).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn logout_all_clears_cookies_and_sessions() {
    let h = Harness::new();
    h.register("ada@x.com").await;
    let json = body(login(&h, "web").await).await;
    let access = json["data"]["access_token"].as_str().unwrap().to_string();
    let refresh = json["data"]["refresh_token"].as_str().unwrap().to_string();

    let mut req = post("/auth/logout-all", json!({}));
    req.headers_mut()
        .insert(AUTHORIZATION, format!("Bearer {access}").parse().unwrap());
    let res = send(&h, req).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert!(set_cookies(&res).iter().all(|c| c.contains("Max-Age=0")));

    let res = send(
        &h,
        post("/auth/refresh", json!({ "refresh_token": refresh, "device_type": "web" })),
    )
    .await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn verify_email_link_flow() {
    let h = Harness::new();
    h.register("ada@x.com").await;
    let token = h.mailer.last_verification_token().unwrap();

    let res = send(&h, get(&format!("/auth/verify-email?token={token}"))).await;
    assert_eq!(res.status(), StatusCode::OK);

    let res = send(&h, get(&format!("/auth/verify-email?token={token}"))).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn forgot_password_always_succeeds() {
    let h = Harness::new();
    let res = send(&h, post("/auth/forgot-password", json!({ "email": "ghost@x.com" }))).await;
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn health_reports_both_stores() {
    let h = Harness::new();
    let res = send(&h, get("/health")).await;
    assert_eq!(res.status(), StatusCode::OK);
    let json = body(res).await;
    assert_eq!(json["checks"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn provider_routes() {
    let h = Harness::new();

    assert_eq!(send(&h, get("/auth/github/url")).await.status(), StatusCode::NOT_FOUND);
    assert_eq!(send(&h, get("/auth/facebook/url")).await.status(), StatusCode::FORBIDDEN);

    let res = send(&h, get("/auth/google/url?state=abc")).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body(res).await["data"]["state"], "abc");
}

#[tokio::test]
async fn oauth_token_accepts_provider_field_names() {
    let h = Harness::new();
    h.google.answer("google-id-token", profile("g-9", "grace@x.com"));

    let res = send(
        &h,
        post(
            "/auth/google/verify",
            json!({ "id_token": "google-id-token", "device_type": "mobile" }),
        ),
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(set_cookies(&res).len(), 2);
    let json = body(res).await;
    assert_eq!(json["data"]["is_new_user"], true);
    assert_eq!(json["data"]["user"]["email_verified"], true);

    let res = send(
        &h,
        post("/auth/google/exchange", json!({ "code": "unknown", "device_type": "web" })),
    )
    .await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn malformed_json_gets_error_envelope() {
    let h = Harness::new();
    let req = Request::builder()
        .method(Method::POST)
        .uri("/auth/login")
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let res = send(&h, req).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let json = body(res).await;
    assert_eq!(json["success"], false);
    assert!(json["error"]["code"].is_string());
}

#[tokio::test]
async fn bearer_header_wins_over_bad_cookie() {
    let h = Harness::new();
    h.register("ada@x.com").await;
    let json = body(login(&h, "web").await).await;
    let access = json["data"]["access_token"].as_str().unwrap().to_string();

    let mut req = get("/auth/me");
    req.headers_mut()
        .insert(AUTHORIZATION, format!("Bearer {access}").parse().unwrap());
    req.headers_mut()
        .insert(COOKIE, "access_token=not-a-jwt".parse().unwrap());
    assert_eq!(send(&h, req).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn body_refresh_token_wins_over_stale_cookie() {
    let h = Harness::new();
    h.register("ada@x.com").await;
    let json = body(login(&h, "web").await).await;
    let stale = json["data"]["refresh_token"].as_str().unwrap().to_string();

    let res = send(
        &h,
        post("/auth/refresh", json!({ "refresh_token": stale, "device_type": "web" })),
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);
    let live = body(res).await["data"]["refresh_token"].as_str().unwrap().to_string();

    let mut req = post("/auth/refresh", json!({ "refresh_token": live, "device_type": "web" }));
    req.headers_mut()
        .insert(COOKIE, format!("refresh_token={stale}").parse().unwrap());
    let res = send(&h, req).await;
    assert_eq!(res.status(), StatusCode::OK);
    let json = body(res).await;
    assert_ne!(json["data"]["refresh_token"], live.as_str());

    // The body credential was the one consumed.
    let res = send(
        &h,
        post("/auth/refresh", json!({ "refresh_token": live, "device_type": "web" })),
    )
    .await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn refresh_returns_user_snapshot() {
    let h = Harness::new();
    h.register("ada@x.com").await;
    let json = body(login(&h, "mobile").await).await;
    let refresh = json["data"]["refresh_token"].as_str().unwrap().to_string();

    let res = send(
        &h,
        post("/auth/refresh", json!({ "refresh_token": refresh, "device_type": "mobile" })),
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);
    let json = body(res).await;
    assert_eq!(json["data"]["user"]["email"], "ada@x.com");
    assert_eq!(json["data"]["is_admin"], false);
    assert_eq!(json["data"]["token_type"], "Bearer");
    assert!(json["data"].get("is_new_user").is_none());
}

#[tokio::test]
async fn local_credential_routes_can_be_disabled() {
    let h = Harness::with_options(HarnessOptions {
        email_password_enabled: false,
        ..Default::default()
    });

    for (method, uri) in [
        (Method::POST, "/auth/register"),
        (Method::POST, "/auth/login"),
        (Method::GET, "/auth/verify-email?token=abc"),
        (Method::POST, "/auth/resend-verification"),
        (Method::POST, "/auth/forgot-password"),
        (Method::POST, "/auth/reset-password"),
        (Method::POST, "/auth/change-password"),
    ] {
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from("{}"))
            .unwrap();
        assert_eq!(send(&h, req).await.status(), StatusCode::NOT_FOUND, "{uri}");
    }

    let res = send(&h, post("/auth/refresh", json!({ "device_type": "web" }))).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(send(&h, get("/auth/google/url")).await.status(), StatusCode::OK);
}

fn from_client(mut req: Request<Body>, ip: &str) -> Request<Body> {
    req.headers_mut().insert("x-forwarded-for", ip.parse().unwrap());
    req
}

#[tokio::test]
async fn auth_routes_are_rate_limited_per_client() {
    let h = Harness::with_options(HarnessOptions {
        rate_limit: Some(RateLimitPolicy {
            max_requests: 2,
            window: Duration::from_secs(60),
        }),
        ..Default::default()
    });

    for _ in 0..2 {
        let req = from_client(post("/auth/refresh", json!({ "device_type": "web" })), "203.0.113.7");
        assert_eq!(send(&h, req).await.status(), StatusCode::UNAUTHORIZED);
    }

    let req = from_client(post("/auth/refresh", json!({ "device_type": "web" })), "203.0.113.7");
    let res = send(&h, req).await;
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    let json = body(res).await;
    assert_eq!(json["success"], false);
    assert_eq!(json["error"]["code"], "E0006");

    let req = from_client(get("/auth/google/url"), "198.51.100.2");
    assert_eq!(send(&h, req).await.status(), StatusCode::OK);

    let req = from_client(get("/health"), "203.0.113.7");
    assert_eq!(send(&h, req).await.status(), StatusCode::OK);
}
