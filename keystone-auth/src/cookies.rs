use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderName};

use keystone_shared::types::auth::TokenPair;

use crate::config::CookieConfig;

pub const ACCESS_COOKIE: &str = "access_token";
pub const REFRESH_COOKIE: &str = "refresh_token";

fn cookie(config: &CookieConfig, name: &str, value: &str, max_age: i64) -> String {
    let mut cookie = format!("{name}={value}; Path=/; Max-Age={max_age}; HttpOnly; SameSite=Lax");
    if config.secure {
        cookie.push_str("; Secure");
    }
    if let Some(domain) = &config.domain {
        cookie.push_str("; Domain=");
        cookie.push_str(domain);
    }
    cookie
}

/// `Set-Cookie` headers carrying a freshly issued pair.
pub fn session_cookies(config: &CookieConfig, tokens: &TokenPair) -> [(HeaderName, String); 2] {
    [
        (SET_COOKIE, cookie(config, ACCESS_COOKIE, &tokens.access_token, config.access_max_age)),
        (SET_COOKIE, cookie(config, REFRESH_COOKIE, &tokens.refresh_token, config.refresh_max_age)),
    ]
}

pub fn cleared_cookies(config: &CookieConfig) -> [(HeaderName, String); 2] {
    [
        (SET_COOKIE, cookie(config, ACCESS_COOKIE, "", 0)),
        (SET_COOKIE, cookie(config, REFRESH_COOKIE, "", 0)),
    ]
}

/// First non-empty value of `name` across all `Cookie` headers.
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, v)| *k == name && !v.is_empty())
        .map(|(_, v)| v.to_string())
}
