use axum::extract::FromRequest;

use keystone_shared::errors::{AppError, AppResult};
use keystone_shared::types::auth::{DeviceType, OAuthProvider};

pub mod change_password;
pub mod forgot_password;
pub mod health;
pub mod login;
pub mod logout;
pub mod me;
pub mod oauth;
pub mod refresh;
pub mod register;
pub mod resend_verification;
pub mod reset_password;
pub mod verify_email;

/// JSON body whose rejections render through the error envelope.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

/// Parses the mandatory `device_type` field. Runs before any credential work.
pub fn device_type(value: Option<&str>) -> AppResult<DeviceType> {
    value
        .ok_or_else(|| AppError::bad_request("device_type is required"))?
        .parse()
        .map_err(|_| AppError::bad_request("device_type must be 'web' or 'mobile'"))
}

pub fn provider(value: &str) -> AppResult<OAuthProvider> {
    value
        .parse()
        .map_err(|_| AppError::not_found(format!("unknown provider: {value}")))
}
