pub mod auth;
pub mod identity;
pub mod oauth;
pub mod password;
pub mod session;
pub mod signing;

pub use auth::{AuthService, AuthServiceParts};
