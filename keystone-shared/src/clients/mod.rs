pub mod email;
pub mod redis;
pub mod smtp;
