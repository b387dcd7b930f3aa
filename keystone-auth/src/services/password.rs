use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::RngCore;

use crate::error::AuthError;

/// `hash(plain) -> digest`, `verify(plain, digest) -> bool`.
pub trait CredentialHasher: Send + Sync {
    fn hash(&self, plain: &str) -> Result<String, AuthError>;
    fn verify(&self, plain: &str, digest: &str) -> Result<bool, AuthError>;
}

#[derive(Default)]
pub struct Argon2Hasher {
    argon2: Argon2<'static>,
}

impl Argon2Hasher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Argon2id with explicit memory (KiB) and iteration cost.
    pub fn with_cost(m_cost: u32, t_cost: u32) -> Result<Self, AuthError> {
        let params = Params::new(m_cost, t_cost, 1, None)
            .map_err(|e| AuthError::Internal(format!("invalid argon2 params: {e}")))?;
        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }
}

impl CredentialHasher for Argon2Hasher {
    fn hash(&self, plain: &str) -> Result<String, AuthError> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2
            .hash_password(plain.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| AuthError::Internal(format!("password hashing failed: {e}")))
    }

    fn verify(&self, plain: &str, digest: &str) -> Result<bool, AuthError> {
        let parsed = PasswordHash::new(digest)
            .map_err(|e| AuthError::Internal(format!("invalid password hash: {e}")))?;
        Ok(self.argon2.verify_password(plain.as_bytes(), &parsed).is_ok())
    }
}

pub fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.len() < 8 {
        return Err(AuthError::WeakPassword("password must be at least 8 characters".into()));
    }
    if password.len() > 128 {
        return Err(AuthError::WeakPassword("password must be at most 128 characters".into()));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(AuthError::WeakPassword("password must contain at least one number".into()));
    }
    if !password.chars().any(|c| c.is_alphabetic()) {
        return Err(AuthError::WeakPassword("password must contain at least one letter".into()));
    }
    Ok(())
}

/// 256 random bits, hex encoded. Used for email verification and reset links.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
