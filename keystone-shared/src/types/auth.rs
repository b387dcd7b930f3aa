use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Client category that owns an independent refresh-credential slot per user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Web,
    Mobile,
}

impl DeviceType {
    pub const ALL: [DeviceType; 2] = [DeviceType::Web, DeviceType::Mobile];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Web => "web",
            DeviceType::Mobile => "mobile",
        }
    }
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DeviceType {
    type Err = String;

    // Exact match only: "Web" or " web" are client errors.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "web" => Ok(DeviceType::Web),
            "mobile" => Ok(DeviceType::Mobile),
            _ => Err(format!("unknown device type: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OAuthProvider {
    Google,
    Facebook,
}

impl OAuthProvider {
    pub const ALL: [OAuthProvider; 2] = [OAuthProvider::Google, OAuthProvider::Facebook];

    pub fn as_str(&self) -> &'static str {
        match self {
            OAuthProvider::Google => "google",
            OAuthProvider::Facebook => "facebook",
        }
    }
}

impl std::fmt::Display for OAuthProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OAuthProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "google" => Ok(OAuthProvider::Google),
            "facebook" => Ok(OAuthProvider::Facebook),
            _ => Err(format!("unknown oauth provider: {s}")),
        }
    }
}

/// Claim set shared by access and refresh credentials.
///
/// `jti` keeps two credentials minted for the same user within the same
/// second distinct, so a rotated refresh credential never equals its
/// predecessor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub email: String,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: Uuid,
}

impl Claims {
    pub fn new(user_id: i64, email: impl Into<String>, issuer: impl Into<String>, duration_secs: i64) -> Self {
        let now = Utc::now().timestamp();
        Self {
            sub: user_id,
            email: email.into(),
            iss: issuer.into(),
            iat: now,
            exp: now + duration_secs,
            jti: Uuid::now_v7(),
        }
    }

    pub fn user_id(&self) -> i64 {
        self.sub
    }

    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() >= self.exp
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

impl TokenPair {
    pub fn new(access_token: String, refresh_token: String, expires_in: i64) -> Self {
        Self {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_type_parses_exact_values() {
        assert_eq!("web".parse::<DeviceType>(), Ok(DeviceType::Web));
        assert_eq!("mobile".parse::<DeviceType>(), Ok(DeviceType::Mobile));
        assert!("tablet".parse::<DeviceType>().is_err());
        assert!("WEB".parse::<DeviceType>().is_err());
        assert!("".parse::<DeviceType>().is_err());
    }

    #[test]
    fn device_type_serde_lowercase() {
        let json = serde_json::to_string(&DeviceType::Mobile).unwrap();
        assert_eq!(json, "\"mobile\"");
    }

    #[test]
    fn provider_round_trips_display() {
        for provider in OAuthProvider::ALL {
            assert_eq!(provider.to_string().parse::<OAuthProvider>(), Ok(provider));
        }
        assert!("github".parse::<OAuthProvider>().is_err());
    }

    #[test]
    fn claims_are_unique_per_issue() {
        let a = Claims::new(7, "a@x.com", "keystone", 60);
        let b = Claims::new(7, "a@x.com", "keystone", 60);
        assert_ne!(a.jti, b.jti);
        assert!(!a.is_expired());
        assert_eq!(a.user_id(), 7);
    }
}
