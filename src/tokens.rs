//! Access/refresh token issuing and verification.
//!
//! Access tokens are short-lived and carry enough of the user to render a
//! header without a lookup. Refresh tokens only identify the user; the copy
//! stored on the user row decides whether a refresh token is still current.

use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::TokenSettings;
use crate::models::UserRecord;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token signing failed: {0}")]
    Encode(#[source] jsonwebtoken::errors::Error),
    #[error("token rejected: {0}")]
    Invalid(#[source] jsonwebtoken::errors::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessClaims {
    #[serde(rename = "_id")]
    pub id: String,
    pub email: String,
    pub username: String,
    #[serde(rename = "fullName")]
    pub full_name: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RefreshClaims {
    #[serde(rename = "_id")]
    pub id: String,
    /// Random nonce so two pairs issued within the same second still differ.
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Clone)]
struct Keys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl Keys {
    fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    fn window(&self) -> (i64, i64) {
        let now = Utc::now().timestamp();
        let ttl = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        (now, now.saturating_add(ttl))
    }
}

#[derive(Clone)]
pub struct TokenService {
    access: Keys,
    refresh: Keys,
    validation: Validation,
}

impl TokenService {
    pub fn new(settings: &TokenSettings) -> Self {
        Self {
            access: Keys::new(&settings.access_secret, settings.access_ttl),
            refresh: Keys::new(&settings.refresh_secret, settings.refresh_ttl),
            validation: Validation::default(),
        }
    }

    pub fn access_ttl(&self) -> Duration {
        self.access.ttl
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh.ttl
    }

    pub fn issue_access(&self, user: &UserRecord) -> Result<String, TokenError> {
        let (iat, exp) = self.access.window();
        let claims = AccessClaims {
            id: user.id.clone(),
            email: user.email.clone(),
            username: user.username.clone(),
            full_name: user.full_name.clone(),
            iat,
            exp,
        };
        encode(&Header::default(), &claims, &self.access.encoding).map_err(TokenError::Encode)
    }

    pub fn issue_refresh(&self, user_id: &str) -> Result<String, TokenError> {
        let (iat, exp) = self.refresh.window();
        let claims = RefreshClaims {
            id: user_id.to_string(),
            jti: random_nonce(),
            iat,
            exp,
        };
        encode(&Header::default(), &claims, &self.refresh.encoding).map_err(TokenError::Encode)
    }

    pub fn issue_pair(&self, user: &UserRecord) -> Result<TokenPair, TokenError> {
        Ok(TokenPair {
            access_token: self.issue_access(user)?,
            refresh_token: self.issue_refresh(&user.id)?,
        })
    }

    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, TokenError> {
        decode::<AccessClaims>(token, &self.access.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(TokenError::Invalid)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, TokenError> {
        decode::<RefreshClaims>(token, &self.refresh.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(TokenError::Invalid)
    }
}

fn random_nonce() -> String {
    let mut bytes = [0u8; 12];
    OsRng.fill_bytes(&mut bytes);
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}
