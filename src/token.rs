//! Access / refresh token issuance and access-token verification.
//!
//! Access tokens are HS256 JWTs carrying `{sub, exp, authorized}`. Refresh
//! tokens are 24 random alphanumerics with no structure; they only mean
//! something through the session row that holds their hash.

use axum::http::{HeaderMap, Uri, header::AUTHORIZATION};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::{Rng, distributions::Alphanumeric, rngs::OsRng};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use thiserror::Error;
use utoipa::ToSchema;

use crate::clock::Clock;

pub const REFRESH_TOKEN_LENGTH: usize = 24;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token configuration: {0}")]
    Config(&'static str),
    #[error("token signing failed: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
    #[error("invalid token: {0}")]
    Invalid(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
    pub authorized: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    #[serde(rename = "token")]
    pub access_token: String,
    pub refresh_token: String,
    #[serde(rename = "userId")]
    pub principal_id: String,
}

#[derive(Clone, Debug)]
pub struct TokenConfig {
    secret: SecretString,
    access_ttl_hours: i64,
    refresh_ttl_hours: i64,
}

impl TokenConfig {
    /// Defaults: one hour access tokens, one week refresh.
    #[must_use]
    pub fn new(secret: SecretString) -> Self {
        Self {
            secret,
            access_ttl_hours: 1,
            refresh_ttl_hours: 168,
        }
    }

    #[must_use]
    pub fn with_access_ttl_hours(mut self, hours: i64) -> Self {
        self.access_ttl_hours = hours;
        self
    }

    #[must_use]
    pub fn with_refresh_ttl_hours(mut self, hours: i64) -> Self {
        self.refresh_ttl_hours = hours;
        self
    }

    #[must_use]
    pub fn access_ttl_hours(&self) -> i64 {
        self.access_ttl_hours
    }

    #[must_use]
    pub fn refresh_ttl_hours(&self) -> i64 {
        self.refresh_ttl_hours
    }

    /// # Errors
    /// Returns `TokenError::Config` on an empty secret or a non-positive TTL.
    pub fn validate(&self) -> Result<(), TokenError> {
        if self.secret.expose_secret().is_empty() {
            return Err(TokenError::Config("signing secret is empty"));
        }
        if self.access_ttl_hours <= 0 {
            return Err(TokenError::Config("access token TTL must be positive"));
        }
        if self.refresh_ttl_hours <= 0 {
            return Err(TokenError::Config("refresh token TTL must be positive"));
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct TokenService {
    config: TokenConfig,
    clock: Arc<dyn Clock>,
}

impl TokenService {
    #[must_use]
    pub fn new(config: TokenConfig, clock: Arc<dyn Clock>) -> Self {
        Self { config, clock }
    }

    #[must_use]
    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    /// # Errors
    /// Returns `TokenError::Config` for unusable configuration, `Signing` if encoding fails.
    pub fn generate_pair(&self, principal_id: &str) -> Result<TokenPair, TokenError> {
        self.config.validate()?;
        let claims = Claims {
            sub: principal_id.to_string(),
            exp: self.clock.now_unix() + self.config.access_ttl_hours * 3600,
            authorized: true,
        };
        let key = EncodingKey::from_secret(self.config.secret.expose_secret().as_bytes());
        let access_token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &key)?;
        Ok(TokenPair {
            access_token,
            refresh_token: generate_refresh_token(),
            principal_id: principal_id.to_string(),
        })
    }

    /// Verify signature and expiry, returning the claims.
    ///
    /// # Errors
    /// Returns `TokenError::Invalid` for a non-HMAC algorithm, bad signature,
    /// expired or unauthorized token.
    pub fn validate_access_token(&self, raw: &str) -> Result<Claims, TokenError> {
        let key = DecodingKey::from_secret(self.config.secret.expose_secret().as_bytes());
        let mut validation = Validation::new(Algorithm::HS256);
        validation.algorithms = vec![Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];
        // Expiry is checked against the injected clock below.
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let data = jsonwebtoken::decode::<Claims>(raw, &key, &validation)
            .map_err(|err| TokenError::Invalid(err.to_string()))?;
        if data.claims.exp <= self.clock.now_unix() {
            return Err(TokenError::Invalid("token expired".to_string()));
        }
        if !data.claims.authorized {
            return Err(TokenError::Invalid("token not authorized".to_string()));
        }
        Ok(data.claims)
    }

    /// Principal id from the `token` query parameter, else the bearer header.
    ///
    /// # Errors
    /// Returns `TokenError::Invalid` when no token is present or it fails validation.
    pub fn extract_principal(&self, uri: &Uri, headers: &HeaderMap) -> Result<String, TokenError> {
        let raw = extract_raw_token(uri, headers)
            .ok_or_else(|| TokenError::Invalid("missing token".to_string()))?;
        Ok(self.validate_access_token(&raw)?.sub)
    }
}

#[must_use]
pub fn generate_refresh_token() -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(REFRESH_TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

/// Hex SHA-256 of a refresh token; the only form that is persisted.
#[must_use]
pub fn hash_refresh_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

#[must_use]
pub fn extract_raw_token(uri: &Uri, headers: &HeaderMap) -> Option<String> {
    query_token(uri).or_else(|| extract_bearer_token(headers))
}

fn query_token(uri: &Uri) -> Option<String> {
    let query = uri.query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "token")
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub(crate) fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}
