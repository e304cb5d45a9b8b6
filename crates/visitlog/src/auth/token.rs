//! Bearer access tokens.
//!
//! Tokens are HS256-signed JWTs carrying the operator's login, id and role.

use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::config::MIN_SECRET_LEN;
use crate::error::{Error, Result};
use crate::models::{Role, User};

/// Secret used when no `secret_key` is configured.
const DEV_SECRET: &str = "visitlog-dev-secret-not-for-production-use";

/// Payload stored in an access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Operator login.
    pub sub: String,
    /// Operator id.
    pub uid: i64,
    /// Role at issue time.
    pub role: Role,
    /// Issued at (Unix timestamp).
    pub iat: i64,
    /// Expiration time (Unix timestamp).
    pub exp: i64,
}

/// Response body of a successful login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    /// Signed token.
    pub access_token: String,
    /// Always `bearer`.
    pub token_type: String,
    /// Lifetime in seconds.
    pub expires_in: u64,
}

/// Issues and verifies access tokens.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    expiry: Duration,
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("expiry", &self.expiry)
            .finish_non_exhaustive()
    }
}

impl TokenIssuer {
    /// Create an issuer with the given signing secret.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the secret is too short.
    pub fn new(secret: &str, expiry: Duration) -> Result<Self> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(Error::ConfigValidation {
                message: format!("secret_key must be at least {MIN_SECRET_LEN} characters"),
            });
        }
        Ok(Self::with_secret(secret, expiry))
    }

    /// Create an issuer with the built-in development secret.
    #[must_use]
    pub fn new_dev(expiry: Duration) -> Self {
        Self::with_secret(DEV_SECRET, expiry)
    }

    fn with_secret(secret: &str, expiry: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            expiry,
        }
    }

    /// Issue a token for an authenticated operator.
    ///
    /// # Errors
    ///
    /// Returns an auth error if signing fails.
    pub fn issue(&self, user: &User) -> Result<AccessToken> {
        let iat = Utc::now().timestamp();
        let expires_in = self.expiry.as_secs();
        let claims = Claims {
            sub: user.login.clone(),
            uid: user.id,
            role: user.role,
            iat,
            exp: iat.saturating_add(i64::try_from(expires_in).unwrap_or(i64::MAX)),
        };

        let access_token = encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| Error::auth(format!("failed to sign token: {e}")))?;

        Ok(AccessToken {
            access_token,
            token_type: "bearer".to_string(),
            expires_in,
        })
    }

    /// Verify a token and return its claims.
    ///
    /// # Errors
    ///
    /// Returns an unauthorized error for expired, malformed or tampered tokens.
    pub fn verify(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::default();
        validation.leeway = 0;

        decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|err| {
                let reason = match err.kind() {
                    ErrorKind::ExpiredSignature => "token expired",
                    ErrorKind::InvalidSignature => "invalid token signature",
                    _ => "invalid token",
                };
                Error::unauthorized(reason)
            })
    }
}

/// Extract the token from an `Authorization` header value.
///
/// Only the `Bearer` scheme is accepted; the scheme name is case-insensitive.
#[must_use]
pub fn extract_bearer(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}
