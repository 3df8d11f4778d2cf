//! Stateless session tokens.
//!
//! A session token is an HS256 JWT whose subject is the account's
//! server-side session secret. The JWT itself carries no identity; the
//! secret must still resolve to an account at request time, which is
//! what makes rotation an effective revocation.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::auth::error::AuthError;

/// Sessions default to a 2-hour lifetime.
pub const DEFAULT_TTL_SECONDS: i64 = 7_200;

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionClaims {
    /// The account's session secret.
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Clone)]
pub struct SessionCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl SessionCodec {
    #[must_use]
    pub fn new(signing_key: &SecretString) -> Self {
        let bytes = signing_key.expose_secret().as_bytes();
        Self {
            encoding: EncodingKey::from_secret(bytes),
            decoding: DecodingKey::from_secret(bytes),
            ttl: Duration::seconds(DEFAULT_TTL_SECONDS),
        }
    }

    #[must_use]
    pub fn with_ttl_seconds(mut self, seconds: i64) -> Self {
        self.ttl = Duration::seconds(seconds.max(1));
        self
    }

    #[must_use]
    pub fn ttl_seconds(&self) -> i64 {
        self.ttl.num_seconds()
    }

    pub fn issue(&self, session_secret: &str, now: DateTime<Utc>) -> Result<String, AuthError> {
        let claims = SessionClaims {
            sub: session_secret.to_string(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|err| AuthError::Internal(err.into()))
    }

    /// Decode a session token back into its claims.
    ///
    /// Expiry is reported distinctly so callers can tell a stale
    /// session apart from a forged one.
    pub fn decode(&self, token: &str) -> Result<SessionClaims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        match decode::<SessionClaims>(token, &self.decoding, &validation) {
            Ok(data) => Ok(data.claims),
            Err(err) if matches!(err.kind(), ErrorKind::ExpiredSignature) => {
                Err(AuthError::TokenExpired)
            }
            Err(_) => Err(AuthError::TokenInvalid),
        }
    }
}
