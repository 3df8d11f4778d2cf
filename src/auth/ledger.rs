//! Issuance and redemption of single-use verification tokens.
//!
//! One ledger fronts both email-verification and password-reset tokens;
//! the kind is pinned at issue time and checked again at redemption so a
//! reset token can never verify an email address.

use std::sync::Arc;

use anyhow::anyhow;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::auth::{error::AuthError, secret};
use crate::store::{StoreError, TokenKind, TokenStore, VerificationToken};

/// Tokens default to a 24-hour lifetime.
pub const DEFAULT_TTL_SECONDS: i64 = 86_400;

/// Bound on value-collision retries at issue time.
const MAX_ISSUE_ATTEMPTS: usize = 10;

#[derive(Clone)]
pub struct TokenLedger {
    tokens: Arc<dyn TokenStore + Send + Sync>,
    ttl: Duration,
}

impl TokenLedger {
    #[must_use]
    pub fn new(tokens: Arc<dyn TokenStore + Send + Sync>) -> Self {
        Self {
            tokens,
            ttl: Duration::seconds(DEFAULT_TTL_SECONDS),
        }
    }

    #[must_use]
    pub fn with_ttl_seconds(mut self, seconds: i64) -> Self {
        self.ttl = Duration::seconds(seconds.max(1));
        self
    }

    /// Issue a fresh single-use token for `account_id`.
    ///
    /// Value collisions are vanishingly rare but not impossible, so a
    /// `Duplicate` from the store retries with a new value up to
    /// [`MAX_ISSUE_ATTEMPTS`] times.
    pub async fn issue(
        &self,
        account_id: Uuid,
        kind: TokenKind,
        now: DateTime<Utc>,
    ) -> Result<String, AuthError> {
        for _ in 0..MAX_ISSUE_ATTEMPTS {
            let value = secret::generate(secret::DEFAULT_LENGTH);
            let token = VerificationToken {
                id: Uuid::new_v4(),
                account_id,
                kind,
                value: value.clone(),
                expires_at: now + self.ttl,
                used: false,
                created_at: now,
            };
            match self.tokens.create(token).await {
                Ok(()) => return Ok(value),
                Err(StoreError::Duplicate) => continue,
                Err(err) => return Err(AuthError::Internal(anyhow!(err))),
            }
        }
        Err(AuthError::Internal(anyhow!(
            "token value collided {MAX_ISSUE_ATTEMPTS} times in a row"
        )))
    }

    /// Redeem a token value, returning the account it belongs to.
    ///
    /// Unknown values and kind mismatches are indistinguishable to the
    /// caller; a replay of a spent token reports [`AuthError::TokenAlreadyUsed`]
    /// and the used-flag flip is atomic, so exactly one of two racing
    /// redemptions wins.
    pub async fn redeem(
        &self,
        value: &str,
        kind: TokenKind,
        now: DateTime<Utc>,
    ) -> Result<Uuid, AuthError> {
        let token = self
            .tokens
            .find_by_value(value)
            .await
            .map_err(|err| AuthError::Internal(anyhow!(err)))?
            .ok_or(AuthError::TokenInvalid)?;

        if token.kind != kind {
            return Err(AuthError::TokenInvalid);
        }
        if token.used {
            return Err(AuthError::TokenAlreadyUsed);
        }
        if now > token.expires_at {
            return Err(AuthError::TokenExpired);
        }

        let won = self
            .tokens
            .mark_used_if_unused(token.id)
            .await
            .map_err(|err| AuthError::Internal(anyhow!(err)))?;
        if !won {
            return Err(AuthError::TokenAlreadyUsed);
        }
        Ok(token.account_id)
    }
}
