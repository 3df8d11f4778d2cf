//! Collaborator contracts for persistence and audit.
//!
//! The engine computes and validates; these traits own durability.
//! Uniqueness of usernames, emails, session secrets, and token values is
//! enforced at the storage layer, and the operations the engine relies
//! on for correctness under concurrency (`mark_used_if_unused`, the
//! failed-attempt counter) are atomic in every implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::auth::lockout::{LockState, LockoutPolicy};
use crate::auth::secret;

pub mod memory;
pub mod postgres;

/// Length of the random part of a per-account session secret.
pub const SESSION_SECRET_LENGTH: usize = 48;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A unique constraint (username, email, token value, ...) was hit.
    #[error("duplicate value")]
    Duplicate,
    #[error("record not found")]
    NotFound,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Clone, Debug)]
pub struct Account {
    pub id: Uuid,
    pub fullname: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub verified: bool,
    pub failed_attempts: u32,
    pub lock_until: Option<DateTime<Utc>>,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    /// Long-lived secret binding session tokens to this account.
    /// Rotating it invalidates every outstanding session token.
    pub session_secret: String,
}

impl Account {
    #[must_use]
    pub fn new(fullname: String, username: String, email: String, password_hash: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            fullname,
            username,
            email,
            password_hash,
            role: "user".to_string(),
            verified: false,
            failed_attempts: 0,
            lock_until: None,
            last_login: None,
            created_at: Utc::now(),
            session_secret: secret::generate(SESSION_SECRET_LENGTH),
        }
    }
}

/// What a single-use token authorizes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenKind {
    EmailVerify,
    PasswordReset,
}

impl TokenKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EmailVerify => "email_verify",
            Self::PasswordReset => "password_reset",
        }
    }
}

#[derive(Clone, Debug)]
pub struct VerificationToken {
    pub id: Uuid,
    pub account_id: Uuid,
    pub kind: TokenKind,
    pub value: String,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuditAction {
    Registration,
    LoginSuccess,
    LoginFailure,
    Lockout,
    EmailVerified,
    PasswordResetRequested,
    PasswordResetCompleted,
    Logout,
    AccountDeleted,
}

impl AuditAction {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Registration => "registration",
            Self::LoginSuccess => "login_success",
            Self::LoginFailure => "login_failure",
            Self::Lockout => "lockout",
            Self::EmailVerified => "email_verified",
            Self::PasswordResetRequested => "password_reset_requested",
            Self::PasswordResetCompleted => "password_reset_completed",
            Self::Logout => "logout",
            Self::AccountDeleted => "account_deleted",
        }
    }
}

/// Append-only record of a security-relevant action.
#[derive(Clone, Debug)]
pub struct AuditEvent {
    pub account_id: Option<Uuid>,
    pub client_addr: Option<String>,
    pub action: AuditAction,
    pub success: bool,
    pub detail: String,
    pub at: DateTime<Utc>,
}

impl AuditEvent {
    #[must_use]
    pub fn new(action: AuditAction, success: bool, detail: impl Into<String>) -> Self {
        Self {
            account_id: None,
            client_addr: None,
            action,
            success,
            detail: detail.into(),
            at: Utc::now(),
        }
    }

    #[must_use]
    pub fn account(mut self, account_id: Uuid) -> Self {
        self.account_id = Some(account_id);
        self
    }

    #[must_use]
    pub fn client(mut self, addr: Option<String>) -> Self {
        self.client_addr = addr;
        self
    }
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>, StoreError>;
    async fn find_by_username(&self, username: &str) -> Result<Option<Account>, StoreError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError>;
    async fn find_by_session_secret(&self, secret: &str) -> Result<Option<Account>, StoreError>;

    /// Fails with [`StoreError::Duplicate`] on a username/email collision.
    async fn create(&self, account: Account) -> Result<Account, StoreError>;
    async fn update(&self, account: &Account) -> Result<(), StoreError>;
    async fn delete(&self, id: Uuid) -> Result<(), StoreError>;

    /// Atomically bump the failure counter and apply the lock when the
    /// threshold is reached. Concurrent failures must not undercount.
    async fn record_login_failure(
        &self,
        id: Uuid,
        policy: &LockoutPolicy,
        now: DateTime<Utc>,
    ) -> Result<LockState, StoreError>;

    /// Reset the failure counter, clear the lock, stamp last-login.
    async fn record_login_success(&self, id: Uuid, now: DateTime<Utc>) -> Result<(), StoreError>;

    /// Flip the verified flag without touching any other column, so a
    /// concurrent failure-counter bump is never overwritten.
    async fn mark_verified(&self, id: Uuid) -> Result<(), StoreError>;

    /// Replace password hash and session secret in one step, clearing
    /// the failure counter and lock with them.
    async fn replace_credentials(
        &self,
        id: Uuid,
        password_hash: &str,
        session_secret: &str,
    ) -> Result<(), StoreError>;

    /// Replace the account's session secret, revoking all outstanding
    /// session tokens at once.
    async fn rotate_session_secret(&self, id: Uuid, new_secret: &str) -> Result<(), StoreError>;
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Fails with [`StoreError::Duplicate`] when the value already exists.
    async fn create(&self, token: VerificationToken) -> Result<(), StoreError>;
    async fn find_by_value(&self, value: &str) -> Result<Option<VerificationToken>, StoreError>;

    /// Atomic check-then-mark: returns `true` for exactly one caller per
    /// token, `false` for everyone else (and forever after).
    async fn mark_used_if_unused(&self, id: Uuid) -> Result<bool, StoreError>;
}

/// Fire-and-forget audit recording; implementations swallow their own
/// failures so the primary operation never depends on the sink.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: AuditEvent);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_account_defaults() {
        let acct = Account::new(
            "Alice Example".to_string(),
            "alice".to_string(),
            "alice@example.com".to_string(),
            "hash".to_string(),
        );
        assert_eq!(acct.role, "user");
        assert!(!acct.verified);
        assert_eq!(acct.failed_attempts, 0);
        assert!(acct.lock_until.is_none());
        assert!(acct.last_login.is_none());
        assert!(acct.session_secret.starts_with(secret::TOKEN_PREFIX));
    }

    #[test]
    fn audit_event_builder() {
        let id = Uuid::new_v4();
        let event = AuditEvent::new(AuditAction::LoginFailure, false, "bad password")
            .account(id)
            .client(Some("1.2.3.4".to_string()));
        assert_eq!(event.account_id, Some(id));
        assert_eq!(event.client_addr.as_deref(), Some("1.2.3.4"));
        assert_eq!(event.action.as_str(), "login_failure");
        assert!(!event.success);
    }

    #[test]
    fn token_kind_names() {
        assert_eq!(TokenKind::EmailVerify.as_str(), "email_verify");
        assert_eq!(TokenKind::PasswordReset.as_str(), "password_reset");
    }
}
