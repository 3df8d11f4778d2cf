//! Postgres-backed store implementations.
//!
//! Token values are hashed before they touch the database, so a leaked
//! table gives an attacker nothing redeemable. Failure counting and the
//! used-flag flip run as single atomic statements; application code
//! never does read-modify-write on either.

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use sqlx::{PgPool, Row};
use tracing::{warn, Instrument};
use uuid::Uuid;

use crate::auth::lockout::{LockState, LockoutPolicy};

use super::{
    Account, AccountStore, AuditEvent, AuditSink, StoreError, TokenKind, TokenStore,
    VerificationToken,
};

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

fn map_sqlx(err: sqlx::Error, context: &'static str) -> StoreError {
    if is_unique_violation(&err) {
        StoreError::Duplicate
    } else {
        StoreError::Other(anyhow!(err).context(context))
    }
}

/// Hash a token value so raw secrets never touch the database.
fn hash_token_value(value: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    hasher.finalize().to_vec()
}

fn account_from_row(row: &sqlx::postgres::PgRow) -> Account {
    let failed: i32 = row.get("failed_attempts");
    Account {
        id: row.get("id"),
        fullname: row.get("fullname"),
        username: row.get("username"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        role: row.get("role"),
        verified: row.get("verified"),
        failed_attempts: u32::try_from(failed).unwrap_or(0),
        lock_until: row.get("lock_until"),
        last_login: row.get("last_login"),
        created_at: row.get("created_at"),
        session_secret: row.get("session_secret"),
    }
}

const ACCOUNT_COLUMNS: &str = "id, fullname, username, email, password_hash, role, verified, \
     failed_attempts, lock_until, last_login, created_at, session_secret";

#[derive(Clone, Debug)]
pub struct PgAccountStore {
    pool: PgPool,
}

impl PgAccountStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_one(&self, column: &str, value: &str) -> Result<Option<Account>, StoreError> {
        let query =
            format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE {column} = $1 LIMIT 1");
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = %query
        );
        let row = sqlx::query(&query)
            .bind(value)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| map_sqlx(err, "failed to lookup account"))?;
        Ok(row.map(|row| account_from_row(&row)))
    }
}

#[async_trait]
impl AccountStore for PgAccountStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>, StoreError> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1 LIMIT 1");
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = %query
        );
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| map_sqlx(err, "failed to lookup account by id"))?;
        Ok(row.map(|row| account_from_row(&row)))
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<Account>, StoreError> {
        self.find_one("username", username).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        self.find_one("email", email).await
    }

    async fn find_by_session_secret(&self, secret: &str) -> Result<Option<Account>, StoreError> {
        self.find_one("session_secret", secret).await
    }

    async fn create(&self, account: Account) -> Result<Account, StoreError> {
        let query = r"
            INSERT INTO accounts
                (id, fullname, username, email, password_hash, role, verified,
                 failed_attempts, lock_until, last_login, created_at, session_secret)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(account.id)
            .bind(&account.fullname)
            .bind(&account.username)
            .bind(&account.email)
            .bind(&account.password_hash)
            .bind(&account.role)
            .bind(account.verified)
            .bind(i32::try_from(account.failed_attempts).unwrap_or(i32::MAX))
            .bind(account.lock_until)
            .bind(account.last_login)
            .bind(account.created_at)
            .bind(&account.session_secret)
            .execute(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| map_sqlx(err, "failed to insert account"))?;
        Ok(account)
    }

    async fn update(&self, account: &Account) -> Result<(), StoreError> {
        let query = r"
            UPDATE accounts
            SET fullname = $2, username = $3, email = $4, password_hash = $5,
                role = $6, verified = $7, failed_attempts = $8, lock_until = $9,
                last_login = $10, session_secret = $11
            WHERE id = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(account.id)
            .bind(&account.fullname)
            .bind(&account.username)
            .bind(&account.email)
            .bind(&account.password_hash)
            .bind(&account.role)
            .bind(account.verified)
            .bind(i32::try_from(account.failed_attempts).unwrap_or(i32::MAX))
            .bind(account.lock_until)
            .bind(account.last_login)
            .bind(&account.session_secret)
            .execute(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| map_sqlx(err, "failed to update account"))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        let query = "DELETE FROM accounts WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| map_sqlx(err, "failed to delete account"))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn record_login_failure(
        &self,
        id: Uuid,
        policy: &LockoutPolicy,
        now: DateTime<Utc>,
    ) -> Result<LockState, StoreError> {
        // Atomic increment; concurrent failures all land.
        let query = r"
            UPDATE accounts
            SET failed_attempts = failed_attempts + 1
            WHERE id = $1
            RETURNING failed_attempts
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| map_sqlx(err, "failed to record login failure"))?
            .ok_or(StoreError::NotFound)?;

        let failed: i32 = row.get("failed_attempts");
        if u32::try_from(failed).unwrap_or(0) < policy.max_attempts() {
            return Ok(LockState::Open);
        }

        let until = now + policy.lock_duration();
        let query = "UPDATE accounts SET lock_until = $2 WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(id)
            .bind(until)
            .execute(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| map_sqlx(err, "failed to apply account lock"))?;
        Ok(LockState::Locked { until })
    }

    async fn record_login_success(&self, id: Uuid, now: DateTime<Utc>) -> Result<(), StoreError> {
        let query = r"
            UPDATE accounts
            SET failed_attempts = 0, lock_until = NULL, last_login = $2
            WHERE id = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(id)
            .bind(now)
            .execute(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| map_sqlx(err, "failed to record login success"))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn mark_verified(&self, id: Uuid) -> Result<(), StoreError> {
        // Single-column update; never races the failure counter.
        let query = "UPDATE accounts SET verified = TRUE WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| map_sqlx(err, "failed to mark account verified"))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn replace_credentials(
        &self,
        id: Uuid,
        password_hash: &str,
        session_secret: &str,
    ) -> Result<(), StoreError> {
        let query = r"
            UPDATE accounts
            SET password_hash = $2, session_secret = $3,
                failed_attempts = 0, lock_until = NULL
            WHERE id = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(id)
            .bind(password_hash)
            .bind(session_secret)
            .execute(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| map_sqlx(err, "failed to replace credentials"))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn rotate_session_secret(&self, id: Uuid, new_secret: &str) -> Result<(), StoreError> {
        let query = "UPDATE accounts SET session_secret = $2 WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(id)
            .bind(new_secret)
            .execute(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| map_sqlx(err, "failed to rotate session secret"))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct PgTokenStore {
    pool: PgPool,
}

impl PgTokenStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TokenStore for PgTokenStore {
    async fn create(&self, token: VerificationToken) -> Result<(), StoreError> {
        let query = r"
            INSERT INTO verification_tokens
                (id, account_id, kind, value_hash, expires_at, used, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(token.id)
            .bind(token.account_id)
            .bind(token.kind.as_str())
            .bind(hash_token_value(&token.value))
            .bind(token.expires_at)
            .bind(token.used)
            .bind(token.created_at)
            .execute(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| map_sqlx(err, "failed to insert verification token"))?;
        Ok(())
    }

    async fn find_by_value(&self, value: &str) -> Result<Option<VerificationToken>, StoreError> {
        let query = r"
            SELECT id, account_id, kind, expires_at, used, created_at
            FROM verification_tokens
            WHERE value_hash = $1
            LIMIT 1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(hash_token_value(value))
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| map_sqlx(err, "failed to lookup verification token"))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let kind: String = row.get("kind");
        let kind = match kind.as_str() {
            "email_verify" => TokenKind::EmailVerify,
            "password_reset" => TokenKind::PasswordReset,
            other => {
                return Err(StoreError::Other(anyhow!(
                    "unknown token kind in store: {other}"
                )))
            }
        };

        Ok(Some(VerificationToken {
            id: row.get("id"),
            account_id: row.get("account_id"),
            kind,
            value: value.to_string(),
            expires_at: row.get("expires_at"),
            used: row.get("used"),
            created_at: row.get("created_at"),
        }))
    }

    async fn mark_used_if_unused(&self, id: Uuid) -> Result<bool, StoreError> {
        // Single-statement check-then-mark; two concurrent redemptions
        // cannot both see used = FALSE.
        let query = r"
            UPDATE verification_tokens
            SET used = TRUE
            WHERE id = $1 AND used = FALSE
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| map_sqlx(err, "failed to mark token used"))?;
        Ok(result.rows_affected() == 1)
    }
}

#[derive(Clone, Debug)]
pub struct PgAuditSink {
    pool: PgPool,
}

impl PgAuditSink {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert(&self, event: &AuditEvent) -> anyhow::Result<()> {
        let query = r"
            INSERT INTO audit_events
                (account_id, client_addr, action, success, detail, at)
            VALUES ($1, $2, $3, $4, $5, $6)
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(event.account_id)
            .bind(event.client_addr.as_deref())
            .bind(event.action.as_str())
            .bind(event.success)
            .bind(&event.detail)
            .bind(event.at)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to insert audit event")?;
        Ok(())
    }
}

#[async_trait]
impl AuditSink for PgAuditSink {
    async fn record(&self, event: AuditEvent) {
        // Audit is append-only and best-effort; a sink failure must
        // never fail the operation being audited.
        if let Err(err) = self.insert(&event).await {
            warn!("Failed to record audit event: {err:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_value_hash_is_stable_and_distinct() {
        let first = hash_token_value("UA_token");
        let second = hash_token_value("UA_token");
        let other = hash_token_value("UA_other");
        assert_eq!(first, second);
        assert_eq!(first.len(), 32);
        assert_ne!(first, other);
    }

    #[test]
    fn unique_violation_detection() {
        assert!(!is_unique_violation(&sqlx::Error::RowNotFound));
    }
}
