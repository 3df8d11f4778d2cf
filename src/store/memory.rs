//! In-memory store implementations for tests and local development.
//!
//! All mutations happen under a single mutex per store, which gives the
//! same atomicity the Postgres implementations get from the database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use uuid::Uuid;

use crate::auth::lockout::{LockState, LockoutPolicy};

use super::{
    Account, AccountStore, AuditEvent, AuditSink, StoreError, TokenStore, VerificationToken,
};

#[derive(Debug, Default)]
pub struct MemoryAccountStore {
    accounts: Mutex<HashMap<Uuid, Account>>,
}

impl MemoryAccountStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, Account>> {
        self.accounts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>, StoreError> {
        Ok(self.lock().get(&id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<Account>, StoreError> {
        Ok(self
            .lock()
            .values()
            .find(|a| a.username == username)
            .cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        Ok(self.lock().values().find(|a| a.email == email).cloned())
    }

    async fn find_by_session_secret(&self, secret: &str) -> Result<Option<Account>, StoreError> {
        Ok(self
            .lock()
            .values()
            .find(|a| a.session_secret == secret)
            .cloned())
    }

    async fn create(&self, account: Account) -> Result<Account, StoreError> {
        let mut accounts = self.lock();
        let collision = accounts.values().any(|a| {
            a.username == account.username
                || a.email == account.email
                || a.session_secret == account.session_secret
        });
        if collision {
            return Err(StoreError::Duplicate);
        }
        accounts.insert(account.id, account.clone());
        Ok(account)
    }

    async fn update(&self, account: &Account) -> Result<(), StoreError> {
        let mut accounts = self.lock();
        if !accounts.contains_key(&account.id) {
            return Err(StoreError::NotFound);
        }
        accounts.insert(account.id, account.clone());
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        self.lock().remove(&id).map(|_| ()).ok_or(StoreError::NotFound)
    }

    async fn record_login_failure(
        &self,
        id: Uuid,
        policy: &LockoutPolicy,
        now: DateTime<Utc>,
    ) -> Result<LockState, StoreError> {
        let mut accounts = self.lock();
        let account = accounts.get_mut(&id).ok_or(StoreError::NotFound)?;
        Ok(policy.register_failure(account, now))
    }

    async fn record_login_success(&self, id: Uuid, now: DateTime<Utc>) -> Result<(), StoreError> {
        let mut accounts = self.lock();
        let account = accounts.get_mut(&id).ok_or(StoreError::NotFound)?;
        account.failed_attempts = 0;
        account.lock_until = None;
        account.last_login = Some(now);
        Ok(())
    }

    async fn rotate_session_secret(&self, id: Uuid, new_secret: &str) -> Result<(), StoreError> {
        let mut accounts = self.lock();
        let account = accounts.get_mut(&id).ok_or(StoreError::NotFound)?;
        account.session_secret = new_secret.to_string();
        Ok(())
    }

    async fn mark_verified(&self, id: Uuid) -> Result<(), StoreError> {
        let mut accounts = self.lock();
        let account = accounts.get_mut(&id).ok_or(StoreError::NotFound)?;
        account.verified = true;
        Ok(())
    }

    async fn replace_credentials(
        &self,
        id: Uuid,
        password_hash: &str,
        session_secret: &str,
    ) -> Result<(), StoreError> {
        let mut accounts = self.lock();
        let account = accounts.get_mut(&id).ok_or(StoreError::NotFound)?;
        account.password_hash = password_hash.to_string();
        account.session_secret = session_secret.to_string();
        account.failed_attempts = 0;
        account.lock_until = None;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    tokens: Mutex<HashMap<Uuid, VerificationToken>>,
}

impl MemoryTokenStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, VerificationToken>> {
        self.tokens.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn create(&self, token: VerificationToken) -> Result<(), StoreError> {
        let mut tokens = self.lock();
        if tokens.values().any(|t| t.value == token.value) {
            return Err(StoreError::Duplicate);
        }
        tokens.insert(token.id, token);
        Ok(())
    }

    async fn find_by_value(&self, value: &str) -> Result<Option<VerificationToken>, StoreError> {
        Ok(self.lock().values().find(|t| t.value == value).cloned())
    }

    async fn mark_used_if_unused(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut tokens = self.lock();
        let Some(token) = tokens.get_mut(&id) else {
            return Ok(false);
        };
        if token.used {
            return Ok(false);
        }
        token.used = true;
        Ok(true)
    }
}

/// Keeps recorded events in memory; tests assert against them.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, event: AuditEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{AuditAction, TokenKind};
    use chrono::Duration;

    fn account(username: &str, email: &str) -> Account {
        Account::new(
            "Test User".to_string(),
            username.to_string(),
            email.to_string(),
            "hash".to_string(),
        )
    }

    #[tokio::test]
    async fn create_enforces_uniqueness() {
        let store = MemoryAccountStore::new();
        store
            .create(account("alice", "alice@example.com"))
            .await
            .unwrap();

        let dup_username = store.create(account("alice", "other@example.com")).await;
        assert!(matches!(dup_username, Err(StoreError::Duplicate)));

        let dup_email = store.create(account("bob", "alice@example.com")).await;
        assert!(matches!(dup_email, Err(StoreError::Duplicate)));
    }

    #[tokio::test]
    async fn login_failure_counts_and_locks() {
        let store = MemoryAccountStore::new();
        let acct = store
            .create(account("carol", "carol@example.com"))
            .await
            .unwrap();
        let policy = LockoutPolicy::new().with_max_attempts(2);
        let now = Utc::now();

        let first = store
            .record_login_failure(acct.id, &policy, now)
            .await
            .unwrap();
        assert_eq!(first, LockState::Open);

        let second = store
            .record_login_failure(acct.id, &policy, now)
            .await
            .unwrap();
        assert!(second.is_locked());

        let reloaded = store.find_by_id(acct.id).await.unwrap().unwrap();
        assert_eq!(reloaded.failed_attempts, 2);
        assert!(reloaded.lock_until.is_some());
    }

    #[tokio::test]
    async fn mark_verified_leaves_failure_counter_alone() {
        let store = MemoryAccountStore::new();
        let acct = store
            .create(account("dave", "dave@example.com"))
            .await
            .unwrap();
        let policy = LockoutPolicy::new();
        let now = Utc::now();

        // Counter bumped between token redemption and the flag flip.
        store
            .record_login_failure(acct.id, &policy, now)
            .await
            .unwrap();
        store.mark_verified(acct.id).await.unwrap();

        let reloaded = store.find_by_id(acct.id).await.unwrap().unwrap();
        assert!(reloaded.verified);
        assert_eq!(reloaded.failed_attempts, 1);
    }

    #[tokio::test]
    async fn replace_credentials_swaps_hash_and_secret_and_clears_lock() {
        let store = MemoryAccountStore::new();
        let acct = store
            .create(account("erin", "erin@example.com"))
            .await
            .unwrap();
        let policy = LockoutPolicy::new().with_max_attempts(1);
        store
            .record_login_failure(acct.id, &policy, Utc::now())
            .await
            .unwrap();

        store
            .replace_credentials(acct.id, "new-hash", "new-secret")
            .await
            .unwrap();

        let reloaded = store.find_by_id(acct.id).await.unwrap().unwrap();
        assert_eq!(reloaded.password_hash, "new-hash");
        assert_eq!(reloaded.session_secret, "new-secret");
        assert_eq!(reloaded.failed_attempts, 0);
        assert!(reloaded.lock_until.is_none());
        assert!(store
            .find_by_session_secret(&acct.session_secret)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn rotate_session_secret_invalidates_lookup() {
        let store = MemoryAccountStore::new();
        let acct = store
            .create(account("dave", "dave@example.com"))
            .await
            .unwrap();
        let old_secret = acct.session_secret.clone();

        store
            .rotate_session_secret(acct.id, "UA_newsecret")
            .await
            .unwrap();

        assert!(store
            .find_by_session_secret(&old_secret)
            .await
            .unwrap()
            .is_none());
        assert!(store
            .find_by_session_secret("UA_newsecret")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn mark_used_succeeds_exactly_once() {
        let store = MemoryTokenStore::new();
        let token = VerificationToken {
            id: Uuid::new_v4(),
            account_id: Uuid::new_v4(),
            kind: TokenKind::EmailVerify,
            value: "UA_token".to_string(),
            expires_at: Utc::now() + Duration::hours(24),
            used: false,
            created_at: Utc::now(),
        };
        store.create(token.clone()).await.unwrap();

        assert!(store.mark_used_if_unused(token.id).await.unwrap());
        assert!(!store.mark_used_if_unused(token.id).await.unwrap());
    }

    #[tokio::test]
    async fn audit_sink_accumulates() {
        let sink = MemoryAuditSink::new();
        sink.record(AuditEvent::new(AuditAction::Logout, true, "bye"))
            .await;
        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, AuditAction::Logout);
    }
}
