//! Per-account lockout state machine.
//!
//! Lock expiry is evaluated lazily on read instead of by a background
//! timer: every login attempt passes through [`LockoutPolicy::check`],
//! which is the only place the `Locked -> Open` transition happens.

use chrono::{DateTime, Duration, Utc};

use crate::store::Account;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_LOCK_MINUTES: i64 = 15;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockState {
    Open,
    Locked { until: DateTime<Utc> },
}

impl LockState {
    #[must_use]
    pub fn is_locked(&self) -> bool {
        matches!(self, Self::Locked { .. })
    }
}

/// Pure transition logic over an [`Account`]; persistence of the mutated
/// fields (and atomicity of the failure counter) is the store's job.
#[derive(Clone, Copy, Debug)]
pub struct LockoutPolicy {
    max_attempts: u32,
    lock_duration: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl LockoutPolicy {
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            lock_duration: Duration::minutes(DEFAULT_LOCK_MINUTES),
        }
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    #[must_use]
    pub fn with_lock_duration_seconds(mut self, seconds: i64) -> Self {
        self.lock_duration = Duration::seconds(seconds);
        self
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    #[must_use]
    pub fn lock_duration(&self) -> Duration {
        self.lock_duration
    }

    /// Report the current lock state, performing the lazy unlock
    /// transition on the account when the lock has expired.
    ///
    /// The caller must persist the account if the state changed.
    pub fn check(&self, account: &mut Account, now: DateTime<Utc>) -> LockState {
        match account.lock_until {
            Some(until) if now >= until => {
                account.lock_until = None;
                account.failed_attempts = 0;
                LockState::Open
            }
            Some(until) => LockState::Locked { until },
            None => LockState::Open,
        }
    }

    /// Record a failed attempt; reaching `max_attempts` sets the lock.
    pub fn register_failure(&self, account: &mut Account, now: DateTime<Utc>) -> LockState {
        account.failed_attempts = account.failed_attempts.saturating_add(1);
        if account.failed_attempts >= self.max_attempts {
            let until = now + self.lock_duration;
            account.lock_until = Some(until);
            LockState::Locked { until }
        } else {
            LockState::Open
        }
    }

    /// Successful login clears the counter and lock and stamps last-login.
    pub fn register_success(&self, account: &mut Account, now: DateTime<Utc>) {
        account.failed_attempts = 0;
        account.lock_until = None;
        account.last_login = Some(now);
    }
}
