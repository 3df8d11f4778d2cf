//! Per-address sliding-window rate limiting.
//!
//! Two windows run in parallel: a one-minute window whose breach puts
//! the address in a timed block, and a one-hour window whose breach
//! refuses the request without blocking. Window state lives in process
//! memory; a restart forgets it, which is acceptable for a limiter
//! whose job is slowing bursts rather than metering quota.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

pub const DEFAULT_PER_MINUTE: usize = 60;
pub const DEFAULT_PER_HOUR: usize = 300;
pub const DEFAULT_BLOCK_SECONDS: u64 = 300;

const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(3_600);

#[derive(Clone, Debug)]
pub struct RateGovernorConfig {
    per_minute: usize,
    per_hour: usize,
    block: Duration,
    exempt_prefixes: Vec<String>,
    trust_forwarded_for: bool,
}

impl Default for RateGovernorConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl RateGovernorConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            per_minute: DEFAULT_PER_MINUTE,
            per_hour: DEFAULT_PER_HOUR,
            block: Duration::from_secs(DEFAULT_BLOCK_SECONDS),
            exempt_prefixes: vec!["/static".to_string()],
            trust_forwarded_for: true,
        }
    }

    #[must_use]
    pub fn with_per_minute(mut self, limit: usize) -> Self {
        self.per_minute = limit.max(1);
        self
    }

    #[must_use]
    pub fn with_per_hour(mut self, limit: usize) -> Self {
        self.per_hour = limit.max(1);
        self
    }

    #[must_use]
    pub fn with_block_seconds(mut self, seconds: u64) -> Self {
        self.block = Duration::from_secs(seconds.max(1));
        self
    }

    #[must_use]
    pub fn with_exempt_prefixes(mut self, prefixes: Vec<String>) -> Self {
        self.exempt_prefixes = prefixes;
        self
    }

    #[must_use]
    pub fn with_trust_forwarded_for(mut self, trust: bool) -> Self {
        self.trust_forwarded_for = trust;
        self
    }

    #[must_use]
    pub fn trust_forwarded_for(&self) -> bool {
        self.trust_forwarded_for
    }

    #[must_use]
    pub fn is_exempt(&self, path: &str) -> bool {
        self.exempt_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    /// Address is in a timed block after breaching the minute window.
    Blocked {
        retry_after: Duration,
    },
    /// Hourly ceiling reached; refused without starting a block.
    Limited,
}

#[derive(Debug, Default)]
struct AddressState {
    minute: VecDeque<Instant>,
    hour: VecDeque<Instant>,
    blocked_until: Option<Instant>,
}

pub struct RateGovernor {
    config: RateGovernorConfig,
    addresses: Mutex<HashMap<String, AddressState>>,
}

impl RateGovernor {
    #[must_use]
    pub fn new(config: RateGovernorConfig) -> Self {
        Self {
            config,
            addresses: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn config(&self) -> &RateGovernorConfig {
        &self.config
    }

    pub fn check(&self, addr: &str) -> RateDecision {
        self.check_at(addr, Instant::now())
    }

    /// Same as [`check`](Self::check) with an explicit clock reading.
    pub fn check_at(&self, addr: &str, now: Instant) -> RateDecision {
        let mut addresses = self
            .addresses
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let state = addresses.entry(addr.to_string()).or_default();

        if let Some(until) = state.blocked_until {
            if now < until {
                return RateDecision::Blocked {
                    retry_after: until - now,
                };
            }
            state.blocked_until = None;
        }

        while state.minute.front().is_some_and(|t| now - *t >= MINUTE) {
            state.minute.pop_front();
        }
        while state.hour.front().is_some_and(|t| now - *t >= HOUR) {
            state.hour.pop_front();
        }

        if state.minute.len() >= self.config.per_minute {
            state.blocked_until = Some(now + self.config.block);
            return RateDecision::Blocked {
                retry_after: self.config.block,
            };
        }
        if state.hour.len() >= self.config.per_hour {
            return RateDecision::Limited;
        }

        state.minute.push_back(now);
        state.hour.push_back(now);
        RateDecision::Allowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn governor(per_minute: usize, per_hour: usize) -> RateGovernor {
        RateGovernor::new(
            RateGovernorConfig::new()
                .with_per_minute(per_minute)
                .with_per_hour(per_hour)
                .with_block_seconds(300),
        )
    }

    #[test]
    fn allows_up_to_the_minute_ceiling() {
        let governor = governor(3, 100);
        let now = Instant::now();
        for _ in 0..3 {
            assert_eq!(governor.check_at("10.0.0.1", now), RateDecision::Allowed);
        }
        assert!(matches!(
            governor.check_at("10.0.0.1", now),
            RateDecision::Blocked { .. }
        ));
    }

    #[test]
    fn block_expires_after_its_duration() {
        let governor = governor(1, 100);
        let now = Instant::now();
        assert_eq!(governor.check_at("addr", now), RateDecision::Allowed);
        assert!(matches!(
            governor.check_at("addr", now),
            RateDecision::Blocked { .. }
        ));

        // Still blocked one second early, clear once the block and the
        // minute window have both passed.
        let almost = now + Duration::from_secs(299);
        assert!(matches!(
            governor.check_at("addr", almost),
            RateDecision::Blocked { .. }
        ));
        let after = now + Duration::from_secs(301);
        assert_eq!(governor.check_at("addr", after), RateDecision::Allowed);
    }

    #[test]
    fn hourly_ceiling_limits_without_blocking() {
        let governor = governor(100, 5);
        let start = Instant::now();
        // Spread requests out so the minute window never fills.
        for i in 0..5_u64 {
            let at = start + Duration::from_secs(i * 120);
            assert_eq!(governor.check_at("addr", at), RateDecision::Allowed);
        }
        let at = start + Duration::from_secs(5 * 120);
        assert_eq!(governor.check_at("addr", at), RateDecision::Limited);
        // A limited request is not a block; the next window admits.
        let later = start + Duration::from_secs(3_601);
        assert_eq!(governor.check_at("addr", later), RateDecision::Allowed);
    }

    #[test]
    fn addresses_are_tracked_independently() {
        let governor = governor(1, 100);
        let now = Instant::now();
        assert_eq!(governor.check_at("a", now), RateDecision::Allowed);
        assert!(matches!(
            governor.check_at("a", now),
            RateDecision::Blocked { .. }
        ));
        assert_eq!(governor.check_at("b", now), RateDecision::Allowed);
    }

    #[test]
    fn exempt_prefixes_match_path_starts() {
        let config = RateGovernorConfig::new();
        assert!(config.is_exempt("/static/app.css"));
        assert!(!config.is_exempt("/api/v1/login"));
    }
}
