//! Account Lockout Service
//!
//! Tracks failed credential attempts per identity (a phone number in the
//! school backend) independently of request-volume limiting.
//!
//! ```text
//!            failure                 failure (count >= max)
//!   Clear ───────────► Warned ─────────────────────────► Locked
//!     ▲                  │                                 │
//!     └──── success ─────┘◄──── success or lock expiry ────┘
//! ```
//!
//! A lock, once set, is cleared only by a recorded success or by expiry.

use std::time::Duration;

use dashmap::DashMap;
use rollcall_core::clock::{add_duration, remaining};
use rollcall_core::{GovernanceError, GovernanceResult, SharedClock, Timestamp};
use serde::Serialize;

use crate::constants::{
    DEFAULT_LOCKOUT_DURATION_MINUTES, DEFAULT_LOCKOUT_SWEEP_INTERVAL_SECS,
    DEFAULT_MAX_LOGIN_ATTEMPTS,
};
use crate::jobs::Sweepable;
use crate::telemetry::metrics;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockoutConfig {
    /// Failures that trigger a lock.
    pub max_attempts: u32,
    pub lockout_duration: Duration,
    pub sweep_interval: Duration,
}

impl Default for LockoutConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_LOGIN_ATTEMPTS,
            lockout_duration: Duration::from_secs(DEFAULT_LOCKOUT_DURATION_MINUTES * 60),
            sweep_interval: Duration::from_secs(DEFAULT_LOCKOUT_SWEEP_INTERVAL_SECS),
        }
    }
}

/// Failure history for one identity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LockoutRecord {
    pub fail_count: u32,
    pub locked_until: Option<Timestamp>,
}

impl LockoutRecord {
    fn lock_active(&self, now: Timestamp) -> bool {
        self.locked_until.is_some_and(|until| until > now)
    }

    fn lock_lapsed(&self, now: Timestamp) -> bool {
        self.locked_until.is_some_and(|until| until <= now)
    }
}

/// Diagnostic view of an identity's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum LockoutState {
    Clear,
    Warned { fail_count: u32 },
    Locked { until: Timestamp },
}

/// Result of [`LockoutTracker::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutStatus {
    pub allowed: bool,
    /// Whole minutes left on the lock, rounded up; zero when allowed.
    pub remaining_minutes: u64,
}

impl LockoutStatus {
    const ALLOWED: LockoutStatus = LockoutStatus {
        allowed: true,
        remaining_minutes: 0,
    };
}

pub struct LockoutTracker {
    config: LockoutConfig,
    clock: SharedClock,
    records: DashMap<String, LockoutRecord>,
}

impl LockoutTracker {
    pub fn new(config: LockoutConfig, clock: SharedClock) -> Self {
        Self {
            config,
            clock,
            records: DashMap::new(),
        }
    }

    pub fn config(&self) -> &LockoutConfig {
        &self.config
    }

    /// Whether `identity` may attempt to authenticate now.
    ///
    /// A record whose lock has lapsed is dropped on the way.
    pub fn check(&self, identity: &str) -> LockoutStatus {
        let now = self.clock.now();

        // Copy out so the shard lock is released before any removal.
        let record = self.records.get(identity).map(|r| *r);

        match record {
            Some(record) if record.lock_active(now) => {
                let until = record.locked_until.unwrap_or(now);
                LockoutStatus {
                    allowed: false,
                    remaining_minutes: ceil_minutes(remaining(now, until)),
                }
            }
            Some(record) if record.lock_lapsed(now) => {
                self.records.remove_if(identity, |_, r| r.lock_lapsed(now));
                LockoutStatus::ALLOWED
            }
            _ => LockoutStatus::ALLOWED,
        }
    }

    /// [`check`](Self::check) as a `Result`.
    pub fn guard(&self, identity: &str) -> GovernanceResult<()> {
        let status = self.check(identity);
        if status.allowed {
            Ok(())
        } else {
            Err(GovernanceError::AccountLocked {
                remaining_minutes: status.remaining_minutes,
            })
        }
    }

    /// Record the outcome of a credential check.
    ///
    /// Success forgets the identity. Failure increments the count and locks
    /// the identity once the count reaches `max_attempts`; further failures
    /// while locked extend the lock.
    pub fn record(&self, identity: &str, success: bool) -> LockoutState {
        if success {
            if self.records.remove(identity).is_some() {
                tracing::debug!(identity, "Credential success cleared lockout record");
            }
            return LockoutState::Clear;
        }

        let now = self.clock.now();
        let (state, newly_locked) = {
            let mut record = self.records.entry(identity.to_string()).or_default();
            if record.lock_lapsed(now) {
                *record = LockoutRecord::default();
            }

            let was_locked = record.lock_active(now);
            record.fail_count = record.fail_count.saturating_add(1);

            if record.fail_count >= self.config.max_attempts {
                let until = add_duration(now, self.config.lockout_duration);
                record.locked_until = Some(until);
                (LockoutState::Locked { until }, !was_locked)
            } else {
                (
                    LockoutState::Warned {
                        fail_count: record.fail_count,
                    },
                    false,
                )
            }
        };

        if newly_locked {
            tracing::warn!(
                identity,
                max_attempts = self.config.max_attempts,
                lockout_secs = self.config.lockout_duration.as_secs(),
                "Account locked after repeated failures"
            );
            if let Some(m) = metrics() {
                m.record_lockout();
            }
        }

        state
    }

    pub fn state(&self, identity: &str) -> LockoutState {
        let now = self.clock.now();
        match self.records.get(identity).map(|r| *r) {
            Some(LockoutRecord {
                locked_until: Some(until),
                ..
            }) if until > now => LockoutState::Locked { until },
            Some(record) if record.locked_until.is_none() && record.fail_count > 0 => {
                LockoutState::Warned {
                    fail_count: record.fail_count,
                }
            }
            _ => LockoutState::Clear,
        }
    }

    /// Number of identities with a record.
    pub fn tracked_identities(&self) -> usize {
        self.records.len()
    }

    /// Remove records whose lock has lapsed.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let mut removed = 0;
        self.records.retain(|_, record| {
            let keep = !record.lock_lapsed(now);
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }
}

impl Sweepable for LockoutTracker {
    fn component(&self) -> &str {
        "lockout"
    }

    fn sweep_expired(&self) -> usize {
        LockoutTracker::sweep_expired(self)
    }
}

fn ceil_minutes(duration: Duration) -> u64 {
    let millis = duration.as_millis();
    u64::try_from(millis.div_ceil(60_000)).unwrap_or(u64::MAX)
}
