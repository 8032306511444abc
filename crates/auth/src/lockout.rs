//! Login lockout guard.
//!
//! Failures are counted from the audit log: only `LoginFailure` entries newer
//! than the most recent `LoginSuccess` count, newest first, capped at the
//! threshold. A success therefore resets the window.

use chrono::{DateTime, Utc};

use malvader_core::DomainError;

use crate::policy::AuthPolicy;

/// Recent failed logins for one principal, newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FailureWindow {
    failures: Vec<DateTime<Utc>>,
}

impl FailureWindow {
    /// `failures` must be newest first; extra entries past the threshold are ignored.
    pub fn new(mut failures: Vec<DateTime<Utc>>, policy: &AuthPolicy) -> Self {
        failures.truncate(policy.max_failed_logins as usize);
        Self { failures }
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    /// Fails with `AccountLocked` while the threshold is reached and the
    /// newest failure is less than the lockout duration old.
    pub fn check(&self, now: DateTime<Utc>, policy: &AuthPolicy) -> Result<(), DomainError> {
        if self.failures.len() < policy.max_failed_logins as usize {
            return Ok(());
        }
        let Some(newest) = self.failures.first() else {
            return Ok(());
        };
        let unlock_at = *newest + policy.lockout();
        if now < unlock_at {
            let remaining = (unlock_at - now).num_seconds();
            return Err(DomainError::AccountLocked {
                remaining_minutes: remaining / 60 + 1,
            });
        }
        Ok(())
    }

    /// Attempt number carried by the failure about to be recorded.
    pub fn next_attempt(&self) -> u32 {
        self.failures.len() as u32 + 1
    }

    /// Whether the failure about to be recorded reaches the threshold.
    pub fn next_is_final(&self, policy: &AuthPolicy) -> bool {
        self.next_attempt() >= policy.max_failed_logins
    }
}
