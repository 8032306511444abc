use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Authentication thresholds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthPolicy {
    /// Failed logins (since the last success) that trigger a lockout.
    pub max_failed_logins: u32,
    pub lockout_minutes: i64,
    pub login_otp_ttl_minutes: i64,
    pub closure_otp_ttl_minutes: i64,
    /// Wrong codes accepted before the active code is discarded.
    pub max_otp_attempts: u32,
    pub min_password_len: usize,
    pub provisional_password_len: usize,
    pub session_ttl_minutes: i64,
}

impl Default for AuthPolicy {
    fn default() -> Self {
        Self {
            max_failed_logins: 3,
            lockout_minutes: 10,
            login_otp_ttl_minutes: 10,
            closure_otp_ttl_minutes: 5,
            max_otp_attempts: 5,
            min_password_len: 8,
            provisional_password_len: 12,
            session_ttl_minutes: 60,
        }
    }
}

impl AuthPolicy {
    pub fn lockout(&self) -> Duration {
        Duration::minutes(self.lockout_minutes)
    }

    pub fn login_otp_ttl(&self) -> Duration {
        Duration::minutes(self.login_otp_ttl_minutes)
    }

    pub fn closure_otp_ttl(&self) -> Duration {
        Duration::minutes(self.closure_otp_ttl_minutes)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::minutes(self.session_ttl_minutes)
    }
}
