//! Six-digit one-time codes used for login step-up and account closure.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use crate::policy::AuthPolicy;
use crate::principal::Principal;

const CODE_MIN: u32 = 100_000;
const CODE_MAX: u32 = 999_999;

pub fn generate_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    rng.gen_range(CODE_MIN..=CODE_MAX).to_string()
}

/// A code that was dispatched and not yet consumed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveOtp {
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

impl ActiveOtp {
    pub fn new(code: String, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            code,
            expires_at: now + ttl,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Code matches and has not expired.
    pub fn accepts(&self, submitted: &str, now: DateTime<Utc>) -> bool {
        if self.is_expired(now) {
            return false;
        }
        // Slices of different length compare unequal.
        self.code.as_bytes().ct_eq(submitted.trim().as_bytes()).into()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpVerdict {
    Accepted,
    /// Wrong or expired code; the principal stays pending.
    Rejected { attempts: u32 },
    /// Too many wrong codes, or no code outstanding; login must restart.
    Exhausted,
}

/// Check a submitted login code against the principal's active code,
/// updating the principal's OTP state in place.
pub fn verify_login_code(
    principal: &mut Principal,
    submitted: &str,
    now: DateTime<Utc>,
    policy: &AuthPolicy,
) -> OtpVerdict {
    let Some(active) = principal.otp.as_ref() else {
        return OtpVerdict::Exhausted;
    };

    if active.accepts(submitted, now) {
        principal.clear_otp();
        return OtpVerdict::Accepted;
    }

    principal.otp_attempts += 1;
    if principal.otp_attempts >= policy.max_otp_attempts {
        principal.clear_otp();
        return OtpVerdict::Exhausted;
    }
    OtpVerdict::Rejected {
        attempts: principal.otp_attempts,
    }
}
