//! Step-up operations awaiting a one-time code.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use malvader_core::{AccountId, DomainError, EmployeeId};

use crate::otp::ActiveOtp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingKind {
    AccountClosure,
}

impl PendingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PendingKind::AccountClosure => "account_closure",
        }
    }

    pub fn parse(s: &str) -> Result<Self, DomainError> {
        match s {
            "account_closure" => Ok(PendingKind::AccountClosure),
            other => Err(DomainError::validation(format!("unknown pending operation '{other}'"))),
        }
    }
}

/// A sensitive operation requested by an employee, confirmed later by token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingOperation {
    pub token: Uuid,
    pub kind: PendingKind,
    pub account_id: AccountId,
    pub employee_id: EmployeeId,
    pub reason: String,
    pub otp: ActiveOtp,
    pub created_at: DateTime<Utc>,
}

impl PendingOperation {
    pub fn account_closure(
        account_id: AccountId,
        employee_id: EmployeeId,
        reason: impl Into<String>,
        otp: ActiveOtp,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            token: Uuid::new_v4(),
            kind: PendingKind::AccountClosure,
            account_id,
            employee_id,
            reason: reason.into(),
            otp,
            created_at,
        }
    }

    pub fn belongs_to(&self, employee_id: EmployeeId) -> bool {
        self.employee_id == employee_id
    }
}
