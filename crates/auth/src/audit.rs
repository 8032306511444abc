use core::fmt;
use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use malvader_core::{DomainError, PrincipalId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    LoginSuccess,
    LoginFailure,
    OtpFailure,
    AccountOpened,
    AccountClosed,
    EmployeeRegistered,
    CustomerRegistered,
    PasswordChanged,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::LoginSuccess => "login_success",
            AuditAction::LoginFailure => "login_failure",
            AuditAction::OtpFailure => "otp_failure",
            AuditAction::AccountOpened => "account_opened",
            AuditAction::AccountClosed => "account_closed",
            AuditAction::EmployeeRegistered => "employee_registered",
            AuditAction::CustomerRegistered => "customer_registered",
            AuditAction::PasswordChanged => "password_changed",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditAction {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "login_success" => AuditAction::LoginSuccess,
            "login_failure" => AuditAction::LoginFailure,
            "otp_failure" => AuditAction::OtpFailure,
            "account_opened" => AuditAction::AccountOpened,
            "account_closed" => AuditAction::AccountClosed,
            "employee_registered" => AuditAction::EmployeeRegistered,
            "customer_registered" => AuditAction::CustomerRegistered,
            "password_changed" => AuditAction::PasswordChanged,
            other => {
                return Err(DomainError::validation(format!("unknown audit action '{other}'")));
            }
        })
    }
}

/// Append-only audit record. Also the backing log of the lockout guard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub principal_id: PrincipalId,
    pub action: AuditAction,
    pub occurred_at: DateTime<Utc>,
    pub detail: String,
}

impl AuditEntry {
    pub fn new(
        principal_id: PrincipalId,
        action: AuditAction,
        occurred_at: DateTime<Utc>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            principal_id,
            action,
            occurred_at,
            detail: detail.into(),
        }
    }
}
