use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use malvader_core::{AccountId, DomainError, EmployeeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryEvent {
    Opening,
    Closure,
}

impl HistoryEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryEvent::Opening => "opening",
            HistoryEvent::Closure => "closure",
        }
    }

    pub fn parse(s: &str) -> Result<Self, DomainError> {
        match s {
            "opening" => Ok(HistoryEvent::Opening),
            "closure" => Ok(HistoryEvent::Closure),
            other => Err(DomainError::validation(format!("unknown history event '{other}'"))),
        }
    }
}

/// Append-only lifecycle record for an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountHistoryEntry {
    pub id: Uuid,
    pub account_id: AccountId,
    pub event: HistoryEvent,
    /// `None` when the account was opened through self-service.
    pub employee_id: Option<EmployeeId>,
    pub reason: String,
    pub recorded_at: DateTime<Utc>,
}

impl AccountHistoryEntry {
    pub fn new(
        account_id: AccountId,
        event: HistoryEvent,
        employee_id: Option<EmployeeId>,
        reason: impl Into<String>,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            account_id,
            event,
            employee_id,
            reason: reason.into(),
            recorded_at,
        }
    }
}
