use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use malvader_core::PrincipalId;

/// Where a principal stands in the login flow.
///
/// `Unauthenticated -> PasswordVerified -> OtpPending -> Authenticated`, with
/// `LockedOut` entered from `Unauthenticated` when the failure threshold is hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LoginState {
    Unauthenticated,
    PasswordVerified {
        principal_id: PrincipalId,
    },
    OtpPending {
        principal_id: PrincipalId,
        expires_at: DateTime<Utc>,
    },
    Authenticated {
        principal_id: PrincipalId,
        password_change_required: bool,
    },
    LockedOut {
        remaining_minutes: i64,
    },
}

impl LoginState {
    pub fn principal_id(&self) -> Option<PrincipalId> {
        match self {
            LoginState::PasswordVerified { principal_id }
            | LoginState::OtpPending { principal_id, .. }
            | LoginState::Authenticated { principal_id, .. } => Some(*principal_id),
            LoginState::Unauthenticated | LoginState::LockedOut { .. } => None,
        }
    }
}
