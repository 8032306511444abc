//! Customer and employee extensions of a principal.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use malvader_accounts::EmployeeCode;
use malvader_core::{BranchId, CustomerId, EmployeeId, Entity, PrincipalId};

use crate::EmployeeRank;

/// Score assigned to every newly registered customer.
pub const DEFAULT_CREDIT_SCORE: Decimal = Decimal::from_parts(50_000, 0, 0, false, 2);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub principal_id: PrincipalId,
    pub credit_score: Decimal,
}

impl Customer {
    pub fn new(principal_id: PrincipalId) -> Self {
        Self {
            id: CustomerId::new(),
            principal_id,
            credit_score: DEFAULT_CREDIT_SCORE,
        }
    }
}

impl Entity for Customer {
    type Id = CustomerId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employee {
    pub id: EmployeeId,
    pub principal_id: PrincipalId,
    /// Position in the employee sequence; the code is derived from it.
    pub sequence: u32,
    pub code: EmployeeCode,
    pub rank: EmployeeRank,
    pub supervisor_id: Option<EmployeeId>,
    pub branch_id: Option<BranchId>,
    pub hired_at: DateTime<Utc>,
}

impl Employee {
    pub fn new(
        principal_id: PrincipalId,
        current_max_sequence: u32,
        rank: EmployeeRank,
        supervisor_id: Option<EmployeeId>,
        branch_id: Option<BranchId>,
        hired_at: DateTime<Utc>,
    ) -> Self {
        let (sequence, code) = EmployeeCode::next_after(current_max_sequence);
        Self {
            id: EmployeeId::new(),
            principal_id,
            sequence,
            code,
            rank,
            supervisor_id,
            branch_id,
            hired_at,
        }
    }
}

impl Entity for Employee {
    type Id = EmployeeId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
