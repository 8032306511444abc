use serde::Serialize;
use thiserror::Error;

use malvader_core::{CustomerId, DomainError, EmployeeId, PrincipalId};

use crate::{EmployeeRank, Permission, Role};

/// A fully resolved actor for authorization decisions.
///
/// Built from verified session claims; carries no storage handles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Actor {
    pub principal_id: PrincipalId,
    pub role: Role,
    pub customer_id: Option<CustomerId>,
    pub employee_id: Option<EmployeeId>,
    pub rank: Option<EmployeeRank>,
}

impl Actor {
    pub fn customer(principal_id: PrincipalId, customer_id: CustomerId) -> Self {
        Self {
            principal_id,
            role: Role::Customer,
            customer_id: Some(customer_id),
            employee_id: None,
            rank: None,
        }
    }

    pub fn employee(principal_id: PrincipalId, employee_id: EmployeeId, rank: EmployeeRank) -> Self {
        Self {
            principal_id,
            role: Role::Employee,
            customer_id: None,
            employee_id: Some(employee_id),
            rank: Some(rank),
        }
    }

    pub fn has(&self, permission: Permission) -> bool {
        match (self.role, self.rank) {
            (Role::Customer, _) => permission == Permission::OperateOwnAccounts,
            (Role::Employee, Some(rank)) => rank.permissions().contains(&permission),
            (Role::Employee, None) => false,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("missing permission '{0}'")]
    Forbidden(Permission),

    #[error("account belongs to another customer")]
    NotOwner,
}

impl From<AuthzError> for DomainError {
    fn from(value: AuthzError) -> Self {
        DomainError::permission_denied(value.to_string())
    }
}

/// Pure policy check; no IO.
pub fn authorize(actor: &Actor, required: Permission) -> Result<(), AuthzError> {
    if actor.has(required) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required))
    }
}

/// Customers may only move money on accounts they own.
pub fn ensure_owner(actor: &Actor, owner: CustomerId) -> Result<(), AuthzError> {
    authorize(actor, Permission::OperateOwnAccounts)?;
    if actor.customer_id != Some(owner) {
        return Err(AuthzError::NotOwner);
    }
    Ok(())
}
