//! Application services.
//!
//! `BankService` owns the store handle and the injected collaborators (clock,
//! notifier, exporter) and exposes one async method per operation. Each
//! method follows the same shape:
//!
//! ```text
//! begin unit of work
//!   ↓
//! load snapshots and window aggregates
//!   ↓
//! pure decision (malvader-accounts / malvader-auth)
//!   ↓
//! stage writes
//!   ↓
//! commit on success, rollback on any error
//! ```
//!
//! The only exception is OTP dispatch: codes are sent after the credential
//! check has committed and before the code itself is stored, so a delivery
//! failure never leaves an undeliverable code behind.

pub mod auth;
pub mod ledger;
pub mod lifecycle;
pub mod statements;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, warn};

use malvader_accounts::{PolicyLimits, StatementExporter};
use malvader_auth::AuthPolicy;
use malvader_core::{Clock, DomainError};

use crate::notify::OtpNotifier;
use crate::store::{BankStore, UnitOfWork};

pub use auth::{LoginChallenge, Session};
pub use ledger::Receipt;
pub use lifecycle::{
    AccountHolder, ClosureChallenge, OpenAccountRequest, OpenedAccount, RegisterEmployeeRequest,
    RegisteredEmployee, StaffMember,
};
pub use statements::{Dashboard, StatementDocument};

pub struct BankService<S> {
    store: S,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn OtpNotifier>,
    exporter: Arc<dyn StatementExporter>,
    limits: PolicyLimits,
    auth_policy: AuthPolicy,
}

impl<S: BankStore> BankService<S> {
    pub fn new(
        store: S,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn OtpNotifier>,
        exporter: Arc<dyn StatementExporter>,
    ) -> Self {
        Self {
            store,
            clock,
            notifier,
            exporter,
            limits: PolicyLimits::default(),
            auth_policy: AuthPolicy::default(),
        }
    }

    pub fn with_limits(mut self, limits: PolicyLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_auth_policy(mut self, auth_policy: AuthPolicy) -> Self {
        self.auth_policy = auth_policy;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn limits(&self) -> &PolicyLimits {
        &self.limits
    }

    pub fn auth_policy(&self) -> &AuthPolicy {
        &self.auth_policy
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    async fn begin(&self) -> Result<S::Tx, DomainError> {
        self.store.begin().await.map_err(|e| {
            error!(error = %e, "could not open unit of work");
            DomainError::from(e)
        })
    }
}

/// Commit when `result` is `Ok`, roll back otherwise.
async fn finish<T, U: UnitOfWork>(
    tx: U,
    operation: &'static str,
    result: Result<T, DomainError>,
) -> Result<T, DomainError> {
    match result {
        Ok(value) => {
            tx.commit().await.map_err(|e| {
                error!(operation, error = %e, "commit failed");
                DomainError::from(e)
            })?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback) = tx.rollback().await {
                error!(operation, error = %rollback, "rollback failed");
            }
            if let DomainError::Consistency(detail) = &err {
                error!(operation, detail = %detail, "operation rolled back");
            } else {
                warn!(operation, kind = err.kind().as_str(), error = %err, "operation rejected");
            }
            Err(err)
        }
    }
}
