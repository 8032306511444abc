//! Transactional storage boundary.
//!
//! `BankStore::begin` opens a unit of work. Every read and write of one
//! ledger or lifecycle operation goes through that unit of work, which either
//! commits as a whole or is rolled back. Dropping an uncommitted unit of work
//! discards its writes.

pub mod in_memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use malvader_accounts::{
    Account, AccountHistoryEntry, AccountNumber, Branch, RequestKey, TransactionRecord,
};
use malvader_auth::{AuditEntry, Customer, Employee, NationalId, PendingOperation, Principal};
use malvader_core::{AccountId, CustomerId, DomainError, EmployeeId, Money, PrincipalId};

pub use in_memory::InMemoryBankStore;
pub use postgres::PostgresBankStore;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write.
    #[error("conflict in {operation}: {message}")]
    Conflict { operation: &'static str, message: String },

    /// A stored row could not be mapped back into a domain value.
    #[error("corrupt row in {operation}: {message}")]
    Corrupt { operation: &'static str, message: String },

    #[error("storage failure in {operation}: {message}")]
    Backend { operation: &'static str, message: String },
}

impl From<StoreError> for DomainError {
    fn from(value: StoreError) -> Self {
        DomainError::consistency(value.to_string())
    }
}

/// Optional filters for a transaction listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransactionQuery {
    /// Inclusive.
    pub from: Option<DateTime<Utc>>,
    /// Exclusive.
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

#[async_trait]
pub trait BankStore: Send + Sync + 'static {
    type Tx: UnitOfWork;

    async fn begin(&self) -> Result<Self::Tx, StoreError>;
}

/// Reads and writes scoped to one atomic operation.
///
/// `lock_*` methods take a row lock held until commit or rollback.
#[async_trait]
pub trait UnitOfWork: Send {
    // principals
    async fn principal(&mut self, id: PrincipalId) -> Result<Option<Principal>, StoreError>;
    async fn principal_by_national_id(
        &mut self,
        national_id: &NationalId,
    ) -> Result<Option<Principal>, StoreError>;
    async fn email_taken(&mut self, email: &str) -> Result<bool, StoreError>;
    async fn insert_principal(&mut self, principal: &Principal) -> Result<(), StoreError>;
    async fn update_principal(&mut self, principal: &Principal) -> Result<(), StoreError>;

    // customers and employees
    async fn customer(&mut self, id: CustomerId) -> Result<Option<Customer>, StoreError>;
    async fn customer_by_principal(
        &mut self,
        principal_id: PrincipalId,
    ) -> Result<Option<Customer>, StoreError>;
    async fn insert_customer(&mut self, customer: &Customer) -> Result<(), StoreError>;
    async fn employee(&mut self, id: EmployeeId) -> Result<Option<Employee>, StoreError>;
    async fn employee_by_principal(
        &mut self,
        principal_id: PrincipalId,
    ) -> Result<Option<Employee>, StoreError>;
    async fn max_employee_sequence(&mut self) -> Result<u32, StoreError>;
    async fn insert_employee(&mut self, employee: &Employee) -> Result<(), StoreError>;
    async fn subordinates(&mut self, supervisor: EmployeeId) -> Result<Vec<Employee>, StoreError>;

    // branches
    async fn first_branch(&mut self) -> Result<Option<Branch>, StoreError>;
    async fn insert_branch(&mut self, branch: &Branch) -> Result<(), StoreError>;

    // accounts
    async fn account_number_exists(&mut self, number: &AccountNumber) -> Result<bool, StoreError>;
    async fn account_by_number(&mut self, number: &AccountNumber)
    -> Result<Option<Account>, StoreError>;
    async fn lock_account(&mut self, id: AccountId) -> Result<Option<Account>, StoreError>;
    /// Accounts of a customer, oldest first.
    async fn accounts_of_customer(&mut self, customer: CustomerId)
    -> Result<Vec<Account>, StoreError>;
    async fn insert_account(&mut self, account: &Account) -> Result<(), StoreError>;
    async fn update_account(&mut self, account: &Account) -> Result<(), StoreError>;

    // transaction log
    async fn insert_transaction(&mut self, record: &TransactionRecord) -> Result<(), StoreError>;
    /// Sum of deposits into `account` at or after `since`.
    async fn deposits_since(
        &mut self,
        account: AccountId,
        since: DateTime<Utc>,
    ) -> Result<Money, StoreError>;
    /// Number of withdrawals sourced from `account` at or after `since`.
    async fn withdrawals_since(
        &mut self,
        account: AccountId,
        since: DateTime<Utc>,
    ) -> Result<u32, StoreError>;
    /// Records touching `account`, newest first.
    async fn transactions_for(
        &mut self,
        account: AccountId,
        query: TransactionQuery,
    ) -> Result<Vec<TransactionRecord>, StoreError>;

    // audit and history
    async fn append_audit(&mut self, entry: &AuditEntry) -> Result<(), StoreError>;
    /// Login failures after the most recent login success, newest first.
    async fn recent_login_failures(
        &mut self,
        principal: PrincipalId,
        limit: usize,
    ) -> Result<Vec<DateTime<Utc>>, StoreError>;
    async fn audit_for(&mut self, principal: PrincipalId) -> Result<Vec<AuditEntry>, StoreError>;
    async fn insert_history(&mut self, entry: &AccountHistoryEntry) -> Result<(), StoreError>;
    async fn history_for(&mut self, account: AccountId)
    -> Result<Vec<AccountHistoryEntry>, StoreError>;

    // pending operations
    async fn insert_pending(&mut self, op: &PendingOperation) -> Result<(), StoreError>;
    async fn pending(&mut self, token: Uuid) -> Result<Option<PendingOperation>, StoreError>;
    async fn delete_pending(&mut self, token: Uuid) -> Result<(), StoreError>;
    /// Drop operations whose code expired at or before `now`; returns how many.
    async fn delete_expired_pending(&mut self, now: DateTime<Utc>) -> Result<u64, StoreError>;

    /// Record a request key. `false` when it was already recorded.
    async fn claim_request_key(
        &mut self,
        key: &RequestKey,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    async fn commit(self) -> Result<(), StoreError>;
    async fn rollback(self) -> Result<(), StoreError>;
}
