//! In-memory bank store for tests and local development.
//!
//! A unit of work holds the store's only mutex for its whole lifetime and
//! writes to a staged copy of the state. Commit swaps the staged copy in;
//! rollback (or drop) discards it. Operations are therefore serialized.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use malvader_accounts::{
    Account, AccountHistoryEntry, AccountNumber, Branch, RequestKey, TransactionKind,
    TransactionRecord,
};
use malvader_auth::{AuditAction, AuditEntry, Customer, Employee, NationalId, PendingOperation, Principal};
use malvader_core::{AccountId, CustomerId, EmployeeId, Money, PrincipalId};

use super::{BankStore, StoreError, TransactionQuery, UnitOfWork};

#[derive(Debug, Clone, Default)]
struct BankState {
    principals: HashMap<PrincipalId, Principal>,
    customers: HashMap<CustomerId, Customer>,
    employees: HashMap<EmployeeId, Employee>,
    branches: Vec<Branch>,
    accounts: HashMap<AccountId, Account>,
    transactions: Vec<TransactionRecord>,
    audit: Vec<AuditEntry>,
    history: Vec<AccountHistoryEntry>,
    pending: HashMap<Uuid, PendingOperation>,
    request_keys: HashSet<String>,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryBankStore {
    state: Arc<Mutex<BankState>>,
}

impl InMemoryBankStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BankStore for InMemoryBankStore {
    type Tx = InMemoryUnitOfWork;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        let guard = self.state.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(InMemoryUnitOfWork { guard, staged })
    }
}

pub struct InMemoryUnitOfWork {
    guard: OwnedMutexGuard<BankState>,
    staged: BankState,
}

fn conflict(operation: &'static str, message: impl Into<String>) -> StoreError {
    StoreError::Conflict {
        operation,
        message: message.into(),
    }
}

fn missing(operation: &'static str, message: impl Into<String>) -> StoreError {
    StoreError::Backend {
        operation,
        message: message.into(),
    }
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    async fn principal(&mut self, id: PrincipalId) -> Result<Option<Principal>, StoreError> {
        Ok(self.staged.principals.get(&id).cloned())
    }

    async fn principal_by_national_id(
        &mut self,
        national_id: &NationalId,
    ) -> Result<Option<Principal>, StoreError> {
        Ok(self
            .staged
            .principals
            .values()
            .find(|p| &p.national_id == national_id)
            .cloned())
    }

    async fn email_taken(&mut self, email: &str) -> Result<bool, StoreError> {
        Ok(self.staged.principals.values().any(|p| p.email == email))
    }

    async fn insert_principal(&mut self, principal: &Principal) -> Result<(), StoreError> {
        let state = &mut self.staged;
        if state
            .principals
            .values()
            .any(|p| p.national_id == principal.national_id || p.email == principal.email)
        {
            return Err(conflict("insert_principal", "national ID or email already registered"));
        }
        state.principals.insert(principal.id, principal.clone());
        Ok(())
    }

    async fn update_principal(&mut self, principal: &Principal) -> Result<(), StoreError> {
        match self.staged.principals.get_mut(&principal.id) {
            Some(slot) => {
                *slot = principal.clone();
                Ok(())
            }
            None => Err(missing("update_principal", format!("principal {} not found", principal.id))),
        }
    }

    async fn customer(&mut self, id: CustomerId) -> Result<Option<Customer>, StoreError> {
        Ok(self.staged.customers.get(&id).cloned())
    }

    async fn customer_by_principal(
        &mut self,
        principal_id: PrincipalId,
    ) -> Result<Option<Customer>, StoreError> {
        Ok(self
            .staged
            .customers
            .values()
            .find(|c| c.principal_id == principal_id)
            .cloned())
    }

    async fn insert_customer(&mut self, customer: &Customer) -> Result<(), StoreError> {
        if self
            .staged
            .customers
            .values()
            .any(|c| c.principal_id == customer.principal_id)
        {
            return Err(conflict("insert_customer", "principal already has a customer record"));
        }
        self.staged.customers.insert(customer.id, customer.clone());
        Ok(())
    }

    async fn employee(&mut self, id: EmployeeId) -> Result<Option<Employee>, StoreError> {
        Ok(self.staged.employees.get(&id).cloned())
    }

    async fn employee_by_principal(
        &mut self,
        principal_id: PrincipalId,
    ) -> Result<Option<Employee>, StoreError> {
        Ok(self
            .staged
            .employees
            .values()
            .find(|e| e.principal_id == principal_id)
            .cloned())
    }

    async fn max_employee_sequence(&mut self) -> Result<u32, StoreError> {
        Ok(self
            .staged
            .employees
            .values()
            .map(|e| e.sequence)
            .max()
            .unwrap_or(0))
    }

    async fn insert_employee(&mut self, employee: &Employee) -> Result<(), StoreError> {
        if self.staged.employees.values().any(|e| e.code == employee.code) {
            return Err(conflict("insert_employee", "employee code already taken"));
        }
        self.staged.employees.insert(employee.id, employee.clone());
        Ok(())
    }

    async fn subordinates(&mut self, supervisor: EmployeeId) -> Result<Vec<Employee>, StoreError> {
        let mut found: Vec<Employee> = self
            .staged
            .employees
            .values()
            .filter(|e| e.supervisor_id == Some(supervisor))
            .cloned()
            .collect();
        found.sort_by_key(|e| e.sequence);
        Ok(found)
    }

    async fn first_branch(&mut self) -> Result<Option<Branch>, StoreError> {
        Ok(self.staged.branches.first().cloned())
    }

    async fn insert_branch(&mut self, branch: &Branch) -> Result<(), StoreError> {
        if self.staged.branches.iter().any(|b| b.code == branch.code) {
            return Err(conflict("insert_branch", "branch code already taken"));
        }
        self.staged.branches.push(branch.clone());
        Ok(())
    }

    async fn account_number_exists(&mut self, number: &AccountNumber) -> Result<bool, StoreError> {
        Ok(self.staged.accounts.values().any(|a| &a.number == number))
    }

    async fn account_by_number(
        &mut self,
        number: &AccountNumber,
    ) -> Result<Option<Account>, StoreError> {
        Ok(self
            .staged
            .accounts
            .values()
            .find(|a| &a.number == number)
            .cloned())
    }

    async fn lock_account(&mut self, id: AccountId) -> Result<Option<Account>, StoreError> {
        // The unit of work already holds the store-wide lock.
        Ok(self.staged.accounts.get(&id).cloned())
    }

    async fn accounts_of_customer(
        &mut self,
        customer: CustomerId,
    ) -> Result<Vec<Account>, StoreError> {
        let mut found: Vec<Account> = self
            .staged
            .accounts
            .values()
            .filter(|a| a.customer_id == customer)
            .cloned()
            .collect();
        found.sort_by_key(|a| (a.opened_at, a.id));
        Ok(found)
    }

    async fn insert_account(&mut self, account: &Account) -> Result<(), StoreError> {
        if self
            .staged
            .accounts
            .values()
            .any(|a| a.number == account.number)
        {
            return Err(conflict("insert_account", "account number already taken"));
        }
        self.staged.accounts.insert(account.id, account.clone());
        Ok(())
    }

    async fn update_account(&mut self, account: &Account) -> Result<(), StoreError> {
        match self.staged.accounts.get_mut(&account.id) {
            Some(slot) => {
                *slot = account.clone();
                Ok(())
            }
            None => Err(missing("update_account", format!("account {} not found", account.id))),
        }
    }

    async fn insert_transaction(&mut self, record: &TransactionRecord) -> Result<(), StoreError> {
        self.staged.transactions.push(record.clone());
        Ok(())
    }

    async fn deposits_since(
        &mut self,
        account: AccountId,
        since: DateTime<Utc>,
    ) -> Result<Money, StoreError> {
        Ok(self
            .staged
            .transactions
            .iter()
            .filter(|r| {
                r.kind == TransactionKind::Deposit
                    && r.destination == Some(account)
                    && r.occurred_at >= since
            })
            .map(|r| r.amount)
            .sum())
    }

    async fn withdrawals_since(
        &mut self,
        account: AccountId,
        since: DateTime<Utc>,
    ) -> Result<u32, StoreError> {
        Ok(self
            .staged
            .transactions
            .iter()
            .filter(|r| {
                r.kind == TransactionKind::Withdrawal
                    && r.source == Some(account)
                    && r.occurred_at >= since
            })
            .count() as u32)
    }

    async fn transactions_for(
        &mut self,
        account: AccountId,
        query: TransactionQuery,
    ) -> Result<Vec<TransactionRecord>, StoreError> {
        let mut found: Vec<TransactionRecord> = self
            .staged
            .transactions
            .iter()
            .filter(|r| r.touches(account))
            .filter(|r| query.from.is_none_or(|from| r.occurred_at >= from))
            .filter(|r| query.to.is_none_or(|to| r.occurred_at < to))
            .cloned()
            .collect();
        // Stable sort keeps insertion order for records sharing a timestamp.
        found.reverse();
        found.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));
        if let Some(limit) = query.limit {
            found.truncate(limit);
        }
        Ok(found)
    }

    async fn append_audit(&mut self, entry: &AuditEntry) -> Result<(), StoreError> {
        self.staged.audit.push(entry.clone());
        Ok(())
    }

    async fn recent_login_failures(
        &mut self,
        principal: PrincipalId,
        limit: usize,
    ) -> Result<Vec<DateTime<Utc>>, StoreError> {
        let entries: Vec<&AuditEntry> = self
            .staged
            .audit
            .iter()
            .filter(|e| e.principal_id == principal)
            .collect();
        let last_success = entries
            .iter()
            .filter(|e| e.action == AuditAction::LoginSuccess)
            .map(|e| e.occurred_at)
            .max();
        let mut failures: Vec<DateTime<Utc>> = entries
            .iter()
            .filter(|e| e.action == AuditAction::LoginFailure)
            .filter(|e| last_success.is_none_or(|s| e.occurred_at > s))
            .map(|e| e.occurred_at)
            .collect();
        failures.sort_by(|a, b| b.cmp(a));
        failures.truncate(limit);
        Ok(failures)
    }

    async fn audit_for(&mut self, principal: PrincipalId) -> Result<Vec<AuditEntry>, StoreError> {
        Ok(self
            .staged
            .audit
            .iter()
            .filter(|e| e.principal_id == principal)
            .cloned()
            .collect())
    }

    async fn insert_history(&mut self, entry: &AccountHistoryEntry) -> Result<(), StoreError> {
        self.staged.history.push(entry.clone());
        Ok(())
    }

    async fn history_for(
        &mut self,
        account: AccountId,
    ) -> Result<Vec<AccountHistoryEntry>, StoreError> {
        Ok(self
            .staged
            .history
            .iter()
            .filter(|h| h.account_id == account)
            .cloned()
            .collect())
    }

    async fn insert_pending(&mut self, op: &PendingOperation) -> Result<(), StoreError> {
        self.staged.pending.insert(op.token, op.clone());
        Ok(())
    }

    async fn pending(&mut self, token: Uuid) -> Result<Option<PendingOperation>, StoreError> {
        Ok(self.staged.pending.get(&token).cloned())
    }

    async fn delete_pending(&mut self, token: Uuid) -> Result<(), StoreError> {
        self.staged.pending.remove(&token);
        Ok(())
    }

    async fn delete_expired_pending(&mut self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let before = self.staged.pending.len();
        self.staged.pending.retain(|_, op| !op.otp.is_expired(now));
        Ok((before - self.staged.pending.len()) as u64)
    }

    async fn claim_request_key(
        &mut self,
        key: &RequestKey,
        _at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        Ok(self.staged.request_keys.insert(key.as_str().to_string()))
    }

    async fn commit(self) -> Result<(), StoreError> {
        let InMemoryUnitOfWork { mut guard, staged } = self;
        *guard = staged;
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use malvader_accounts::{AccountKind, SavingsTerms};
    use rust_decimal::Decimal;

    async fn seeded() -> (InMemoryBankStore, Account) {
        let store = InMemoryBankStore::new();
        let branch = Branch::new("0001", "Central").unwrap();
        let account = Account::open(
            AccountNumber::from_base(123_456).unwrap(),
            AccountKind::Savings(SavingsTerms {
                yield_rate: Decimal::ZERO,
                last_yield_at: None,
            }),
            CustomerId::new(),
            branch.id,
            Utc::now(),
        )
        .unwrap();
        let mut tx = store.begin().await.unwrap();
        tx.insert_branch(&branch).await.unwrap();
        tx.insert_account(&account).await.unwrap();
        tx.commit().await.unwrap();
        (store, account)
    }

    #[tokio::test]
    async fn rollback_discards_staged_writes() {
        let (store, mut account) = seeded().await;

        let mut tx = store.begin().await.unwrap();
        account.balance = Money::from_units(99);
        tx.update_account(&account).await.unwrap();
        tx.rollback().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let loaded = tx.lock_account(account.id).await.unwrap().unwrap();
        assert_eq!(loaded.balance, Money::ZERO);
    }

    #[tokio::test]
    async fn dropped_unit_of_work_behaves_like_rollback() {
        let (store, mut account) = seeded().await;
        {
            let mut tx = store.begin().await.unwrap();
            account.balance = Money::from_units(5);
            tx.update_account(&account).await.unwrap();
        }
        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.lock_account(account.id).await.unwrap().unwrap().balance, Money::ZERO);
    }

    #[tokio::test]
    async fn duplicate_account_numbers_conflict() {
        let (store, account) = seeded().await;
        let mut twin = account.clone();
        twin.id = AccountId::new();
        let mut tx = store.begin().await.unwrap();
        assert!(matches!(
            tx.insert_account(&twin).await,
            Err(StoreError::Conflict { .. })
        ));
    }

    #[tokio::test]
    async fn request_keys_are_claimed_once() {
        let store = InMemoryBankStore::new();
        let key = RequestKey::new("abc").unwrap();
        let mut tx = store.begin().await.unwrap();
        assert!(tx.claim_request_key(&key, Utc::now()).await.unwrap());
        assert!(!tx.claim_request_key(&key, Utc::now()).await.unwrap());
    }
}
