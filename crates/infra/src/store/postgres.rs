//! PostgreSQL-backed bank store.
//!
//! Each unit of work is one database transaction. Account rows touched by a
//! money movement are read with `SELECT ... FOR UPDATE`, so concurrent
//! operations on the same account serialize at the row level.
//!
//! ## Error Mapping
//!
//! | SQLx error                          | `StoreError` |
//! |-------------------------------------|--------------|
//! | Database, unique violation `23505`  | `Conflict`   |
//! | Database, any other code            | `Backend`    |
//! | Decode / column mismatch            | `Corrupt`    |
//! | Pool closed, IO, TLS, anything else | `Backend`    |

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use malvader_accounts::{
    Account, AccountHistoryEntry, AccountKind, AccountNumber, AccountStatus, Branch, EmployeeCode,
    HistoryEvent, RequestKey, TransactionKind, TransactionRecord,
};
use malvader_auth::{
    ActiveOtp, AuditAction, AuditEntry, Customer, Employee, EmployeeRank, NationalId,
    PendingKind, PendingOperation, Principal, Role,
};
use malvader_core::{
    AccountId, BranchId, CustomerId, DomainError, EmployeeId, Money, PrincipalId, TransactionId,
};

use super::{BankStore, StoreError, TransactionQuery, UnitOfWork};

#[derive(Debug, Clone)]
pub struct PostgresBankStore {
    pool: PgPool,
}

impl PostgresBankStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect and apply pending migrations.
    #[instrument(skip(database_url), err)]
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::Backend {
                operation: "migrate",
                message: e.to_string(),
            })?;

        Ok(Self::new(pool))
    }
}

#[async_trait]
impl BankStore for PostgresBankStore {
    type Tx = PgUnitOfWork;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        Ok(PgUnitOfWork { tx })
    }
}

pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

const PRINCIPAL_COLUMNS: &str = "id, national_id, name, email, birth_date, phone, password_hash, \
     role, otp_code, otp_expires_at, otp_attempts, provisional_password, created_at";

const EMPLOYEE_COLUMNS: &str =
    "id, principal_id, sequence, code, rank, supervisor_id, branch_id, hired_at";

const ACCOUNT_COLUMNS: &str =
    "id, number, balance, terms, status, customer_id, branch_id, opened_at";

const TRANSACTION_COLUMNS: &str =
    "id, kind, amount, occurred_at, description, source_account_id, destination_account_id";

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn principal(&mut self, id: PrincipalId) -> Result<Option<Principal>, StoreError> {
        let row = sqlx::query(&format!("SELECT {PRINCIPAL_COLUMNS} FROM principals WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("principal", e))?;
        row.as_ref().map(principal_from_row).transpose()
    }

    async fn principal_by_national_id(
        &mut self,
        national_id: &NationalId,
    ) -> Result<Option<Principal>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {PRINCIPAL_COLUMNS} FROM principals WHERE national_id = $1"
        ))
        .bind(national_id.as_str())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("principal_by_national_id", e))?;
        row.as_ref().map(principal_from_row).transpose()
    }

    async fn email_taken(&mut self, email: &str) -> Result<bool, StoreError> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM principals WHERE email = $1)")
            .bind(email)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("email_taken", e))
    }

    #[instrument(skip(self, principal), fields(principal_id = %principal.id), err)]
    async fn insert_principal(&mut self, principal: &Principal) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO principals (
                id, national_id, name, email, birth_date, phone, password_hash,
                role, otp_code, otp_expires_at, otp_attempts, provisional_password, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(principal.id.as_uuid())
        .bind(principal.national_id.as_str())
        .bind(&principal.name)
        .bind(&principal.email)
        .bind(principal.birth_date)
        .bind(&principal.phone)
        .bind(&principal.password_hash)
        .bind(principal.role.as_str())
        .bind(principal.otp.as_ref().map(|o| o.code.clone()))
        .bind(principal.otp.as_ref().map(|o| o.expires_at))
        .bind(principal.otp_attempts as i32)
        .bind(principal.provisional_password)
        .bind(principal.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_principal", e))?;
        Ok(())
    }

    async fn update_principal(&mut self, principal: &Principal) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE principals
            SET password_hash = $2,
                otp_code = $3,
                otp_expires_at = $4,
                otp_attempts = $5,
                provisional_password = $6
            WHERE id = $1
            "#,
        )
        .bind(principal.id.as_uuid())
        .bind(&principal.password_hash)
        .bind(principal.otp.as_ref().map(|o| o.code.clone()))
        .bind(principal.otp.as_ref().map(|o| o.expires_at))
        .bind(principal.otp_attempts as i32)
        .bind(principal.provisional_password)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_principal", e))?;
        Ok(())
    }

    async fn customer(&mut self, id: CustomerId) -> Result<Option<Customer>, StoreError> {
        let row = sqlx::query("SELECT id, principal_id, credit_score FROM customers WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("customer", e))?;
        row.as_ref().map(customer_from_row).transpose()
    }

    async fn customer_by_principal(
        &mut self,
        principal_id: PrincipalId,
    ) -> Result<Option<Customer>, StoreError> {
        let row = sqlx::query(
            "SELECT id, principal_id, credit_score FROM customers WHERE principal_id = $1",
        )
        .bind(principal_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("customer_by_principal", e))?;
        row.as_ref().map(customer_from_row).transpose()
    }

    async fn insert_customer(&mut self, customer: &Customer) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO customers (id, principal_id, credit_score) VALUES ($1, $2, $3)")
            .bind(customer.id.as_uuid())
            .bind(customer.principal_id.as_uuid())
            .bind(customer.credit_score)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("insert_customer", e))?;
        Ok(())
    }

    async fn employee(&mut self, id: EmployeeId) -> Result<Option<Employee>, StoreError> {
        let row = sqlx::query(&format!("SELECT {EMPLOYEE_COLUMNS} FROM employees WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("employee", e))?;
        row.as_ref().map(employee_from_row).transpose()
    }

    async fn employee_by_principal(
        &mut self,
        principal_id: PrincipalId,
    ) -> Result<Option<Employee>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {EMPLOYEE_COLUMNS} FROM employees WHERE principal_id = $1"
        ))
        .bind(principal_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("employee_by_principal", e))?;
        row.as_ref().map(employee_from_row).transpose()
    }

    async fn max_employee_sequence(&mut self) -> Result<u32, StoreError> {
        let max: i32 = sqlx::query_scalar("SELECT COALESCE(MAX(sequence), 0) FROM employees")
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("max_employee_sequence", e))?;
        Ok(max.max(0) as u32)
    }

    #[instrument(skip(self, employee), fields(employee_id = %employee.id, code = %employee.code), err)]
    async fn insert_employee(&mut self, employee: &Employee) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO employees (id, principal_id, sequence, code, rank, supervisor_id, branch_id, hired_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(employee.id.as_uuid())
        .bind(employee.principal_id.as_uuid())
        .bind(employee.sequence as i32)
        .bind(employee.code.as_str())
        .bind(employee.rank.as_str())
        .bind(employee.supervisor_id.map(Uuid::from))
        .bind(employee.branch_id.map(Uuid::from))
        .bind(employee.hired_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_employee", e))?;
        Ok(())
    }

    async fn subordinates(&mut self, supervisor: EmployeeId) -> Result<Vec<Employee>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {EMPLOYEE_COLUMNS} FROM employees WHERE supervisor_id = $1 ORDER BY sequence"
        ))
        .bind(supervisor.as_uuid())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("subordinates", e))?;
        rows.iter().map(employee_from_row).collect()
    }

    async fn first_branch(&mut self) -> Result<Option<Branch>, StoreError> {
        let row = sqlx::query("SELECT id, code, name FROM branches ORDER BY created_at, code LIMIT 1")
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("first_branch", e))?;
        row.as_ref()
            .map(|row| -> Result<Branch, StoreError> {
                Ok(Branch {
                    id: BranchId::from_uuid(get(row, "id", "first_branch")?),
                    code: get(row, "code", "first_branch")?,
                    name: get(row, "name", "first_branch")?,
                })
            })
            .transpose()
    }

    async fn insert_branch(&mut self, branch: &Branch) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO branches (id, code, name) VALUES ($1, $2, $3)")
            .bind(branch.id.as_uuid())
            .bind(&branch.code)
            .bind(&branch.name)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("insert_branch", e))?;
        Ok(())
    }

    async fn account_number_exists(&mut self, number: &AccountNumber) -> Result<bool, StoreError> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM accounts WHERE number = $1)")
            .bind(number.as_str())
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("account_number_exists", e))
    }

    async fn account_by_number(
        &mut self,
        number: &AccountNumber,
    ) -> Result<Option<Account>, StoreError> {
        let row = sqlx::query(&format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE number = $1"))
            .bind(number.as_str())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("account_by_number", e))?;
        row.as_ref().map(account_from_row).transpose()
    }

    #[instrument(skip(self), fields(account_id = %id), err)]
    async fn lock_account(&mut self, id: AccountId) -> Result<Option<Account>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("lock_account", e))?;
        row.as_ref().map(account_from_row).transpose()
    }

    async fn accounts_of_customer(
        &mut self,
        customer: CustomerId,
    ) -> Result<Vec<Account>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE customer_id = $1 ORDER BY opened_at, id"
        ))
        .bind(customer.as_uuid())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("accounts_of_customer", e))?;
        rows.iter().map(account_from_row).collect()
    }

    #[instrument(skip(self, account), fields(account_id = %account.id, number = %account.number), err)]
    async fn insert_account(&mut self, account: &Account) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO accounts (id, number, balance, account_type, terms, status, customer_id, branch_id, opened_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(account.id.as_uuid())
        .bind(account.number.as_str())
        .bind(account.balance.amount())
        .bind(account.account_type().as_str())
        .bind(Json(&account.kind))
        .bind(account.status.as_str())
        .bind(account.customer_id.as_uuid())
        .bind(account.branch_id.as_uuid())
        .bind(account.opened_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_account", e))?;
        Ok(())
    }

    async fn update_account(&mut self, account: &Account) -> Result<(), StoreError> {
        sqlx::query("UPDATE accounts SET balance = $2, status = $3, terms = $4 WHERE id = $1")
            .bind(account.id.as_uuid())
            .bind(account.balance.amount())
            .bind(account.status.as_str())
            .bind(Json(&account.kind))
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("update_account", e))?;
        Ok(())
    }

    async fn insert_transaction(&mut self, record: &TransactionRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO transactions (id, kind, amount, occurred_at, description, source_account_id, destination_account_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(record.id.as_uuid())
        .bind(record.kind.as_str())
        .bind(record.amount.amount())
        .bind(record.occurred_at)
        .bind(&record.description)
        .bind(record.source.map(Uuid::from))
        .bind(record.destination.map(Uuid::from))
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_transaction", e))?;
        Ok(())
    }

    async fn deposits_since(
        &mut self,
        account: AccountId,
        since: DateTime<Utc>,
    ) -> Result<Money, StoreError> {
        let total: Decimal = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(amount), 0)
            FROM transactions
            WHERE destination_account_id = $1 AND kind = 'deposit' AND occurred_at >= $2
            "#,
        )
        .bind(account.as_uuid())
        .bind(since)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("deposits_since", e))?;
        money(total, "deposits_since")
    }

    async fn withdrawals_since(
        &mut self,
        account: AccountId,
        since: DateTime<Utc>,
    ) -> Result<u32, StoreError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM transactions
            WHERE source_account_id = $1 AND kind = 'withdrawal' AND occurred_at >= $2
            "#,
        )
        .bind(account.as_uuid())
        .bind(since)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("withdrawals_since", e))?;
        Ok(count.max(0) as u32)
    }

    async fn transactions_for(
        &mut self,
        account: AccountId,
        query: TransactionQuery,
    ) -> Result<Vec<TransactionRecord>, StoreError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {TRANSACTION_COLUMNS}
            FROM transactions
            WHERE (source_account_id = $1 OR destination_account_id = $1)
              AND ($2::timestamptz IS NULL OR occurred_at >= $2)
              AND ($3::timestamptz IS NULL OR occurred_at < $3)
            ORDER BY occurred_at DESC, seq DESC
            LIMIT $4
            "#
        ))
        .bind(account.as_uuid())
        .bind(query.from)
        .bind(query.to)
        .bind(query.limit.map(|l| l as i64))
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("transactions_for", e))?;
        rows.iter().map(transaction_from_row).collect()
    }

    async fn append_audit(&mut self, entry: &AuditEntry) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO audit_log (id, principal_id, action, occurred_at, detail) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(entry.id)
        .bind(entry.principal_id.as_uuid())
        .bind(entry.action.as_str())
        .bind(entry.occurred_at)
        .bind(&entry.detail)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("append_audit", e))?;
        Ok(())
    }

    async fn recent_login_failures(
        &mut self,
        principal: PrincipalId,
        limit: usize,
    ) -> Result<Vec<DateTime<Utc>>, StoreError> {
        sqlx::query_scalar(
            r#"
            SELECT occurred_at
            FROM audit_log
            WHERE principal_id = $1
              AND action = 'login_failure'
              AND occurred_at > COALESCE(
                  (SELECT MAX(occurred_at) FROM audit_log
                   WHERE principal_id = $1 AND action = 'login_success'),
                  '-infinity'::timestamptz)
            ORDER BY occurred_at DESC, seq DESC
            LIMIT $2
            "#,
        )
        .bind(principal.as_uuid())
        .bind(limit as i64)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("recent_login_failures", e))
    }

    async fn audit_for(&mut self, principal: PrincipalId) -> Result<Vec<AuditEntry>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, principal_id, action, occurred_at, detail
            FROM audit_log
            WHERE principal_id = $1
            ORDER BY seq
            "#,
        )
        .bind(principal.as_uuid())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("audit_for", e))?;
        rows.iter()
            .map(|row| -> Result<AuditEntry, StoreError> {
                let action: String = get(row, "action", "audit_for")?;
                Ok(AuditEntry {
                    id: get(row, "id", "audit_for")?,
                    principal_id: PrincipalId::from_uuid(get(row, "principal_id", "audit_for")?),
                    action: parse_domain::<AuditAction>(action.parse(), "audit_for")?,
                    occurred_at: get(row, "occurred_at", "audit_for")?,
                    detail: get(row, "detail", "audit_for")?,
                })
            })
            .collect()
    }

    async fn insert_history(&mut self, entry: &AccountHistoryEntry) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO account_history (id, account_id, event, employee_id, reason, recorded_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(entry.id)
        .bind(entry.account_id.as_uuid())
        .bind(entry.event.as_str())
        .bind(entry.employee_id.map(Uuid::from))
        .bind(&entry.reason)
        .bind(entry.recorded_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_history", e))?;
        Ok(())
    }

    async fn history_for(
        &mut self,
        account: AccountId,
    ) -> Result<Vec<AccountHistoryEntry>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, account_id, event, employee_id, reason, recorded_at
            FROM account_history
            WHERE account_id = $1
            ORDER BY recorded_at
            "#,
        )
        .bind(account.as_uuid())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("history_for", e))?;
        rows.iter()
            .map(|row| -> Result<AccountHistoryEntry, StoreError> {
                let event: String = get(row, "event", "history_for")?;
                let employee: Option<Uuid> = get(row, "employee_id", "history_for")?;
                Ok(AccountHistoryEntry {
                    id: get(row, "id", "history_for")?,
                    account_id: AccountId::from_uuid(get(row, "account_id", "history_for")?),
                    event: parse_domain(HistoryEvent::parse(&event), "history_for")?,
                    employee_id: employee.map(EmployeeId::from_uuid),
                    reason: get(row, "reason", "history_for")?,
                    recorded_at: get(row, "recorded_at", "history_for")?,
                })
            })
            .collect()
    }

    async fn insert_pending(&mut self, op: &PendingOperation) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO pending_operations (token, kind, account_id, employee_id, reason, otp_code, otp_expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(op.token)
        .bind(op.kind.as_str())
        .bind(op.account_id.as_uuid())
        .bind(op.employee_id.as_uuid())
        .bind(&op.reason)
        .bind(&op.otp.code)
        .bind(op.otp.expires_at)
        .bind(op.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_pending", e))?;
        Ok(())
    }

    async fn pending(&mut self, token: Uuid) -> Result<Option<PendingOperation>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT token, kind, account_id, employee_id, reason, otp_code, otp_expires_at, created_at
            FROM pending_operations
            WHERE token = $1
            FOR UPDATE
            "#,
        )
        .bind(token)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("pending", e))?;
        row.as_ref()
            .map(|row| -> Result<PendingOperation, StoreError> {
                let kind: String = get(row, "kind", "pending")?;
                Ok(PendingOperation {
                    token: get(row, "token", "pending")?,
                    kind: parse_domain(PendingKind::parse(&kind), "pending")?,
                    account_id: AccountId::from_uuid(get(row, "account_id", "pending")?),
                    employee_id: EmployeeId::from_uuid(get(row, "employee_id", "pending")?),
                    reason: get(row, "reason", "pending")?,
                    otp: ActiveOtp {
                        code: get(row, "otp_code", "pending")?,
                        expires_at: get(row, "otp_expires_at", "pending")?,
                    },
                    created_at: get(row, "created_at", "pending")?,
                })
            })
            .transpose()
    }

    async fn delete_pending(&mut self, token: Uuid) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM pending_operations WHERE token = $1")
            .bind(token)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_pending", e))?;
        Ok(())
    }

    async fn delete_expired_pending(&mut self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM pending_operations WHERE otp_expires_at <= $1")
            .bind(now)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_expired_pending", e))?;
        Ok(result.rows_affected())
    }

    async fn claim_request_key(
        &mut self,
        key: &RequestKey,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "INSERT INTO request_keys (key, recorded_at) VALUES ($1, $2) ON CONFLICT (key) DO NOTHING",
        )
        .bind(key.as_str())
        .bind(at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("claim_request_key", e))?;
        Ok(result.rows_affected() == 1)
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    async fn rollback(self) -> Result<(), StoreError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback", e))
    }
}

fn get<'r, T>(row: &'r PgRow, column: &str, operation: &'static str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(column).map_err(|e| StoreError::Corrupt {
        operation,
        message: format!("column {column}: {e}"),
    })
}

fn parse_domain<T>(value: Result<T, DomainError>, operation: &'static str) -> Result<T, StoreError> {
    value.map_err(|e| StoreError::Corrupt {
        operation,
        message: e.to_string(),
    })
}

fn money(value: Decimal, operation: &'static str) -> Result<Money, StoreError> {
    Money::new(value).map_err(|e| StoreError::Corrupt {
        operation,
        message: e.to_string(),
    })
}

fn principal_from_row(row: &PgRow) -> Result<Principal, StoreError> {
    const OP: &str = "principal_from_row";
    let national_id: String = get(row, "national_id", OP)?;
    let role: String = get(row, "role", OP)?;
    let otp_code: Option<String> = get(row, "otp_code", OP)?;
    let otp_expires_at: Option<DateTime<Utc>> = get(row, "otp_expires_at", OP)?;
    let otp_attempts: i32 = get(row, "otp_attempts", OP)?;
    let birth_date: NaiveDate = get(row, "birth_date", OP)?;

    Ok(Principal {
        id: PrincipalId::from_uuid(get(row, "id", OP)?),
        national_id: parse_domain(NationalId::parse(&national_id), OP)?,
        name: get(row, "name", OP)?,
        email: get(row, "email", OP)?,
        birth_date,
        phone: get(row, "phone", OP)?,
        password_hash: get(row, "password_hash", OP)?,
        role: parse_domain(role.parse::<Role>(), OP)?,
        otp: match (otp_code, otp_expires_at) {
            (Some(code), Some(expires_at)) => Some(ActiveOtp { code, expires_at }),
            _ => None,
        },
        otp_attempts: otp_attempts.max(0) as u32,
        provisional_password: get(row, "provisional_password", OP)?,
        created_at: get(row, "created_at", OP)?,
    })
}

fn customer_from_row(row: &PgRow) -> Result<Customer, StoreError> {
    const OP: &str = "customer_from_row";
    Ok(Customer {
        id: CustomerId::from_uuid(get(row, "id", OP)?),
        principal_id: PrincipalId::from_uuid(get(row, "principal_id", OP)?),
        credit_score: get(row, "credit_score", OP)?,
    })
}

fn employee_from_row(row: &PgRow) -> Result<Employee, StoreError> {
    const OP: &str = "employee_from_row";
    let sequence: i32 = get(row, "sequence", OP)?;
    let rank: String = get(row, "rank", OP)?;
    let supervisor: Option<Uuid> = get(row, "supervisor_id", OP)?;
    let branch: Option<Uuid> = get(row, "branch_id", OP)?;
    let sequence = sequence.max(0) as u32;

    Ok(Employee {
        id: EmployeeId::from_uuid(get(row, "id", OP)?),
        principal_id: PrincipalId::from_uuid(get(row, "principal_id", OP)?),
        sequence,
        code: EmployeeCode::for_sequence(sequence),
        rank: parse_domain(rank.parse::<EmployeeRank>(), OP)?,
        supervisor_id: supervisor.map(EmployeeId::from_uuid),
        branch_id: branch.map(BranchId::from_uuid),
        hired_at: get(row, "hired_at", OP)?,
    })
}

fn account_from_row(row: &PgRow) -> Result<Account, StoreError> {
    const OP: &str = "account_from_row";
    let number: String = get(row, "number", OP)?;
    let balance: Decimal = get(row, "balance", OP)?;
    let Json(kind): Json<AccountKind> = get(row, "terms", OP)?;
    let status: String = get(row, "status", OP)?;

    Ok(Account {
        id: AccountId::from_uuid(get(row, "id", OP)?),
        number: parse_domain(number.parse::<AccountNumber>(), OP)?,
        balance: money(balance, OP)?,
        kind,
        status: parse_domain(status.parse::<AccountStatus>(), OP)?,
        customer_id: CustomerId::from_uuid(get(row, "customer_id", OP)?),
        branch_id: BranchId::from_uuid(get(row, "branch_id", OP)?),
        opened_at: get(row, "opened_at", OP)?,
    })
}

fn transaction_from_row(row: &PgRow) -> Result<TransactionRecord, StoreError> {
    const OP: &str = "transaction_from_row";
    let kind: String = get(row, "kind", OP)?;
    let amount: Decimal = get(row, "amount", OP)?;
    let source: Option<Uuid> = get(row, "source_account_id", OP)?;
    let destination: Option<Uuid> = get(row, "destination_account_id", OP)?;

    Ok(TransactionRecord {
        id: TransactionId::from_uuid(get(row, "id", OP)?),
        kind: parse_domain(kind.parse::<TransactionKind>(), OP)?,
        amount: money(amount, OP)?,
        occurred_at: get(row, "occurred_at", OP)?,
        description: get(row, "description", OP)?,
        source: source.map(AccountId::from_uuid),
        destination: destination.map(AccountId::from_uuid),
    })
}

/// Map SQLx errors into `StoreError`, tagging the failing operation.
fn map_sqlx_error(operation: &'static str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let message = db_err.message().to_string();
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Conflict { operation, message },
                _ => StoreError::Backend { operation, message },
            }
        }
        decode @ (sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::ColumnNotFound(_)) => StoreError::Corrupt {
            operation,
            message: decode.to_string(),
        },
        other => StoreError::Backend {
            operation,
            message: other.to_string(),
        },
    }
}
