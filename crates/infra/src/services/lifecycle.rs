//! Customer signup, account opening and closure, employee registration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use malvader_accounts::{
    Account, AccountHistoryEntry, AccountKind, AccountNumber, AccountStatus, Branch, HistoryEvent,
    plan_opening_deposit,
};
use malvader_auth::{
    ActiveOtp, Actor, AuditAction, AuditEntry, Customer, Employee, EmployeeRank, IdentityInput,
    NationalId, PendingOperation, Permission, Principal, Role, ValidatedIdentity, authorize,
    check_strength, generate_code, generate_provisional, hash_password, verify_password,
};
use malvader_core::{DomainError, EmployeeId, Money};

use super::{BankService, finish};
use crate::store::{BankStore, UnitOfWork};

/// Collisions tolerated before account number generation gives up.
const MAX_NUMBER_ATTEMPTS: usize = 32;

/// Who the new account belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "holder", rename_all = "snake_case")]
pub enum AccountHolder {
    Existing {
        national_id: String,
    },
    New {
        #[serde(flatten)]
        identity: IdentityInput,
        /// Generated (and returned once) when absent.
        #[serde(default)]
        password: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenAccountRequest {
    pub holder: AccountHolder,
    pub kind: AccountKind,
    pub initial_deposit: Money,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedAccount {
    pub account: Account,
    pub customer: Customer,
    /// Plain-text password issued to a new holder, if one was generated.
    pub issued_password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosureChallenge {
    pub token: Uuid,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterEmployeeRequest {
    pub identity: IdentityInput,
    pub rank: EmployeeRank,
    pub password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredEmployee {
    pub employee: Employee,
    pub issued_password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaffMember {
    pub employee: Employee,
    pub name: String,
    pub email: String,
}

/// Password to hash plus the plain text to hand back when it was generated.
struct IssuedPassword {
    plain: String,
    generated: bool,
}

impl<S: BankStore> BankService<S> {
    /// Public self-service registration of a customer without accounts.
    #[instrument(skip_all)]
    pub async fn signup(
        &self,
        identity: &IdentityInput,
        password: &str,
    ) -> Result<Customer, DomainError> {
        let now = self.now();
        let identity = identity.validate(now.date_naive())?;
        check_strength(password, self.auth_policy.min_password_len)?;
        let password_hash = hash_password(password)?;

        let mut tx = self.begin().await?;
        let result = async {
            ensure_unique(&mut tx, &identity).await?;
            let principal = Principal::new(identity, password_hash, Role::Customer, false, now);
            let customer = Customer::new(principal.id);
            tx.insert_principal(&principal).await?;
            tx.insert_customer(&customer).await?;
            tx.append_audit(&AuditEntry::new(
                principal.id,
                AuditAction::CustomerRegistered,
                now,
                "self-service signup",
            ))
            .await?;
            Ok::<_, DomainError>(customer)
        }
        .await;
        let customer = finish(tx, "signup", result).await?;
        info!(customer_id = %customer.id, "customer registered");
        Ok(customer)
    }

    /// Open an account for a new or existing customer, optionally funded.
    #[instrument(skip_all, fields(employee_id = ?actor.employee_id, account_type = %request.kind.account_type().as_str()))]
    pub async fn open_account(
        &self,
        actor: &Actor,
        request: OpenAccountRequest,
    ) -> Result<OpenedAccount, DomainError> {
        authorize(actor, Permission::OpenAccount)?;
        if request.initial_deposit.is_negative() {
            return Err(DomainError::InvalidAmount);
        }
        request.kind.validate()?;
        let now = self.now();

        // Identity checks and hashing happen before the unit of work opens.
        let new_holder = match &request.holder {
            AccountHolder::Existing { .. } => None,
            AccountHolder::New { identity, password } => {
                let identity = identity.validate(now.date_naive())?;
                let issued = self.issue_password(password.as_deref())?;
                let hash = hash_password(&issued.plain)?;
                Some((identity, issued, hash))
            }
        };

        let mut tx = self.begin().await?;
        let result = self
            .open_account_in(&mut tx, actor, &request, new_holder, now)
            .await;
        let opened = finish(tx, "open_account", result).await?;
        info!(account = %opened.account.number, customer_id = %opened.customer.id, "account opened");
        Ok(opened)
    }

    async fn open_account_in(
        &self,
        tx: &mut S::Tx,
        actor: &Actor,
        request: &OpenAccountRequest,
        new_holder: Option<(ValidatedIdentity, IssuedPassword, String)>,
        now: DateTime<Utc>,
    ) -> Result<OpenedAccount, DomainError> {
        let (customer, issued_password) = match (&request.holder, new_holder) {
            (AccountHolder::Existing { national_id }, _) => {
                let national_id = NationalId::parse(national_id)?;
                let principal = tx
                    .principal_by_national_id(&national_id)
                    .await?
                    .filter(|p| p.role == Role::Customer)
                    .ok_or(DomainError::not_found("customer"))?;
                let customer = tx
                    .customer_by_principal(principal.id)
                    .await?
                    .ok_or(DomainError::not_found("customer"))?;
                (customer, None)
            }
            (AccountHolder::New { .. }, Some((identity, issued, hash))) => {
                ensure_unique(tx, &identity).await?;
                let principal = Principal::new(identity, hash, Role::Customer, true, now);
                let customer = Customer::new(principal.id);
                tx.insert_principal(&principal).await?;
                tx.insert_customer(&customer).await?;
                tx.append_audit(&AuditEntry::new(
                    actor.principal_id,
                    AuditAction::CustomerRegistered,
                    now,
                    format!("customer {} registered at account opening", customer.id),
                ))
                .await?;
                (customer, issued.generated.then_some(issued.plain))
            }
            (AccountHolder::New { .. }, None) => {
                return Err(DomainError::consistency("new holder was not prepared"));
            }
        };

        let branch = tx
            .first_branch()
            .await?
            .ok_or(DomainError::not_found("branch"))?;
        let number = unused_number(tx).await?;

        let mut account = Account::open(number, request.kind.clone(), customer.id, branch.id, now)?;
        tx.insert_account(&account).await?;
        tx.insert_history(&AccountHistoryEntry::new(
            account.id,
            HistoryEvent::Opening,
            actor.employee_id,
            "account opened",
            now,
        ))
        .await?;
        tx.append_audit(&AuditEntry::new(
            actor.principal_id,
            AuditAction::AccountOpened,
            now,
            format!("account {} opened for customer {}", account.number, customer.id),
        ))
        .await?;

        if request.initial_deposit.is_positive() {
            let posting = plan_opening_deposit(&account, request.initial_deposit, now)?;
            posting.apply(&mut account);
            tx.update_account(&account).await?;
            for record in &posting.records {
                tx.insert_transaction(record).await?;
            }
        }

        Ok(OpenedAccount {
            account,
            customer,
            issued_password,
        })
    }

    /// Phase one of closure: checks eligibility and sends a code to the
    /// requesting employee. Returns the token that phase two must present.
    #[instrument(skip_all, fields(account = %number))]
    pub async fn request_closure(
        &self,
        actor: &Actor,
        number: &AccountNumber,
        reason: &str,
    ) -> Result<ClosureChallenge, DomainError> {
        authorize(actor, Permission::CloseAccount)?;
        let employee_id = acting_employee(actor)?;
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(DomainError::validation("a closure reason is required"));
        }
        let now = self.now();

        let mut tx = self.begin().await?;
        let result = async {
            let account = tx
                .account_by_number(number)
                .await?
                .ok_or(DomainError::not_found("account"))?;
            ensure_closable(&account)?;
            let employee = tx
                .principal(actor.principal_id)
                .await?
                .ok_or(DomainError::not_found("employee"))?;
            Ok::<_, DomainError>((account, employee))
        }
        .await;
        let (account, employee) = finish(tx, "request_closure", result).await?;

        let code = generate_code(&mut rand::thread_rng());
        self.notifier
            .send(&employee.email, &employee.name, &code)
            .await
            .map_err(|e| {
                warn!(error = %e, "closure code delivery failed");
                DomainError::from(e)
            })?;

        let otp = ActiveOtp::new(code, now, self.auth_policy.closure_otp_ttl());
        let pending = PendingOperation::account_closure(account.id, employee_id, reason, otp, now);
        let challenge = ClosureChallenge {
            token: pending.token,
            expires_at: pending.otp.expires_at,
        };

        let mut tx = self.begin().await?;
        let result = async {
            let swept = tx.delete_expired_pending(now).await?;
            if swept > 0 {
                info!(swept, "expired closure requests discarded");
            }
            tx.insert_pending(&pending).await?;
            Ok::<_, DomainError>(())
        }
        .await;
        finish(tx, "request_closure", result).await?;

        info!(token = %challenge.token, "closure pending confirmation");
        Ok(challenge)
    }

    /// Phase two of closure: password and code of the requesting employee.
    #[instrument(skip_all, fields(token = %token))]
    pub async fn confirm_closure(
        &self,
        actor: &Actor,
        token: Uuid,
        password: &str,
        code: &str,
    ) -> Result<Account, DomainError> {
        authorize(actor, Permission::CloseAccount)?;
        let employee_id = acting_employee(actor)?;
        let now = self.now();

        let mut tx = self.begin().await?;
        let result = self
            .confirm_closure_in(&mut tx, actor, employee_id, token, password, code, now)
            .await;
        let account = match finish(tx, "confirm_closure", result).await {
            Err(DomainError::InvalidOtp) => {
                self.discard_expired_pending(now).await;
                return Err(DomainError::InvalidOtp);
            }
            other => other?,
        };
        info!(account = %account.number, "account closed");
        Ok(account)
    }

    /// Best effort; a failure here must not mask the caller's error.
    async fn discard_expired_pending(&self, now: DateTime<Utc>) {
        let swept = async {
            let mut tx = self.begin().await?;
            let result = tx.delete_expired_pending(now).await.map_err(DomainError::from);
            finish(tx, "discard_expired_pending", result).await
        }
        .await;
        match swept {
            Ok(0) => {}
            Ok(swept) => info!(swept, "expired closure requests discarded"),
            Err(e) => warn!(error = %e, "failed to discard expired closure requests"),
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn confirm_closure_in(
        &self,
        tx: &mut S::Tx,
        actor: &Actor,
        employee_id: EmployeeId,
        token: Uuid,
        password: &str,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<Account, DomainError> {
        let pending = tx
            .pending(token)
            .await?
            .ok_or(DomainError::not_found("pending closure"))?;
        if !pending.belongs_to(employee_id) {
            return Err(DomainError::permission_denied(
                "closure was requested by another employee",
            ));
        }

        let principal = tx
            .principal(actor.principal_id)
            .await?
            .ok_or(DomainError::not_found("employee"))?;
        if !verify_password(password, &principal.password_hash)? {
            return Err(DomainError::InvalidCredentials {
                final_attempt: false,
            });
        }
        if !pending.otp.accepts(code, now) {
            return Err(DomainError::InvalidOtp);
        }

        let mut account = tx
            .lock_account(pending.account_id)
            .await?
            .ok_or(DomainError::not_found("account"))?;
        ensure_closable(&account)?;
        account.status = AccountStatus::Closed;
        tx.update_account(&account).await?;

        tx.insert_history(&AccountHistoryEntry::new(
            account.id,
            HistoryEvent::Closure,
            Some(employee_id),
            pending.reason.clone(),
            now,
        ))
        .await?;
        tx.append_audit(&AuditEntry::new(
            actor.principal_id,
            AuditAction::AccountClosed,
            now,
            format!("account {} closed: {}", account.number, pending.reason),
        ))
        .await?;
        tx.delete_pending(token).await?;
        Ok(account)
    }

    /// Managers register staff; the new employee reports to the manager.
    #[instrument(skip_all, fields(rank = %request.rank))]
    pub async fn register_employee(
        &self,
        actor: &Actor,
        request: RegisterEmployeeRequest,
    ) -> Result<RegisteredEmployee, DomainError> {
        authorize(actor, Permission::RegisterEmployee)?;
        let manager_id = acting_employee(actor)?;
        let now = self.now();
        let identity = request.identity.validate(now.date_naive())?;
        let issued = self.issue_password(request.password.as_deref())?;
        let password_hash = hash_password(&issued.plain)?;

        let mut tx = self.begin().await?;
        let result = async {
            ensure_unique(&mut tx, &identity).await?;
            let manager = tx
                .employee(manager_id)
                .await?
                .ok_or(DomainError::not_found("employee"))?;

            let principal = Principal::new(identity, password_hash, Role::Employee, true, now);
            let max_sequence = tx.max_employee_sequence().await?;
            let employee = Employee::new(
                principal.id,
                max_sequence,
                request.rank,
                Some(manager.id),
                manager.branch_id,
                now,
            );
            tx.insert_principal(&principal).await?;
            tx.insert_employee(&employee).await?;
            tx.append_audit(&AuditEntry::new(
                actor.principal_id,
                AuditAction::EmployeeRegistered,
                now,
                format!("employee {} registered as {}", employee.code, employee.rank),
            ))
            .await?;
            Ok::<_, DomainError>(employee)
        }
        .await;
        let employee = finish(tx, "register_employee", result).await?;

        info!(code = %employee.code, "employee registered");
        Ok(RegisteredEmployee {
            employee,
            issued_password: issued.generated.then_some(issued.plain),
        })
    }

    /// Direct reports of the calling employee.
    pub async fn subordinates(&self, actor: &Actor) -> Result<Vec<StaffMember>, DomainError> {
        authorize(actor, Permission::ViewSubordinates)?;
        let employee_id = acting_employee(actor)?;

        let mut tx = self.begin().await?;
        let result = async {
            let mut members = Vec::new();
            for employee in tx.subordinates(employee_id).await? {
                let principal = tx
                    .principal(employee.principal_id)
                    .await?
                    .ok_or_else(|| DomainError::consistency(format!("employee {} has no principal", employee.id)))?;
                members.push(StaffMember {
                    employee,
                    name: principal.name,
                    email: principal.email,
                });
            }
            Ok::<_, DomainError>(members)
        }
        .await;
        finish(tx, "subordinates", result).await
    }

    /// Create the default branch and root manager on an empty store.
    /// Returns `false` when a branch already exists.
    #[instrument(skip_all)]
    pub async fn seed(&self, manager: &IdentityInput, password: &str) -> Result<bool, DomainError> {
        let now = self.now();
        let identity = manager.validate(now.date_naive())?;
        check_strength(password, self.auth_policy.min_password_len)?;
        let password_hash = hash_password(password)?;

        let mut tx = self.begin().await?;
        let result = async {
            if tx.first_branch().await?.is_some() {
                return Ok(false);
            }
            let branch = Branch::new("0001", "Central")?;
            tx.insert_branch(&branch).await?;

            if tx.principal_by_national_id(&identity.national_id).await?.is_none() {
                let principal = Principal::new(identity, password_hash, Role::Employee, false, now);
                let max_sequence = tx.max_employee_sequence().await?;
                let employee = Employee::new(
                    principal.id,
                    max_sequence,
                    EmployeeRank::Manager,
                    None,
                    Some(branch.id),
                    now,
                );
                tx.insert_principal(&principal).await?;
                tx.insert_employee(&employee).await?;
                tx.append_audit(&AuditEntry::new(
                    principal.id,
                    AuditAction::EmployeeRegistered,
                    now,
                    format!("root manager {} seeded", employee.code),
                ))
                .await?;
            }
            Ok::<_, DomainError>(true)
        }
        .await;
        let seeded = finish(tx, "seed", result).await?;
        if seeded {
            info!("default branch and root manager created");
        }
        Ok(seeded)
    }

    fn issue_password(&self, supplied: Option<&str>) -> Result<IssuedPassword, DomainError> {
        match supplied {
            Some(plain) => {
                check_strength(plain, self.auth_policy.min_password_len)?;
                Ok(IssuedPassword {
                    plain: plain.to_string(),
                    generated: false,
                })
            }
            None => Ok(IssuedPassword {
                plain: generate_provisional(
                    &mut rand::thread_rng(),
                    self.auth_policy.provisional_password_len,
                ),
                generated: true,
            }),
        }
    }
}

fn acting_employee(actor: &Actor) -> Result<EmployeeId, DomainError> {
    actor
        .employee_id
        .ok_or_else(|| DomainError::permission_denied("staff session required"))
}

fn ensure_closable(account: &Account) -> Result<(), DomainError> {
    account.ensure_active()?;
    if !account.balance.is_zero() {
        return Err(DomainError::NonZeroBalance {
            balance: account.balance,
        });
    }
    Ok(())
}

async fn ensure_unique<U: UnitOfWork>(
    tx: &mut U,
    identity: &ValidatedIdentity,
) -> Result<(), DomainError> {
    if tx
        .principal_by_national_id(&identity.national_id)
        .await?
        .is_some()
    {
        return Err(DomainError::validation("national ID already registered"));
    }
    if tx.email_taken(&identity.email).await? {
        return Err(DomainError::validation("email already registered"));
    }
    Ok(())
}

async fn unused_number<U: UnitOfWork>(tx: &mut U) -> Result<AccountNumber, DomainError> {
    for _ in 0..MAX_NUMBER_ATTEMPTS {
        let candidate = AccountNumber::random(&mut rand::thread_rng());
        if !tx.account_number_exists(&candidate).await? {
            return Ok(candidate);
        }
    }
    Err(DomainError::consistency("could not allocate a free account number"))
}
