//! Deposits, withdrawals and transfers.

use tracing::{info, instrument};

use malvader_accounts::{
    Account, AccountNumber, Posting, RequestKey, TransactionRecord, WithdrawalFee, month_start,
    plan_deposit, plan_transfer, plan_withdrawal,
};
use malvader_auth::{Actor, ensure_owner};
use malvader_core::{DomainError, Money};

use super::{BankService, finish};
use crate::store::{BankStore, UnitOfWork};

/// Outcome of a money movement, seen from the account the caller addressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub account: Account,
    pub records: Vec<TransactionRecord>,
    pub fee: WithdrawalFee,
}

impl<S: BankStore> BankService<S> {
    #[instrument(skip_all, fields(account = %number, amount = %amount))]
    pub async fn deposit(
        &self,
        actor: &Actor,
        number: &AccountNumber,
        amount: Money,
        request_key: Option<&RequestKey>,
    ) -> Result<Receipt, DomainError> {
        let mut tx = self.begin().await?;
        let result = self.deposit_in(&mut tx, actor, number, amount, request_key).await;
        finish(tx, "deposit", result).await
    }

    async fn deposit_in(
        &self,
        tx: &mut S::Tx,
        actor: &Actor,
        number: &AccountNumber,
        amount: Money,
        request_key: Option<&RequestKey>,
    ) -> Result<Receipt, DomainError> {
        let now = self.now();
        let mut account = owned_account(tx, actor, number).await?;
        claim(tx, request_key, now).await?;

        let window_start = self.limits.deposit_window_start(now);
        let deposited = tx.deposits_since(account.id, window_start).await?;
        let posting = plan_deposit(&self.limits, &account, amount, deposited, now)?;

        post(tx, &posting, &mut [&mut account]).await?;
        info!(balance = %account.balance, "deposit posted");
        Ok(Receipt {
            account,
            records: posting.records,
            fee: posting.fee,
        })
    }

    #[instrument(skip_all, fields(account = %number, amount = %amount))]
    pub async fn withdraw(
        &self,
        actor: &Actor,
        number: &AccountNumber,
        amount: Money,
        request_key: Option<&RequestKey>,
    ) -> Result<Receipt, DomainError> {
        let mut tx = self.begin().await?;
        let result = self.withdraw_in(&mut tx, actor, number, amount, request_key).await;
        finish(tx, "withdraw", result).await
    }

    async fn withdraw_in(
        &self,
        tx: &mut S::Tx,
        actor: &Actor,
        number: &AccountNumber,
        amount: Money,
        request_key: Option<&RequestKey>,
    ) -> Result<Receipt, DomainError> {
        let now = self.now();
        let mut account = owned_account(tx, actor, number).await?;
        claim(tx, request_key, now).await?;

        let withdrawals = tx.withdrawals_since(account.id, month_start(now)).await?;
        let posting = plan_withdrawal(&self.limits, &account, amount, withdrawals, now)?;

        post(tx, &posting, &mut [&mut account]).await?;
        info!(balance = %account.balance, fee = %posting.fee.amount, "withdrawal posted");
        Ok(Receipt {
            account,
            records: posting.records,
            fee: posting.fee,
        })
    }

    /// Move `amount` from the caller's `source` account to the account
    /// numbered `destination`. Overdraft is not available for transfers.
    #[instrument(skip_all, fields(source = %source, destination = %destination, amount = %amount))]
    pub async fn transfer(
        &self,
        actor: &Actor,
        source: &AccountNumber,
        destination: &AccountNumber,
        amount: Money,
        request_key: Option<&RequestKey>,
    ) -> Result<Receipt, DomainError> {
        let mut tx = self.begin().await?;
        let result = self
            .transfer_in(&mut tx, actor, source, destination, amount, request_key)
            .await;
        finish(tx, "transfer", result).await
    }

    async fn transfer_in(
        &self,
        tx: &mut S::Tx,
        actor: &Actor,
        source: &AccountNumber,
        destination: &AccountNumber,
        amount: Money,
        request_key: Option<&RequestKey>,
    ) -> Result<Receipt, DomainError> {
        let now = self.now();
        let source_snapshot = tx
            .account_by_number(source)
            .await?
            .ok_or(DomainError::not_found("account"))?;
        ensure_owner(actor, source_snapshot.customer_id)?;
        let destination_id = tx.account_by_number(destination).await?.map(|a| a.id);

        // Row locks are always taken in ascending id order.
        let (mut source_account, mut destination_account) = match destination_id {
            Some(dest_id) if dest_id < source_snapshot.id => {
                let dest = lock(tx, dest_id).await?;
                let src = lock(tx, source_snapshot.id).await?;
                (src, Some(dest))
            }
            Some(dest_id) if dest_id > source_snapshot.id => {
                let src = lock(tx, source_snapshot.id).await?;
                let dest = lock(tx, dest_id).await?;
                (src, Some(dest))
            }
            Some(_) => {
                let src = lock(tx, source_snapshot.id).await?;
                (src.clone(), Some(src))
            }
            None => (lock(tx, source_snapshot.id).await?, None),
        };

        claim(tx, request_key, now).await?;
        let posting = plan_transfer(
            &self.limits,
            &source_account,
            destination_account.as_ref(),
            amount,
            now,
        )?;

        match destination_account.as_mut() {
            Some(dest) => post(tx, &posting, &mut [&mut source_account, dest]).await?,
            None => post(tx, &posting, &mut [&mut source_account]).await?,
        }
        info!(balance = %source_account.balance, "transfer posted");
        Ok(Receipt {
            account: source_account,
            records: posting.records,
            fee: posting.fee,
        })
    }
}

/// Resolve `number`, check the caller owns it, then lock the row.
async fn owned_account<U: UnitOfWork>(
    tx: &mut U,
    actor: &Actor,
    number: &AccountNumber,
) -> Result<Account, DomainError> {
    let snapshot = tx
        .account_by_number(number)
        .await?
        .ok_or(DomainError::not_found("account"))?;
    ensure_owner(actor, snapshot.customer_id)?;
    lock(tx, snapshot.id).await
}

async fn lock<U: UnitOfWork>(
    tx: &mut U,
    id: malvader_core::AccountId,
) -> Result<Account, DomainError> {
    tx.lock_account(id)
        .await?
        .ok_or(DomainError::not_found("account"))
}

async fn claim<U: UnitOfWork>(
    tx: &mut U,
    key: Option<&RequestKey>,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<(), DomainError> {
    if let Some(key) = key {
        if !tx.claim_request_key(key, now).await? {
            return Err(DomainError::DuplicateRequest);
        }
    }
    Ok(())
}

/// Apply `posting` to the locked snapshots and stage every write.
async fn post<U: UnitOfWork>(
    tx: &mut U,
    posting: &Posting,
    accounts: &mut [&mut Account],
) -> Result<(), DomainError> {
    for account in accounts.iter_mut() {
        posting.apply(account);
        tx.update_account(account).await?;
    }
    for record in &posting.records {
        tx.insert_transaction(record).await?;
    }
    Ok(())
}
