//! Ledger engine decisions.
//!
//! Each `plan_*` function validates an operation against account snapshots
//! and window aggregates and returns the `Posting` to persist. The caller
//! applies the posting and writes its records inside one unit of work, so a
//! rejected plan never leaves a partial write behind.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use malvader_core::{AccountId, DomainError, Money};

use crate::account::Account;
use crate::policy::{PolicyLimits, WithdrawalFee, checked_total};
use crate::transaction::TransactionRecord;

pub const OPENING_DEPOSIT_DESCRIPTION: &str = "Opening deposit";

/// Balance change for one account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceChange {
    pub account_id: AccountId,
    pub delta: Money,
}

/// Result of a successful plan: balance changes plus the records to append.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub changes: Vec<BalanceChange>,
    pub records: Vec<TransactionRecord>,
    pub fee: WithdrawalFee,
}

impl Posting {
    /// Net change for `account_id` (zero when the posting does not touch it).
    pub fn delta_for(&self, account_id: AccountId) -> Money {
        self.changes
            .iter()
            .filter(|c| c.account_id == account_id)
            .map(|c| c.delta)
            .sum()
    }

    /// Apply the balance changes to a loaded snapshot.
    pub fn apply(&self, account: &mut Account) {
        account.balance += self.delta_for(account.id);
    }
}

/// Deposit into `account`. `deposited_in_window` is the sum of deposits into
/// the account within the trailing window.
pub fn plan_deposit(
    limits: &PolicyLimits,
    account: &Account,
    amount: Money,
    deposited_in_window: Money,
    now: DateTime<Utc>,
) -> Result<Posting, DomainError> {
    limits.check_amount(amount)?;
    account.ensure_active()?;
    limits.check_minimum_deposit(account, amount)?;
    limits.check_deposit_ceiling(deposited_in_window, amount)?;
    checked_total(account.balance, amount)?;

    Ok(Posting {
        changes: vec![BalanceChange {
            account_id: account.id,
            delta: amount,
        }],
        records: vec![TransactionRecord::deposit(account.id, amount, now, "Deposit")],
        fee: WithdrawalFee::NONE,
    })
}

/// Funding recorded when an account is opened. Exempt from the deposit
/// ceiling and the investment minimum.
pub fn plan_opening_deposit(
    account: &Account,
    amount: Money,
    now: DateTime<Utc>,
) -> Result<Posting, DomainError> {
    if !amount.is_positive() {
        return Err(DomainError::InvalidAmount);
    }
    Ok(Posting {
        changes: vec![BalanceChange {
            account_id: account.id,
            delta: amount,
        }],
        records: vec![TransactionRecord::deposit(
            account.id,
            amount,
            now,
            OPENING_DEPOSIT_DESCRIPTION,
        )],
        fee: WithdrawalFee::NONE,
    })
}

/// Withdraw from `account`. `withdrawals_this_month` counts withdrawals
/// sourced from the account since the start of the current calendar month.
pub fn plan_withdrawal(
    limits: &PolicyLimits,
    account: &Account,
    amount: Money,
    withdrawals_this_month: u32,
    now: DateTime<Utc>,
) -> Result<Posting, DomainError> {
    limits.check_amount(amount)?;
    account.ensure_active()?;
    limits.check_available(account, amount, WithdrawalFee::NONE)?;

    let fee = limits.withdrawal_fee(withdrawals_this_month);
    limits.check_available(account, amount, fee)?;

    let mut records = Vec::with_capacity(2);
    if fee.applies {
        records.push(TransactionRecord::withdrawal(
            account.id,
            amount,
            now,
            format!("Withdrawal (fee of {} applied)", fee.amount),
        ));
        records.push(TransactionRecord::fee(
            account.id,
            fee.amount,
            now,
            "Excess withdrawal fee",
        ));
    } else {
        records.push(TransactionRecord::withdrawal(account.id, amount, now, "Withdrawal"));
    }

    Ok(Posting {
        changes: vec![BalanceChange {
            account_id: account.id,
            delta: -checked_total(amount, fee.amount)?,
        }],
        records,
        fee,
    })
}

/// Transfer from `source` to `destination`. `destination` is `None` when no
/// account carries the requested number.
pub fn plan_transfer(
    limits: &PolicyLimits,
    source: &Account,
    destination: Option<&Account>,
    amount: Money,
    now: DateTime<Utc>,
) -> Result<Posting, DomainError> {
    limits.check_amount(amount)?;
    let destination = destination.ok_or(DomainError::DestinationNotFound)?;
    if destination.id == source.id {
        return Err(DomainError::SelfTransfer);
    }
    source.ensure_active()?;
    destination.ensure_active()?;
    limits.check_transfer_funds(source, amount)?;
    checked_total(destination.balance, amount)?;

    Ok(Posting {
        changes: vec![
            BalanceChange {
                account_id: source.id,
                delta: -amount,
            },
            BalanceChange {
                account_id: destination.id,
                delta: amount,
            },
        ],
        records: vec![TransactionRecord::transfer(
            source.id,
            destination.id,
            amount,
            now,
            format!("Transfer to {}", destination.number),
        )],
        fee: WithdrawalFee::NONE,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::{
        AccountKind, AccountStatus, CheckingTerms, InvestmentTerms, RiskProfile, SavingsTerms,
    };
    use crate::number::AccountNumber;
    use crate::policy::month_start;
    use crate::transaction::TransactionKind;
    use chrono::{Duration, TimeZone};
    use malvader_core::{BranchId, CustomerId};
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 20, 14, 0, 0).unwrap()
    }

    fn account(base: u32, kind: AccountKind) -> Account {
        Account::open(
            AccountNumber::from_base(base).unwrap(),
            kind,
            CustomerId::new(),
            BranchId::new(),
            now(),
        )
        .unwrap()
    }

    fn checking(base: u32, limit: i64) -> Account {
        account(
            base,
            AccountKind::Checking(CheckingTerms {
                overdraft_limit: Money::from_units(limit),
                maintenance_fee: Money::ZERO,
            }),
        )
    }

    fn savings(base: u32) -> Account {
        account(
            base,
            AccountKind::Savings(SavingsTerms {
                yield_rate: dec!(0.005),
                last_yield_at: None,
            }),
        )
    }

    #[test]
    fn deposit_rejects_non_positive_amounts() {
        let acc = savings(111_111);
        let limits = PolicyLimits::default();
        for amount in [Money::ZERO, Money::from_units(-10)] {
            assert_eq!(
                plan_deposit(&limits, &acc, amount, Money::ZERO, now()),
                Err(DomainError::InvalidAmount)
            );
        }
    }

    #[test]
    fn deposit_below_investment_minimum() {
        let acc = account(
            222_222,
            AccountKind::Investment(InvestmentTerms {
                risk_profile: RiskProfile::Low,
                minimum_deposit: Money::from_units(500),
                base_yield_rate: dec!(0.008),
            }),
        );
        let err = plan_deposit(&PolicyLimits::default(), &acc, Money::from_units(100), Money::ZERO, now())
            .unwrap_err();
        assert_eq!(err, DomainError::BelowMinimum { minimum: Money::from_units(500) });
    }

    #[test]
    fn deposit_of_the_largest_amount_fails_without_panicking() {
        let acc = savings(121_212);
        let huge = Money::new(malvader_core::money::MONEY_MAX).unwrap();
        let err = plan_deposit(&PolicyLimits::default(), &acc, huge, Money::from_units(1), now())
            .unwrap_err();
        assert_eq!(err.kind(), malvader_core::ErrorKind::Validation);
        assert!(Money::parse("79228162514264337593543950335").is_err());
    }

    #[test]
    fn deposit_that_would_leave_the_balance_range_is_rejected() {
        let mut acc = savings(131_313);
        acc.balance = Money::new(malvader_core::money::MONEY_MAX).unwrap();
        let limits = PolicyLimits {
            deposit_ceiling: acc.balance,
            ..PolicyLimits::default()
        };
        let err = plan_deposit(&limits, &acc, Money::from_units(1), Money::ZERO, now()).unwrap_err();
        assert_eq!(err.kind(), malvader_core::ErrorKind::Validation);
    }

    #[test]
    fn withdrawal_within_overdraft_goes_negative() {
        let mut acc = checking(333_333, 200);
        acc.balance = Money::from_units(50);
        let posting =
            plan_withdrawal(&PolicyLimits::default(), &acc, Money::from_units(250), 0, now()).unwrap();
        posting.apply(&mut acc);
        assert_eq!(acc.balance, Money::from_units(-200));
        assert_eq!(posting.records.len(), 1);
    }

    #[test]
    fn sixth_withdrawal_writes_a_fee_record() {
        let mut acc = savings(444_444);
        acc.balance = Money::from_units(100);
        let posting =
            plan_withdrawal(&PolicyLimits::default(), &acc, Money::from_units(10), 5, now()).unwrap();
        assert!(posting.fee.applies);
        let kinds: Vec<_> = posting.records.iter().map(|r| r.kind).collect();
        assert_eq!(kinds, vec![TransactionKind::Withdrawal, TransactionKind::Fee]);
        assert!(posting.records[0].description.contains("5.00"));
        posting.apply(&mut acc);
        assert_eq!(acc.balance, Money::from_units(85));
    }

    #[test]
    fn transfer_checks_in_order() {
        let limits = PolicyLimits::default();
        let mut source = checking(555_555, 1_000);
        source.balance = Money::from_units(100);
        let dest = savings(666_666);

        assert_eq!(
            plan_transfer(&limits, &source, None, Money::from_units(10), now()),
            Err(DomainError::DestinationNotFound)
        );
        assert_eq!(
            plan_transfer(&limits, &source, Some(&source), Money::from_units(10), now()),
            Err(DomainError::SelfTransfer)
        );
        assert_eq!(
            plan_transfer(&limits, &source, Some(&dest), Money::from_units(101), now()),
            Err(DomainError::InsufficientFunds)
        );

        let posting = plan_transfer(&limits, &source, Some(&dest), Money::from_units(40), now()).unwrap();
        assert_eq!(posting.delta_for(source.id), Money::from_units(-40));
        assert_eq!(posting.delta_for(dest.id), Money::from_units(40));
        assert_eq!(posting.records[0].description, format!("Transfer to {}", dest.number));
    }

    #[test]
    fn closed_destination_rejects_transfers() {
        let limits = PolicyLimits::default();
        let mut source = savings(777_777);
        source.balance = Money::from_units(100);
        let mut dest = savings(888_888);
        dest.status = AccountStatus::Closed;
        assert_eq!(
            plan_transfer(&limits, &source, Some(&dest), Money::from_units(1), now()),
            Err(DomainError::AccountNotActive)
        );
    }

    #[derive(Debug, Clone)]
    enum Op {
        Deposit(i64),
        Withdraw(i64),
        TransferOut(i64),
        TransferIn(i64),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (1i64..600_000).prop_map(Op::Deposit),
            (1i64..300_000).prop_map(Op::Withdraw),
            (1i64..300_000).prop_map(Op::TransferOut),
            (1i64..300_000).prop_map(Op::TransferIn),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Balance always equals the opening balance plus the signed sum of
        /// every record that touched the account, fees included.
        #[test]
        fn balance_matches_signed_record_sum(
            ops in prop::collection::vec((op(), 0i64..180), 1..40),
            overdraft in 0i64..2_000,
        ) {
            let limits = PolicyLimits::default();
            let mut acc = checking(123_456, overdraft);
            let mut other = savings(654_321);
            other.balance = Money::from_units(1_000_000);
            let opening = acc.balance;
            let mut log: Vec<TransactionRecord> = Vec::new();
            let mut at = now();

            for (op, minutes) in ops {
                at += Duration::minutes(minutes);
                let window_start = limits.deposit_window_start(at);
                let deposited: Money = log
                    .iter()
                    .filter(|r| r.kind == TransactionKind::Deposit
                        && r.destination == Some(acc.id)
                        && r.occurred_at >= window_start)
                    .map(|r| r.amount)
                    .sum();
                let month = month_start(at);
                let withdrawals = log
                    .iter()
                    .filter(|r| r.kind == TransactionKind::Withdrawal
                        && r.source == Some(acc.id)
                        && r.occurred_at >= month)
                    .count() as u32;

                let planned = match op {
                    Op::Deposit(c) => plan_deposit(&limits, &acc, Money::from_cents(c), deposited, at),
                    Op::Withdraw(c) => plan_withdrawal(&limits, &acc, Money::from_cents(c), withdrawals, at),
                    Op::TransferOut(c) => plan_transfer(&limits, &acc, Some(&other), Money::from_cents(c), at),
                    Op::TransferIn(c) => plan_transfer(&limits, &other, Some(&acc), Money::from_cents(c), at),
                };
                if let Ok(posting) = planned {
                    posting.apply(&mut acc);
                    posting.apply(&mut other);
                    log.extend(posting.records);
                }

                prop_assert!(acc.balance >= -Money::from_units(overdraft));
                let signed: Money = log.iter().map(|r| r.signed_amount_for(acc.id)).sum();
                prop_assert_eq!(acc.balance, opening + signed);
            }
        }
    }
}
