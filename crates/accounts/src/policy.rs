//! Policy evaluator.
//!
//! Stateless rule functions over an account snapshot and the aggregates the
//! caller computed from the transaction log. Each check returns `Ok(())` or the
//! typed denial; nothing here reads or writes storage.

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use malvader_core::{DomainError, Money};

use crate::account::Account;

/// Thresholds applied by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyLimits {
    /// Ceiling on deposits into one account within `deposit_window_hours`.
    pub deposit_ceiling: Money,
    pub deposit_window_hours: i64,
    /// Withdrawals per calendar month before the overage fee applies.
    pub free_withdrawals_per_month: u32,
    pub withdrawal_fee: Money,
}

impl Default for PolicyLimits {
    fn default() -> Self {
        Self {
            deposit_ceiling: Money::from_units(10_000),
            deposit_window_hours: 24,
            free_withdrawals_per_month: 5,
            withdrawal_fee: Money::from_units(5),
        }
    }
}

/// Outcome of the monthly withdrawal quota check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalFee {
    pub applies: bool,
    pub amount: Money,
}

impl WithdrawalFee {
    pub const NONE: Self = Self {
        applies: false,
        amount: Money::ZERO,
    };
}

impl PolicyLimits {
    /// First instant of the trailing deposit window ending at `now`.
    pub fn deposit_window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::hours(self.deposit_window_hours)
    }

    /// Reject amounts that are zero or negative.
    pub fn check_amount(&self, amount: Money) -> Result<(), DomainError> {
        if !amount.is_positive() {
            return Err(DomainError::InvalidAmount);
        }
        Ok(())
    }

    pub fn check_minimum_deposit(&self, account: &Account, amount: Money) -> Result<(), DomainError> {
        match account.kind.minimum_deposit() {
            Some(minimum) if amount < minimum => Err(DomainError::BelowMinimum { minimum }),
            _ => Ok(()),
        }
    }

    /// `deposited_in_window` is the sum of deposits into the account since
    /// `deposit_window_start(now)`.
    pub fn check_deposit_ceiling(
        &self,
        deposited_in_window: Money,
        amount: Money,
    ) -> Result<(), DomainError> {
        if checked_total(deposited_in_window, amount)? > self.deposit_ceiling {
            return Err(DomainError::DailyLimitExceeded {
                limit: self.deposit_ceiling,
            });
        }
        Ok(())
    }

    /// Fee owed by the next withdrawal given how many were already made
    /// this calendar month.
    pub fn withdrawal_fee(&self, withdrawals_this_month: u32) -> WithdrawalFee {
        if withdrawals_this_month >= self.free_withdrawals_per_month {
            WithdrawalFee {
                applies: true,
                amount: self.withdrawal_fee,
            }
        } else {
            WithdrawalFee::NONE
        }
    }

    /// Overdraft-aware availability for a withdrawal plus its fee.
    pub fn check_available(
        &self,
        account: &Account,
        amount: Money,
        fee: WithdrawalFee,
    ) -> Result<(), DomainError> {
        if account.available_funds() < checked_total(amount, fee.amount)? {
            return Err(DomainError::InsufficientFunds);
        }
        Ok(())
    }

    /// Transfers are funded from the balance alone; overdraft is not consulted.
    pub fn check_transfer_funds(&self, source: &Account, amount: Money) -> Result<(), DomainError> {
        if source.balance < amount {
            return Err(DomainError::InsufficientFunds);
        }
        Ok(())
    }
}

/// `a + b`, or a validation error when the sum leaves the representable range.
pub(crate) fn checked_total(a: Money, b: Money) -> Result<Money, DomainError> {
    a.checked_add(b)
        .ok_or_else(|| DomainError::validation("amount is outside the supported range"))
}

/// First instant of the UTC calendar month containing `now`.
pub fn month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::{AccountKind, CheckingTerms, InvestmentTerms, RiskProfile};
    use crate::number::AccountNumber;
    use malvader_core::{BranchId, CustomerId};
    use rust_decimal_macros::dec;

    fn account(kind: AccountKind, balance: Money) -> Account {
        let mut account = Account::open(
            AccountNumber::from_base(654_321).unwrap(),
            kind,
            CustomerId::new(),
            BranchId::new(),
            Utc::now(),
        )
        .unwrap();
        account.balance = balance;
        account
    }

    fn checking(limit: Money) -> AccountKind {
        AccountKind::Checking(CheckingTerms {
            overdraft_limit: limit,
            maintenance_fee: Money::ZERO,
        })
    }

    #[test]
    fn deposit_ceiling_is_inclusive() {
        let limits = PolicyLimits::default();
        let already = Money::from_units(9_000);
        assert!(limits.check_deposit_ceiling(already, Money::from_units(1_000)).is_ok());
        assert_eq!(
            limits.check_deposit_ceiling(already, Money::from_cents(100_001)),
            Err(DomainError::DailyLimitExceeded {
                limit: Money::from_units(10_000)
            })
        );
    }

    #[test]
    fn oversized_amounts_are_rejected_not_summed() {
        let limits = PolicyLimits::default();
        let max = Money::new(malvader_core::money::MONEY_MAX).unwrap();
        let err = limits.check_deposit_ceiling(Money::from_units(1), max).unwrap_err();
        assert_eq!(err.kind(), malvader_core::ErrorKind::Validation);

        let acc = account(checking(Money::ZERO), Money::from_units(100));
        let err = limits.check_available(&acc, max, limits.withdrawal_fee(5)).unwrap_err();
        assert_eq!(err.kind(), malvader_core::ErrorKind::Validation);
    }

    #[test]
    fn sixth_withdrawal_pays_the_fee() {
        let limits = PolicyLimits::default();
        assert_eq!(limits.withdrawal_fee(4), WithdrawalFee::NONE);
        let fee = limits.withdrawal_fee(5);
        assert!(fee.applies);
        assert_eq!(fee.amount, Money::from_units(5));
    }

    #[test]
    fn overdraft_extends_availability_to_the_cent() {
        let limits = PolicyLimits::default();
        let acc = account(checking(Money::from_units(200)), Money::from_units(100));
        assert!(limits.check_available(&acc, Money::from_units(300), WithdrawalFee::NONE).is_ok());
        assert_eq!(
            limits.check_available(&acc, Money::from_cents(30_001), WithdrawalFee::NONE),
            Err(DomainError::InsufficientFunds)
        );
        // Transfers ignore the overdraft.
        assert_eq!(
            limits.check_transfer_funds(&acc, Money::from_units(150)),
            Err(DomainError::InsufficientFunds)
        );
    }

    #[test]
    fn fee_counts_against_availability() {
        let limits = PolicyLimits::default();
        let acc = account(checking(Money::ZERO), Money::from_units(100));
        let fee = limits.withdrawal_fee(5);
        assert!(limits.check_available(&acc, Money::from_units(95), fee).is_ok());
        assert!(limits.check_available(&acc, Money::from_units(96), fee).is_err());
    }

    #[test]
    fn investment_minimum() {
        let limits = PolicyLimits::default();
        let acc = account(
            AccountKind::Investment(InvestmentTerms {
                risk_profile: RiskProfile::Medium,
                minimum_deposit: Money::from_units(1_000),
                base_yield_rate: dec!(0.01),
            }),
            Money::ZERO,
        );
        assert!(matches!(
            limits.check_minimum_deposit(&acc, Money::from_units(999)),
            Err(DomainError::BelowMinimum { .. })
        ));
        assert!(limits.check_minimum_deposit(&acc, Money::from_units(1_000)).is_ok());
    }

    #[test]
    fn windows() {
        let now = Utc.with_ymd_and_hms(2025, 3, 17, 15, 30, 0).unwrap();
        assert_eq!(month_start(now), Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap());
        assert_eq!(
            PolicyLimits::default().deposit_window_start(now),
            Utc.with_ymd_and_hms(2025, 3, 16, 15, 30, 0).unwrap()
        );
    }
}
