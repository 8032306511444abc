use core::fmt;
use core::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use malvader_core::{AccountId, BranchId, CustomerId, DomainError, Entity, Money};

use crate::number::AccountNumber;

/// Account kind tag, as stored and as accepted on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    Savings,
    Checking,
    Investment,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Savings => "savings",
            AccountType::Checking => "checking",
            AccountType::Investment => "investment",
        }
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "savings" => Ok(AccountType::Savings),
            "checking" => Ok(AccountType::Checking),
            "investment" => Ok(AccountType::Investment),
            other => Err(DomainError::validation(format!("unknown account type '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskProfile {
    Low,
    Medium,
    High,
}

impl RiskProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskProfile::Low => "low",
            RiskProfile::Medium => "medium",
            RiskProfile::High => "high",
        }
    }
}

impl FromStr for RiskProfile {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(RiskProfile::Low),
            "medium" => Ok(RiskProfile::Medium),
            "high" => Ok(RiskProfile::High),
            other => Err(DomainError::validation(format!("unknown risk profile '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckingTerms {
    pub overdraft_limit: Money,
    pub maintenance_fee: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavingsTerms {
    /// Monthly rate as a fraction (0.005 = 0.5 %).
    pub yield_rate: Decimal,
    pub last_yield_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvestmentTerms {
    pub risk_profile: RiskProfile,
    pub minimum_deposit: Money,
    pub base_yield_rate: Decimal,
}

/// Kind of an account together with its kind-specific terms.
///
/// Fixed at creation; the ledger asks for capabilities (`overdraft_limit`,
/// `minimum_deposit`) instead of matching on the kind itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AccountKind {
    Savings(SavingsTerms),
    Checking(CheckingTerms),
    Investment(InvestmentTerms),
}

impl AccountKind {
    pub fn account_type(&self) -> AccountType {
        match self {
            AccountKind::Savings(_) => AccountType::Savings,
            AccountKind::Checking(_) => AccountType::Checking,
            AccountKind::Investment(_) => AccountType::Investment,
        }
    }

    /// Amount the balance may dip below zero. Zero for every non-checking kind.
    pub fn overdraft_limit(&self) -> Money {
        match self {
            AccountKind::Checking(terms) => terms.overdraft_limit,
            _ => Money::ZERO,
        }
    }

    /// Minimum accepted single deposit, if the kind imposes one.
    pub fn minimum_deposit(&self) -> Option<Money> {
        match self {
            AccountKind::Investment(terms) => Some(terms.minimum_deposit),
            _ => None,
        }
    }

    /// Reject negative amounts and rates.
    pub fn validate(&self) -> Result<(), DomainError> {
        match self {
            AccountKind::Checking(terms) => {
                non_negative_money("overdraft limit", terms.overdraft_limit)?;
                non_negative_money("maintenance fee", terms.maintenance_fee)
            }
            AccountKind::Savings(terms) => non_negative_rate("yield rate", terms.yield_rate),
            AccountKind::Investment(terms) => {
                non_negative_money("minimum deposit", terms.minimum_deposit)?;
                non_negative_rate("base yield rate", terms.base_yield_rate)
            }
        }
    }
}

fn non_negative_money(field: &str, value: Money) -> Result<(), DomainError> {
    if value.is_negative() {
        return Err(DomainError::validation(format!("{field} cannot be negative")));
    }
    Ok(())
}

fn non_negative_rate(field: &str, value: Decimal) -> Result<(), DomainError> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(DomainError::validation(format!("{field} cannot be negative")));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Active,
    Closed,
    Blocked,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Closed => "closed",
            AccountStatus::Blocked => "blocked",
        }
    }
}

impl FromStr for AccountStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(AccountStatus::Active),
            "closed" => Ok(AccountStatus::Closed),
            "blocked" => Ok(AccountStatus::Blocked),
            other => Err(DomainError::validation(format!("unknown account status '{other}'"))),
        }
    }
}

/// Account snapshot as loaded inside a unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub number: AccountNumber,
    pub balance: Money,
    pub kind: AccountKind,
    pub status: AccountStatus,
    pub customer_id: CustomerId,
    pub branch_id: BranchId,
    pub opened_at: DateTime<Utc>,
}

impl Account {
    /// A freshly opened, active account with zero balance.
    pub fn open(
        number: AccountNumber,
        kind: AccountKind,
        customer_id: CustomerId,
        branch_id: BranchId,
        opened_at: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        kind.validate()?;
        Ok(Self {
            id: AccountId::new(),
            number,
            balance: Money::ZERO,
            kind,
            status: AccountStatus::Active,
            customer_id,
            branch_id,
            opened_at,
        })
    }

    pub fn ensure_active(&self) -> Result<(), DomainError> {
        if self.status != AccountStatus::Active {
            return Err(DomainError::AccountNotActive);
        }
        Ok(())
    }

    /// Balance plus whatever overdraft the kind grants.
    pub fn available_funds(&self) -> Money {
        self.balance + self.kind.overdraft_limit()
    }

    pub fn account_type(&self) -> AccountType {
        self.kind.account_type()
    }
}

impl Entity for Account {
    type Id = AccountId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
