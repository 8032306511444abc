use core::fmt;
use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use malvader_core::{AccountId, DomainError, Entity, Money, TransactionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Deposit,
    Withdrawal,
    Transfer,
    Fee,
    /// Reserved for interest credits; never produced by the ledger.
    Yield,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Deposit => "deposit",
            TransactionKind::Withdrawal => "withdrawal",
            TransactionKind::Transfer => "transfer",
            TransactionKind::Fee => "fee",
            TransactionKind::Yield => "yield",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deposit" => Ok(TransactionKind::Deposit),
            "withdrawal" => Ok(TransactionKind::Withdrawal),
            "transfer" => Ok(TransactionKind::Transfer),
            "fee" => Ok(TransactionKind::Fee),
            "yield" => Ok(TransactionKind::Yield),
            other => Err(DomainError::validation(format!("unknown transaction kind '{other}'"))),
        }
    }
}

/// Immutable ledger record. Never updated or deleted once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: TransactionId,
    pub kind: TransactionKind,
    /// Always positive; direction comes from source/destination.
    pub amount: Money,
    pub occurred_at: DateTime<Utc>,
    pub description: String,
    pub source: Option<AccountId>,
    pub destination: Option<AccountId>,
}

impl TransactionRecord {
    pub fn deposit(
        destination: AccountId,
        amount: Money,
        occurred_at: DateTime<Utc>,
        description: impl Into<String>,
    ) -> Self {
        Self::build(TransactionKind::Deposit, amount, occurred_at, description, None, Some(destination))
    }

    pub fn withdrawal(
        source: AccountId,
        amount: Money,
        occurred_at: DateTime<Utc>,
        description: impl Into<String>,
    ) -> Self {
        Self::build(TransactionKind::Withdrawal, amount, occurred_at, description, Some(source), None)
    }

    pub fn fee(
        source: AccountId,
        amount: Money,
        occurred_at: DateTime<Utc>,
        description: impl Into<String>,
    ) -> Self {
        Self::build(TransactionKind::Fee, amount, occurred_at, description, Some(source), None)
    }

    pub fn transfer(
        source: AccountId,
        destination: AccountId,
        amount: Money,
        occurred_at: DateTime<Utc>,
        description: impl Into<String>,
    ) -> Self {
        Self::build(
            TransactionKind::Transfer,
            amount,
            occurred_at,
            description,
            Some(source),
            Some(destination),
        )
    }

    fn build(
        kind: TransactionKind,
        amount: Money,
        occurred_at: DateTime<Utc>,
        description: impl Into<String>,
        source: Option<AccountId>,
        destination: Option<AccountId>,
    ) -> Self {
        Self {
            id: TransactionId::new(),
            kind,
            amount,
            occurred_at,
            description: description.into(),
            source,
            destination,
        }
    }

    pub fn touches(&self, account: AccountId) -> bool {
        self.source == Some(account) || self.destination == Some(account)
    }

    /// Effect of this record on `account`'s balance: positive when the
    /// account receives the money, negative when it pays, zero otherwise.
    pub fn signed_amount_for(&self, account: AccountId) -> Money {
        if self.destination == Some(account) {
            self.amount
        } else if self.source == Some(account) {
            -self.amount
        } else {
            Money::ZERO
        }
    }
}

impl Entity for TransactionRecord {
    type Id = TransactionId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Client-supplied idempotency token for a money-movement request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RequestKey(String);

impl RequestKey {
    const MAX_LEN: usize = 128;

    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(DomainError::validation("request key cannot be empty"));
        }
        if trimmed.len() > Self::MAX_LEN {
            return Err(DomainError::validation("request key is too long"));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RequestKey {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RequestKey> for String {
    fn from(value: RequestKey) -> Self {
        value.0
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_is_signed_per_side() {
        let a = AccountId::new();
        let b = AccountId::new();
        let record = TransactionRecord::transfer(a, b, Money::from_units(30), Utc::now(), "t");
        assert_eq!(record.signed_amount_for(a), Money::from_units(-30));
        assert_eq!(record.signed_amount_for(b), Money::from_units(30));
        assert_eq!(record.signed_amount_for(AccountId::new()), Money::ZERO);
        assert!(record.touches(a) && record.touches(b));
    }

    #[test]
    fn fee_debits_its_source() {
        let a = AccountId::new();
        let fee = TransactionRecord::fee(a, Money::from_units(5), Utc::now(), "fee");
        assert_eq!(fee.kind, TransactionKind::Fee);
        assert_eq!(fee.destination, None);
        assert_eq!(fee.signed_amount_for(a), Money::from_units(-5));
    }

    #[test]
    fn blank_request_keys_are_rejected() {
        assert!(RequestKey::new("   ").is_err());
        assert_eq!(RequestKey::new(" abc ").unwrap().as_str(), "abc");
        assert!(RequestKey::new("x".repeat(129)).is_err());
    }
}
