//! Accounts module (account kinds, ledger postings, policy rules).
//!
//! Pure domain logic only: no IO, no HTTP, no persistence concerns. The
//! infrastructure layer loads snapshots and window aggregates, asks this crate
//! for a decision, then persists the result atomically.

pub mod account;
pub mod branch;
pub mod credit;
pub mod history;
pub mod ledger;
pub mod number;
pub mod policy;
pub mod statement;
pub mod transaction;

pub use account::{
    Account, AccountKind, AccountStatus, AccountType, CheckingTerms, InvestmentTerms, RiskProfile,
    SavingsTerms,
};
pub use branch::Branch;
pub use credit::CreditProjection;
pub use history::{AccountHistoryEntry, HistoryEvent};
pub use ledger::{
    BalanceChange, OPENING_DEPOSIT_DESCRIPTION, Posting, plan_deposit, plan_opening_deposit,
    plan_transfer, plan_withdrawal,
};
pub use number::{AccountNumber, EmployeeCode};
pub use policy::{PolicyLimits, WithdrawalFee, month_start};
pub use statement::{
    DEFAULT_STATEMENT_LINES, ExportError, StatementExporter, StatementLine, StatementRange,
    build_statement,
};
pub use transaction::{RequestKey, TransactionKind, TransactionRecord};
