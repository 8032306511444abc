//! `malvader-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, money, the error taxonomy and the clock abstraction.

pub mod clock;
pub mod entity;
pub mod error;
pub mod id;
pub mod money;
pub mod value_object;

pub use clock::{Clock, ManualClock, SystemClock};
pub use entity::Entity;
pub use error::{DomainError, DomainResult, ErrorKind};
pub use id::{AccountId, BranchId, CustomerId, EmployeeId, PrincipalId, TransactionId};
pub use money::{MONEY_MAX, Money, MoneyError};
pub use value_object::ValueObject;
