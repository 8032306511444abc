//! Domain error model.
//!
//! Every failure the bank can surface is a `DomainError` variant, and every
//! variant belongs to exactly one `ErrorKind` of the taxonomy. Callers decide
//! presentation (status code, message) from the kind, never from the variant
//! text.

use thiserror::Error;

use crate::money::Money;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Coarse error taxonomy.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad input shape or format; the user corrects and resubmits.
    Validation,
    /// A limit, quota or eligibility rule denied the operation.
    PolicyViolation,
    /// Entity lookup miss.
    NotFound,
    /// Role or rank check failed.
    PermissionDenied,
    /// Credential, one-time code or lockout failure.
    Authentication,
    /// The external delivery channel failed; restart the flow.
    NotificationFailed,
    /// Storage failure; the unit of work was rolled back.
    Consistency,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation_error",
            ErrorKind::PolicyViolation => "policy_violation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::PermissionDenied => "permission_denied",
            ErrorKind::Authentication => "authentication_error",
            ErrorKind::NotificationFailed => "notification_failed",
            ErrorKind::Consistency => "consistency_error",
        }
    }
}

/// Domain-level error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed national ID).
    #[error("{0}")]
    Validation(String),

    #[error("amount must be greater than zero")]
    InvalidAmount,

    #[error("the same request was already processed")]
    DuplicateRequest,

    #[error("minimum deposit for this account is {minimum}")]
    BelowMinimum { minimum: Money },

    #[error("deposit limit of {limit} within the last 24 hours exceeded")]
    DailyLimitExceeded { limit: Money },

    #[error("insufficient funds")]
    InsufficientFunds,

    #[error("cannot transfer to the same account")]
    SelfTransfer,

    #[error("account balance must be zero to close it (current balance {balance})")]
    NonZeroBalance { balance: Money },

    #[error("account is not active")]
    AccountNotActive,

    #[error("destination account not found")]
    DestinationNotFound,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Deliberately identical for unknown principals and wrong passwords.
    #[error("{}", credentials_message(.final_attempt))]
    InvalidCredentials { final_attempt: bool },

    #[error("user locked, try again in {remaining_minutes} minute(s)")]
    AccountLocked { remaining_minutes: i64 },

    #[error("invalid or expired verification code")]
    InvalidOtp,

    #[error("could not deliver the verification code, please try again")]
    NotificationFailed(String),

    /// Storage failure. The detail is for operators only.
    #[error("operation failed, try again")]
    Consistency(String),
}

fn credentials_message(final_attempt: &bool) -> &'static str {
    if *final_attempt {
        "invalid credentials; user locked for the next minutes"
    } else {
        "invalid credentials"
    }
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn permission_denied(msg: impl Into<String>) -> Self {
        Self::PermissionDenied(msg.into())
    }

    pub fn consistency(msg: impl Into<String>) -> Self {
        Self::Consistency(msg.into())
    }

    pub fn not_found(entity: &'static str) -> Self {
        Self::NotFound(entity)
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::Validation(_) | DomainError::InvalidAmount | DomainError::DuplicateRequest => {
                ErrorKind::Validation
            }
            DomainError::BelowMinimum { .. }
            | DomainError::DailyLimitExceeded { .. }
            | DomainError::InsufficientFunds
            | DomainError::SelfTransfer
            | DomainError::NonZeroBalance { .. }
            | DomainError::AccountNotActive => ErrorKind::PolicyViolation,
            DomainError::DestinationNotFound | DomainError::NotFound(_) => ErrorKind::NotFound,
            DomainError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            DomainError::InvalidCredentials { .. }
            | DomainError::AccountLocked { .. }
            | DomainError::InvalidOtp => ErrorKind::Authentication,
            DomainError::NotificationFailed(_) => ErrorKind::NotificationFailed,
            DomainError::Consistency(_) => ErrorKind::Consistency,
        }
    }

    /// Operator-facing detail; falls back to the user-facing message.
    pub fn detail(&self) -> String {
        match self {
            DomainError::Consistency(detail) | DomainError::NotificationFailed(detail) => detail.clone(),
            other => other.to_string(),
        }
    }
}
