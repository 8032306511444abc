use core::fmt;
use core::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use malvader_core::{DomainError, Entity, PrincipalId, ValueObject};

use crate::otp::ActiveOtp;

/// Minimum age, in whole years, to hold an account.
pub const MINIMUM_AGE_YEARS: i32 = 16;

/// Who a principal is at the login boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    Employee,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::Employee => "employee",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "customer" => Ok(Role::Customer),
            "employee" => Ok(Role::Employee),
            other => Err(DomainError::validation(format!("unknown role '{other}'"))),
        }
    }
}

/// Eleven-digit national ID. Punctuation is stripped on parse.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NationalId(String);

impl ValueObject for NationalId {}

impl NationalId {
    pub fn parse(input: &str) -> Result<Self, DomainError> {
        let digits: String = input.chars().filter(|c| c.is_ascii_digit()).collect();
        if digits.len() != 11 {
            return Err(DomainError::validation("national ID must have exactly 11 digits"));
        }
        Ok(Self(digits))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NationalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for NationalId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<NationalId> for String {
    fn from(value: NationalId) -> Self {
        value.0
    }
}

/// Identity fields supplied when a customer or employee is registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityInput {
    pub name: String,
    pub national_id: String,
    pub email: String,
    pub birth_date: NaiveDate,
    pub phone: String,
}

/// Identity that passed every shape check. Uniqueness is checked by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedIdentity {
    pub name: String,
    pub national_id: NationalId,
    pub email: String,
    pub birth_date: NaiveDate,
    pub phone: String,
}

impl IdentityInput {
    pub fn validate(&self, today: NaiveDate) -> Result<ValidatedIdentity, DomainError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("name is required"));
        }

        let national_id = NationalId::parse(&self.national_id)?;

        let email = self.email.trim().to_ascii_lowercase();
        if !email.contains('@') {
            return Err(DomainError::validation("email address is invalid"));
        }

        let phone: String = self.phone.chars().filter(|c| c.is_ascii_digit()).collect();
        if !(10..=11).contains(&phone.len()) {
            return Err(DomainError::validation("phone must have 10 or 11 digits"));
        }

        if age_on(self.birth_date, today) < MINIMUM_AGE_YEARS {
            return Err(DomainError::validation(format!(
                "holder must be at least {MINIMUM_AGE_YEARS} years old"
            )));
        }

        Ok(ValidatedIdentity {
            name: name.to_string(),
            national_id,
            email,
            birth_date: self.birth_date,
            phone,
        })
    }
}

/// Whole years between `birth` and `today`.
pub fn age_on(birth: NaiveDate, today: NaiveDate) -> i32 {
    let mut age = today.year() - birth.year();
    if (today.month(), today.day()) < (birth.month(), birth.day()) {
        age -= 1;
    }
    age
}

/// Authenticating identity shared by customers and employees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: PrincipalId,
    pub national_id: NationalId,
    pub name: String,
    pub email: String,
    pub birth_date: NaiveDate,
    pub phone: String,
    pub password_hash: String,
    pub role: Role,
    pub otp: Option<ActiveOtp>,
    pub otp_attempts: u32,
    /// Set when the password was issued by someone else; cleared on change.
    pub provisional_password: bool,
    pub created_at: DateTime<Utc>,
}

impl Principal {
    pub fn new(
        identity: ValidatedIdentity,
        password_hash: String,
        role: Role,
        provisional_password: bool,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: PrincipalId::new(),
            national_id: identity.national_id,
            name: identity.name,
            email: identity.email,
            birth_date: identity.birth_date,
            phone: identity.phone,
            password_hash,
            role,
            otp: None,
            otp_attempts: 0,
            provisional_password,
            created_at,
        }
    }

    /// Install a freshly dispatched code, replacing any previous one.
    pub fn issue_otp(&mut self, otp: ActiveOtp) {
        self.otp = Some(otp);
        self.otp_attempts = 0;
    }

    pub fn clear_otp(&mut self) {
        self.otp = None;
        self.otp_attempts = 0;
    }
}

impl Entity for Principal {
    type Id = PrincipalId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
