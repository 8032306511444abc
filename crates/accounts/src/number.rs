//! Account numbers (`NNNNNN-C`, Luhn check digit) and employee codes (`FUNCNNN`).

use core::fmt;
use core::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

use malvader_core::{DomainError, ValueObject};

const BASE_MIN: u32 = 100_000;
const BASE_MAX: u32 = 999_999;

/// Luhn sum of `number` modulo 10.
///
/// Digits are taken from the right; every second digit is doubled and the
/// digits of the product are summed.
pub fn luhn_checksum(number: u64) -> u32 {
    let digits: Vec<u32> = number
        .to_string()
        .chars()
        .filter_map(|c| c.to_digit(10))
        .collect();

    let mut total = 0;
    for (i, d) in digits.iter().rev().enumerate() {
        if i % 2 == 0 {
            total += d;
        } else {
            let doubled = d * 2;
            total += doubled / 10 + doubled % 10;
        }
    }
    total % 10
}

/// Check digit that makes `base` followed by the digit Luhn-valid.
pub fn check_digit(base: u32) -> u32 {
    (10 - luhn_checksum(u64::from(base) * 10)) % 10
}

/// Customer-facing account number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountNumber(String);

impl ValueObject for AccountNumber {}

impl AccountNumber {
    /// Build the number for a 6-digit base.
    pub fn from_base(base: u32) -> Result<Self, DomainError> {
        if !(BASE_MIN..=BASE_MAX).contains(&base) {
            return Err(DomainError::validation(format!(
                "account number base {base} must have six digits"
            )));
        }
        Ok(Self(format!("{base:06}-{}", check_digit(base))))
    }

    /// Draw a random candidate. Callers re-roll until the candidate is unused.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let base = rng.gen_range(BASE_MIN..=BASE_MAX);
        Self(format!("{base:06}-{}", check_digit(base)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the full number (base followed by check digit) satisfies Luhn.
    pub fn is_luhn_valid(&self) -> bool {
        let digits: String = self.0.chars().filter(|c| c.is_ascii_digit()).collect();
        digits
            .parse::<u64>()
            .map(|n| luhn_checksum(n) == 0)
            .unwrap_or(false)
    }
}

impl fmt::Display for AccountNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for AccountNumber {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (base, check) = s
            .split_once('-')
            .ok_or_else(|| DomainError::validation("account number must look like NNNNNN-C"))?;
        if base.len() != 6
            || check.len() != 1
            || !base.chars().all(|c| c.is_ascii_digit())
            || !check.chars().all(|c| c.is_ascii_digit())
        {
            return Err(DomainError::validation("account number must look like NNNNNN-C"));
        }
        let number = Self(s.to_string());
        if !number.is_luhn_valid() {
            return Err(DomainError::validation("account number check digit is invalid"));
        }
        Ok(number)
    }
}

impl TryFrom<String> for AccountNumber {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AccountNumber> for String {
    fn from(value: AccountNumber) -> Self {
        value.0
    }
}

/// Employee code derived from the employee sequence number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmployeeCode(String);

impl EmployeeCode {
    /// Code for the employee that follows `current_max` in the sequence.
    ///
    /// Sequence numbers are never reused, even after an employee is removed.
    pub fn next_after(current_max: u32) -> (u32, Self) {
        let next = current_max + 1;
        (next, Self::for_sequence(next))
    }

    pub fn for_sequence(sequence: u32) -> Self {
        Self(format!("FUNC{sequence:03}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EmployeeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
