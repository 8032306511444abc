use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use malvader_core::DomainError;

use crate::Permission;

/// Employee rank. Ordered from least to most privileged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmployeeRank {
    Intern,
    Teller,
    Manager,
}

impl EmployeeRank {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmployeeRank::Intern => "intern",
            EmployeeRank::Teller => "teller",
            EmployeeRank::Manager => "manager",
        }
    }

    pub fn permissions(&self) -> &'static [Permission] {
        match self {
            EmployeeRank::Intern => &[Permission::OpenAccount, Permission::ViewSubordinates],
            EmployeeRank::Teller => &[
                Permission::OpenAccount,
                Permission::CloseAccount,
                Permission::ViewSubordinates,
            ],
            EmployeeRank::Manager => &[
                Permission::OpenAccount,
                Permission::CloseAccount,
                Permission::RegisterEmployee,
                Permission::ViewSubordinates,
            ],
        }
    }
}

impl fmt::Display for EmployeeRank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EmployeeRank {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "intern" => Ok(EmployeeRank::Intern),
            "teller" => Ok(EmployeeRank::Teller),
            "manager" => Ok(EmployeeRank::Manager),
            other => Err(DomainError::validation(format!("unknown employee rank '{other}'"))),
        }
    }
}
