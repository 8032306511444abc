use serde::{Deserialize, Serialize};

/// Operations gated by role or rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    /// Deposit, withdraw, transfer and read statements on owned accounts.
    OperateOwnAccounts,
    OpenAccount,
    CloseAccount,
    RegisterEmployee,
    ViewSubordinates,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::OperateOwnAccounts => "accounts.operate_own",
            Permission::OpenAccount => "accounts.open",
            Permission::CloseAccount => "accounts.close",
            Permission::RegisterEmployee => "staff.register",
            Permission::ViewSubordinates => "staff.subordinates",
        }
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
