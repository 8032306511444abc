use serde::{Deserialize, Serialize};

use malvader_core::{BranchId, DomainError, Entity};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub id: BranchId,
    pub code: String,
    pub name: String,
}

impl Branch {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Result<Self, DomainError> {
        let code = code.into().trim().to_string();
        let name = name.into().trim().to_string();
        if code.is_empty() || name.is_empty() {
            return Err(DomainError::validation("branch code and name are required"));
        }
        Ok(Self {
            id: BranchId::new(),
            code,
            name,
        })
    }
}

impl Entity for Branch {
    type Id = BranchId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
