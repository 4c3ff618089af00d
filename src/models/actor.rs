use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Learner,
    Manager,
    Admin,
}

impl Role {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::to_ascii_lowercase).as_deref() {
            Some("manager") => Role::Manager,
            Some("admin") => Role::Admin,
            _ => Role::Learner,
        }
    }
}

/// The authenticated caller, passed explicitly into every engine operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Uuid,
    pub org_id: Uuid,
    pub role: Role,
}

impl Actor {
    pub fn learner(user_id: Uuid, org_id: Uuid) -> Self {
        Self {
            user_id,
            org_id,
            role: Role::Learner,
        }
    }

    pub fn is_manager(&self) -> bool {
        matches!(self.role, Role::Manager | Role::Admin)
    }
}
