use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A manager's attestation that a user demonstrated a skill.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SupervisorSignoff {
    pub id: Uuid,
    pub org_id: Uuid,
    pub user_id: Uuid,
    pub skill_id: Uuid,
    pub supervisor_id: Uuid,
    pub note: String,
    pub created_at: DateTime<Utc>,
}
