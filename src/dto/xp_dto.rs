use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::signoff::SupervisorSignoff;
use crate::models::xp_event::XpEvent;
use crate::services::xp_service::XpSummary;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateSignoffPayload {
    pub user_id: Uuid,
    pub skill_id: Uuid,
    #[serde(default)]
    #[validate(length(max = 2000))]
    pub note: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignoffResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub skill_id: Uuid,
    pub supervisor_id: Uuid,
    pub note: String,
    pub created_at: DateTime<Utc>,
    pub xp_awarded: i32,
}

impl SignoffResponse {
    pub fn new(signoff: SupervisorSignoff, event: &XpEvent) -> Self {
        Self {
            id: signoff.id,
            user_id: signoff.user_id,
            skill_id: signoff.skill_id,
            supervisor_id: signoff.supervisor_id,
            note: signoff.note,
            created_at: signoff.created_at,
            xp_awarded: event.amount,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct XpQuery {
    pub skill_id: Option<Uuid>,
    #[validate(range(min = 0, max = 3650))]
    pub since_days: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XpSummaryResponse {
    pub total_xp: i64,
    pub level: i64,
    pub xp_into_level: i64,
    pub xp_for_next_level: i64,
}

impl From<XpSummary> for XpSummaryResponse {
    fn from(summary: XpSummary) -> Self {
        Self {
            total_xp: summary.total_xp,
            level: summary.level,
            xp_into_level: summary.xp_into_level,
            xp_for_next_level: summary.xp_for_next_level,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XpEventResponse {
    pub id: Uuid,
    pub source: String,
    pub amount: i32,
    pub skill_id: Option<Uuid>,
    pub module_id: Option<Uuid>,
    pub meta: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl From<XpEvent> for XpEventResponse {
    fn from(event: XpEvent) -> Self {
        Self {
            id: event.id,
            source: event.source.as_str().to_string(),
            amount: event.amount,
            skill_id: event.skill_id,
            module_id: event.module_id,
            meta: event.meta,
            created_at: event.created_at,
        }
    }
}
