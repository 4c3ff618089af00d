use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum XpSource {
    ModulePass,
    Quiz,
    Streak,
    SupervisorSignoff,
    Evidence,
}

impl XpSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            XpSource::ModulePass => "module_pass",
            XpSource::Quiz => "quiz",
            XpSource::Streak => "streak",
            XpSource::SupervisorSignoff => "supervisor_signoff",
            XpSource::Evidence => "evidence",
        }
    }
}

impl FromStr for XpSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "module_pass" => Ok(XpSource::ModulePass),
            "quiz" => Ok(XpSource::Quiz),
            "streak" => Ok(XpSource::Streak),
            "supervisor_signoff" => Ok(XpSource::SupervisorSignoff),
            "evidence" => Ok(XpSource::Evidence),
            other => Err(format!("unknown xp source '{}'", other)),
        }
    }
}

/// Immutable ledger entry. Totals are always sums over the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XpEvent {
    pub id: Uuid,
    pub user_id: Uuid,
    pub org_id: Uuid,
    pub skill_id: Option<Uuid>,
    pub module_id: Option<Uuid>,
    pub source: XpSource,
    pub amount: i32,
    pub meta: JsonValue,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewXpEvent {
    pub user_id: Uuid,
    pub org_id: Uuid,
    pub skill_id: Option<Uuid>,
    pub module_id: Option<Uuid>,
    pub source: XpSource,
    pub amount: i32,
    pub meta: JsonValue,
}

impl NewXpEvent {
    /// Module-pass awards are get-or-create on (user, skill, module).
    pub fn is_once_per_module(&self) -> bool {
        self.source == XpSource::ModulePass
    }

    pub fn into_event(self, created_at: DateTime<Utc>) -> XpEvent {
        XpEvent {
            id: Uuid::new_v4(),
            user_id: self.user_id,
            org_id: self.org_id,
            skill_id: self.skill_id,
            module_id: self.module_id,
            source: self.source,
            amount: self.amount,
            meta: self.meta,
            created_at,
        }
    }
}

/// Ledger slice for totals and listings.
#[derive(Debug, Clone, Default)]
pub struct XpFilter {
    pub user_id: Uuid,
    pub org_id: Option<Uuid>,
    pub skill_id: Option<Uuid>,
    pub since: Option<DateTime<Utc>>,
}

impl XpFilter {
    pub fn matches(&self, event: &XpEvent) -> bool {
        event.user_id == self.user_id
            && self.org_id.map_or(true, |org| event.org_id == org)
            && self.skill_id.map_or(true, |skill| event.skill_id == Some(skill))
            && self.since.map_or(true, |since| event.created_at >= since)
    }
}
