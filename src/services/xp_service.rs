use chrono::{Duration, Utc};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::database::store::XpLedger;
use crate::error::{Error, Result};
use crate::models::actor::Actor;
use crate::models::module::Module;
use crate::models::signoff::SupervisorSignoff;
use crate::models::xp_event::{NewXpEvent, XpEvent, XpFilter, XpSource};

const MODULE_PASS_BASE_XP: i32 = 100;
const MODULE_PASS_XP_PER_DIFFICULTY: i32 = 10;
const BONUS_STEP: i32 = 5;
const SIGNOFF_XP: i32 = 150;

/// XP needed to go from `level` to `level + 1`.
pub fn xp_for_next_level(level: i64) -> i64 {
    let exponent = (level - 1).max(0) as i32;
    (200.0 * 1.35_f64.powi(exponent) / 10.0).round_ties_even() as i64 * 10
}

/// Level reached with `total` XP and the XP already earned inside it.
pub fn level_progress(total: i64) -> (i64, i64) {
    let (mut level, mut left) = (1, total.max(0));
    while left >= xp_for_next_level(level) {
        left -= xp_for_next_level(level);
        level += 1;
    }
    (level, left)
}

pub fn level_from_total_xp(total: i64) -> i64 {
    level_progress(total).0
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XpSummary {
    pub total_xp: i64,
    pub level: i64,
    pub xp_into_level: i64,
    pub xp_for_next_level: i64,
}

impl XpSummary {
    pub fn from_total(total_xp: i64) -> Self {
        let (level, xp_into_level) = level_progress(total_xp);
        Self {
            total_xp,
            level,
            xp_into_level,
            xp_for_next_level: xp_for_next_level(level),
        }
    }
}

#[derive(Clone)]
pub struct XpService {
    ledger: Arc<dyn XpLedger>,
}

impl XpService {
    pub fn new(ledger: Arc<dyn XpLedger>) -> Self {
        Self { ledger }
    }

    /// XP earned by finalizing an attempt. Empty unless it passed.
    pub fn completion_awards(module: &Module, user_id: Uuid, score: i16, passed: bool) -> Vec<NewXpEvent> {
        if !passed {
            return Vec::new();
        }

        let mut awards = vec![NewXpEvent {
            user_id,
            org_id: module.org_id,
            skill_id: Some(module.skill_id),
            module_id: Some(module.id),
            source: XpSource::ModulePass,
            amount: MODULE_PASS_BASE_XP + MODULE_PASS_XP_PER_DIFFICULTY * i32::from(module.difficulty),
            meta: json!({ "module": module.id }),
        }];

        let over = i32::from(score) - i32::from(module.effective_pass_mark());
        let extra = if over > 0 { over / BONUS_STEP * BONUS_STEP } else { 0 };
        if extra > 0 {
            awards.push(NewXpEvent {
                user_id,
                org_id: module.org_id,
                skill_id: Some(module.skill_id),
                module_id: Some(module.id),
                source: XpSource::Quiz,
                amount: extra,
                meta: json!({ "score": score, "module": module.id }),
            });
        }

        awards
    }

    pub async fn create_signoff(
        &self,
        actor: &Actor,
        user_id: Uuid,
        skill_id: Uuid,
        note: String,
    ) -> Result<(SupervisorSignoff, XpEvent)> {
        if !actor.is_manager() {
            tracing::warn!(actor = %actor.user_id, "sign-off rejected for non-manager");
            return Err(Error::Forbidden(
                "Only managers can create sign-offs".to_string(),
            ));
        }

        let signoff = SupervisorSignoff {
            id: Uuid::new_v4(),
            org_id: actor.org_id,
            user_id,
            skill_id,
            supervisor_id: actor.user_id,
            note,
            created_at: Utc::now(),
        };
        let award = NewXpEvent {
            user_id,
            org_id: actor.org_id,
            skill_id: Some(skill_id),
            module_id: None,
            source: XpSource::SupervisorSignoff,
            amount: SIGNOFF_XP,
            meta: json!({ "supervisor": actor.user_id }),
        };

        let (signoff, event) = self.ledger.record_signoff(&signoff, &award).await?;
        tracing::info!(
            signoff_id = %signoff.id,
            user_id = %user_id,
            skill_id = %skill_id,
            "supervisor sign-off recorded"
        );
        Ok((signoff, event))
    }

    pub async fn summary(
        &self,
        actor: &Actor,
        skill_id: Option<Uuid>,
        since_days: Option<i64>,
    ) -> Result<XpSummary> {
        let total = self
            .ledger
            .xp_total(&Self::filter(actor, skill_id, since_days))
            .await?;
        Ok(XpSummary::from_total(total))
    }

    pub async fn events(
        &self,
        actor: &Actor,
        skill_id: Option<Uuid>,
        since_days: Option<i64>,
    ) -> Result<Vec<XpEvent>> {
        self.ledger
            .xp_events(&Self::filter(actor, skill_id, since_days))
            .await
    }

    fn filter(actor: &Actor, skill_id: Option<Uuid>, since_days: Option<i64>) -> XpFilter {
        XpFilter {
            user_id: actor.user_id,
            org_id: Some(actor.org_id),
            skill_id,
            since: since_days.map(|days| Utc::now() - Duration::days(days)),
        }
    }
}
