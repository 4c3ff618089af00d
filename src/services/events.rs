use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::xp_event::XpEvent;

/// Emitted once per attempt, right after its finalization was committed.
#[derive(Debug, Clone)]
pub struct AttemptCompleted {
    pub attempt_id: Uuid,
    pub user_id: Uuid,
    pub org_id: Uuid,
    pub module_id: Uuid,
    pub skill_id: Uuid,
    pub score: i16,
    pub passed: bool,
    pub completed_at: DateTime<Utc>,
    pub xp_awarded: Vec<XpEvent>,
}

/// Downstream consumers of finalized attempts (badge evaluation,
/// recertification). Called synchronously; must not fail the request.
pub trait CompletionObserver: Send + Sync {
    fn attempt_completed(&self, event: &AttemptCompleted);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl CompletionObserver for TracingObserver {
    fn attempt_completed(&self, event: &AttemptCompleted) {
        let xp: i32 = event.xp_awarded.iter().map(|e| e.amount).sum();
        tracing::info!(
            attempt_id = %event.attempt_id,
            user_id = %event.user_id,
            module_id = %event.module_id,
            score = event.score,
            passed = event.passed,
            xp,
            "attempt completed"
        );
    }
}
