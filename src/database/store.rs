//! Storage seams used by the attempt engine.
//!
//! `PgStore` backs production; `MemoryStore` keeps everything in-process.
//! Both must uphold the same atomicity guarantees: answer recording is
//! all-or-nothing per submission, and `complete_attempt` finalizes at most once.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::attempt::{Completion, ModuleAttempt};
use crate::models::attempt_question::{AnswerRecorded, AttemptQuestion, RecordAnswer};
use crate::models::module::Module;
use crate::models::question::QuestionWithChoices;
use crate::models::signoff::SupervisorSignoff;
use crate::models::xp_event::{NewXpEvent, XpEvent, XpFilter};

#[async_trait]
pub trait AttemptStore: Send + Sync {
    async fn fetch_module(&self, module_id: Uuid) -> Result<Option<Module>>;

    /// All questions of a module with their choices, in stored display order.
    async fn question_bank(&self, module_id: Uuid) -> Result<Vec<QuestionWithChoices>>;

    async fn insert_attempt(&self, attempt: &ModuleAttempt) -> Result<ModuleAttempt>;

    /// Only returns the attempt when it belongs to `user_id`.
    async fn fetch_attempt(&self, attempt_id: Uuid, user_id: Uuid) -> Result<Option<ModuleAttempt>>;

    async fn attempts_for_user(&self, user_id: Uuid) -> Result<Vec<ModuleAttempt>>;

    async fn attempt_questions(&self, attempt_id: Uuid) -> Result<Vec<AttemptQuestion>>;

    /// Appends to the question's selection history, overwrites its final
    /// selection and grade, and mirrors the selection into the attempt's
    /// answers map. One atomic unit.
    async fn record_answer(&self, answer: &RecordAnswer) -> Result<AnswerRecorded>;

    /// Sets `completed_at`, `score` and `passed` only while `completed_at` is
    /// still null, and persists `awards` in the same unit. Returns `None` when
    /// another caller finalized first; nothing is written in that case.
    async fn complete_attempt(
        &self,
        completion: &Completion,
        awards: &[NewXpEvent],
    ) -> Result<Option<(ModuleAttempt, Vec<XpEvent>)>>;
}

#[async_trait]
pub trait XpLedger: Send + Sync {
    async fn xp_total(&self, filter: &XpFilter) -> Result<i64>;

    /// Newest first.
    async fn xp_events(&self, filter: &XpFilter) -> Result<Vec<XpEvent>>;

    /// Persists the sign-off together with the XP it earns.
    async fn record_signoff(
        &self,
        signoff: &SupervisorSignoff,
        award: &NewXpEvent,
    ) -> Result<(SupervisorSignoff, XpEvent)>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SopViewTracker: Send + Sync {
    async fn has_completed_view(&self, sop_id: Uuid, user_id: Uuid) -> Result<bool>;
}
