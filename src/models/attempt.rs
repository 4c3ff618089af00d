use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// question id -> selected choice ids
pub type AnswerMap = HashMap<Uuid, Vec<Uuid>>;

/// The question subset and orderings committed when an attempt starts.
/// Persisted verbatim and never re-derived.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresentationPlan {
    pub presented_questions: Vec<Uuid>,
    pub choice_order: HashMap<Uuid, Vec<Uuid>>,
}

impl PresentationPlan {
    pub fn contains(&self, question_id: Uuid) -> bool {
        self.presented_questions.contains(&question_id)
    }

    pub fn len(&self) -> usize {
        self.presented_questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.presented_questions.is_empty()
    }

    pub fn choices_for(&self, question_id: Uuid) -> Option<&[Uuid]> {
        self.choice_order.get(&question_id).map(Vec::as_slice)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleAttempt {
    pub id: Uuid,
    pub user_id: Uuid,
    pub module_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Percent 0-100, zero until scored.
    pub score: i16,
    pub passed: bool,
    pub answers: AnswerMap,
    #[serde(flatten)]
    pub plan: PresentationPlan,
}

impl ModuleAttempt {
    pub fn open(user_id: Uuid, module_id: Uuid, plan: PresentationPlan, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            module_id,
            created_at: now,
            completed_at: None,
            score: 0,
            passed: false,
            answers: AnswerMap::new(),
            plan,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }
}

/// Outcome written by the single, conditional finalization of an attempt.
#[derive(Debug, Clone)]
pub struct Completion {
    pub attempt_id: Uuid,
    pub completed_at: DateTime<Utc>,
    pub score: i16,
    pub passed: bool,
    /// The selections the score was computed from. Replaces the stored
    /// answers map so a completed attempt can be re-read without drift.
    pub answers: AnswerMap,
}
