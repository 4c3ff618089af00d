use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One submission for a question, kept in an append-only log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionEntry {
    pub choice_ids: Vec<Uuid>,
    pub timestamp: DateTime<Utc>,
    pub time_taken: f64,
}

/// Per-question progress of an attempt in the one-question-at-a-time flow.
/// Unique per (attempt, question).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptQuestion {
    pub id: Uuid,
    pub attempt_id: Uuid,
    pub question_id: Uuid,
    pub selection_history: Vec<SelectionEntry>,
    pub final_choices: Vec<Uuid>,
    pub correct: bool,
    pub points_awarded: Decimal,
    pub time_taken: f64,
    pub changed_answer: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A graded submission to be appended to the attempt's question log.
#[derive(Debug, Clone)]
pub struct RecordAnswer {
    pub attempt_id: Uuid,
    pub question_id: Uuid,
    pub choice_ids: Vec<Uuid>,
    pub correct: bool,
    pub points_awarded: Decimal,
    pub time_taken: f64,
    pub submitted_at: DateTime<Utc>,
}

impl RecordAnswer {
    pub fn entry(&self) -> SelectionEntry {
        SelectionEntry {
            choice_ids: self.choice_ids.clone(),
            timestamp: self.submitted_at,
            time_taken: self.time_taken,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnswerRecorded {
    pub question: AttemptQuestion,
    /// Every question of the attempt that now has a progress row.
    pub answered: Vec<Uuid>,
}
