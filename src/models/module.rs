use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::models::question::QuestionType;

/// How much per-question correctness `submit_answer` reveals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackMode {
    /// Correctness on every submit.
    Immediate,
    /// Only for single-answer and true/false questions.
    Mixed,
    /// Only at finish / review.
    End,
    None,
}

impl FeedbackMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackMode::Immediate => "immediate",
            FeedbackMode::Mixed => "mixed",
            FeedbackMode::End => "end",
            FeedbackMode::None => "none",
        }
    }

    pub fn reveals(&self, qtype: QuestionType) -> bool {
        match self {
            FeedbackMode::Immediate => true,
            FeedbackMode::Mixed => matches!(qtype, QuestionType::Single | QuestionType::TrueFalse),
            FeedbackMode::End | FeedbackMode::None => false,
        }
    }
}

impl FromStr for FeedbackMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "immediate" => Ok(FeedbackMode::Immediate),
            "mixed" => Ok(FeedbackMode::Mixed),
            "end" => Ok(FeedbackMode::End),
            "none" => Ok(FeedbackMode::None),
            other => Err(format!("unknown feedback mode '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Module {
    pub id: Uuid,
    pub org_id: Uuid,
    pub skill_id: Uuid,
    pub sop_id: Option<Uuid>,
    pub title: String,
    /// 1-5, feeds the module-pass XP award.
    pub difficulty: i16,
    pub active: bool,
    /// Legacy threshold, used when `pass_mark` is zero.
    pub passing_score: i16,
    pub pass_mark: i16,
    pub require_viewed: bool,
    pub question_pool_count: Option<i32>,
    pub shuffle_questions: bool,
    pub shuffle_choices: bool,
    /// Applies to multi-select questions only.
    pub negative_marking: bool,
    pub feedback_mode: FeedbackMode,
    pub created_at: DateTime<Utc>,
}

impl Module {
    pub fn effective_pass_mark(&self) -> i16 {
        if self.pass_mark > 0 {
            self.pass_mark
        } else {
            self.passing_score
        }
    }

    /// Pool size to sample, if the module asks for fewer questions than the bank holds.
    pub fn pool_size(&self, bank_size: usize) -> Option<usize> {
        match self.question_pool_count {
            Some(n) if n > 0 && (n as usize) < bank_size => Some(n as usize),
            _ => None,
        }
    }
}
