use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionType {
    /// Exactly one correct choice.
    Single,
    /// Zero or more correct choices, partial credit.
    Multi,
    /// Exactly one correct of two choices.
    TrueFalse,
}

impl QuestionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionType::Single => "single",
            QuestionType::Multi => "multi",
            QuestionType::TrueFalse => "truefalse",
        }
    }
}

impl FromStr for QuestionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single" => Ok(QuestionType::Single),
            "multi" => Ok(QuestionType::Multi),
            "truefalse" => Ok(QuestionType::TrueFalse),
            other => Err(format!("unknown question type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: Uuid,
    pub module_id: Uuid,
    #[serde(rename = "qtype")]
    pub question_type: QuestionType,
    pub text: String,
    pub display_order: i32,
    #[serde(default = "default_points")]
    pub points: i32,
    #[serde(default)]
    pub explanation: String,
}

fn default_points() -> i32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Choice {
    pub id: Uuid,
    pub question_id: Uuid,
    pub text: String,
    /// Never serialized into learner-facing payloads before review.
    pub is_correct: bool,
    pub display_order: i32,
}

/// A question with its choices in stored display order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionWithChoices {
    #[serde(flatten)]
    pub question: Question,
    pub choices: Vec<Choice>,
}

impl QuestionWithChoices {
    pub fn id(&self) -> Uuid {
        self.question.id
    }

    pub fn choice(&self, id: Uuid) -> Option<&Choice> {
        self.choices.iter().find(|c| c.id == id)
    }

    pub fn correct_ids(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.choices.iter().filter(|c| c.is_correct).map(|c| c.id)
    }

    pub fn incorrect_ids(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.choices.iter().filter(|c| !c.is_correct).map(|c| c.id)
    }
}
