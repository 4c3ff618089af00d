use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::attempt::ModuleAttempt;
use crate::models::question::QuestionWithChoices;
use crate::services::attempt_service::{
    AnswerFeedback, AttemptResult, AttemptReview, NextQuestion, StartedAttempt, SubmitOutcome,
};
use crate::services::grading_service::FeedbackEntry;

fn points(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

/// A choice as shown while the attempt is running. Carries no correctness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicChoice {
    pub id: Uuid,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicQuestion {
    pub id: Uuid,
    pub qtype: String,
    pub text: String,
    pub points: i32,
    pub choices: Vec<PublicChoice>,
}

impl From<&QuestionWithChoices> for PublicQuestion {
    fn from(q: &QuestionWithChoices) -> Self {
        Self {
            id: q.id(),
            qtype: q.question.question_type.as_str().to_string(),
            text: q.question.text.clone(),
            points: q.question.points,
            choices: q
                .choices
                .iter()
                .map(|c| PublicChoice {
                    id: c.id,
                    text: c.text.clone(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartAttemptResponse {
    pub attempt_id: Uuid,
    pub module_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub total_questions: usize,
    pub questions: Vec<PublicQuestion>,
}

impl From<StartedAttempt> for StartAttemptResponse {
    fn from(started: StartedAttempt) -> Self {
        Self {
            attempt_id: started.attempt.id,
            module_id: started.attempt.module_id,
            created_at: started.attempt.created_at,
            total_questions: started.questions.len(),
            questions: started.questions.iter().map(PublicQuestion::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NextQuestionResponse {
    pub question: Option<PublicQuestion>,
    pub remaining: usize,
    pub total: usize,
}

impl From<NextQuestion> for NextQuestionResponse {
    fn from(next: NextQuestion) -> Self {
        Self {
            question: next.question.as_ref().map(PublicQuestion::from),
            remaining: next.remaining,
            total: next.total,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SubmitAnswerRequest {
    pub question_id: Uuid,
    #[serde(default)]
    pub choice_ids: Vec<Uuid>,
    /// Seconds spent on the question by the client.
    #[validate(range(min = 0.0))]
    pub time_taken: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerFeedbackResponse {
    pub correct: bool,
    pub points_awarded: f64,
    pub max_points: i32,
    pub message: String,
}

impl From<AnswerFeedback> for AnswerFeedbackResponse {
    fn from(feedback: AnswerFeedback) -> Self {
        Self {
            correct: feedback.correct,
            points_awarded: points(feedback.earned),
            max_points: feedback.max,
            message: feedback.message,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitAnswerResponse {
    pub completed: bool,
    pub remaining: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<AnswerFeedbackResponse>,
}

impl From<SubmitOutcome> for SubmitAnswerResponse {
    fn from(outcome: SubmitOutcome) -> Self {
        Self {
            completed: outcome.completed,
            remaining: outcome.remaining,
            feedback: outcome.feedback.map(AnswerFeedbackResponse::from),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerItem {
    pub question_id: Uuid,
    #[serde(default)]
    pub choice_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitAllRequest {
    pub answers: Vec<AnswerItem>,
}

impl SubmitAllRequest {
    pub fn into_pairs(self) -> Vec<(Uuid, Vec<Uuid>)> {
        self.answers
            .into_iter()
            .map(|a| (a.question_id, a.choice_ids))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackItem {
    pub question_id: Uuid,
    pub answered: bool,
    pub correct: bool,
    pub points_awarded: f64,
    pub max_points: i32,
    pub message: String,
}

impl From<FeedbackEntry> for FeedbackItem {
    fn from(entry: FeedbackEntry) -> Self {
        Self {
            question_id: entry.question_id,
            answered: entry.answered,
            correct: entry.correct,
            points_awarded: points(entry.earned),
            max_points: entry.max,
            message: entry.message,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptResultResponse {
    pub attempt_id: Uuid,
    pub percent: i16,
    pub passed: bool,
    pub score: f64,
    pub max_score: i64,
    pub feedback: Vec<FeedbackItem>,
}

impl From<AttemptResult> for AttemptResultResponse {
    fn from(result: AttemptResult) -> Self {
        Self {
            attempt_id: result.attempt_id,
            percent: result.percent,
            passed: result.passed,
            score: points(result.earned),
            max_score: result.max,
            feedback: result.feedback.into_iter().map(FeedbackItem::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewChoice {
    pub id: Uuid,
    pub text: String,
    pub is_correct: bool,
    pub selected: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewQuestion {
    pub id: Uuid,
    pub qtype: String,
    pub text: String,
    pub points: i32,
    pub points_awarded: f64,
    pub correct: bool,
    pub message: String,
    pub explanation: String,
    pub choices: Vec<ReviewChoice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewModule {
    pub id: Uuid,
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewResponse {
    pub attempt_id: Uuid,
    pub module: ReviewModule,
    pub completed_at: Option<DateTime<Utc>>,
    pub percent: i16,
    pub passed: bool,
    pub questions: Vec<ReviewQuestion>,
}

impl From<AttemptReview> for ReviewResponse {
    fn from(review: AttemptReview) -> Self {
        let questions = review
            .questions
            .into_iter()
            .map(|reviewed| {
                let q = reviewed.question;
                let choices = q
                    .choices
                    .iter()
                    .map(|c| ReviewChoice {
                        id: c.id,
                        text: c.text.clone(),
                        is_correct: c.is_correct,
                        selected: reviewed.selected.contains(&c.id),
                    })
                    .collect();
                ReviewQuestion {
                    id: q.question.id,
                    qtype: q.question.question_type.as_str().to_string(),
                    text: q.question.text,
                    points: q.question.points,
                    points_awarded: points(reviewed.result.earned),
                    correct: reviewed.result.correct,
                    message: reviewed.result.message,
                    explanation: q.question.explanation,
                    choices,
                }
            })
            .collect();

        Self {
            attempt_id: review.attempt.id,
            module: ReviewModule {
                id: review.module.id,
                title: review.module.title,
            },
            completed_at: review.attempt.completed_at,
            percent: review.attempt.score,
            passed: review.attempt.passed,
            questions,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptSummary {
    pub attempt_id: Uuid,
    pub module_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub score: i16,
    pub passed: bool,
    pub question_count: usize,
}

impl From<ModuleAttempt> for AttemptSummary {
    fn from(attempt: ModuleAttempt) -> Self {
        Self {
            attempt_id: attempt.id,
            module_id: attempt.module_id,
            created_at: attempt.created_at,
            completed_at: attempt.completed_at,
            score: attempt.score,
            passed: attempt.passed,
            question_count: attempt.plan.len(),
        }
    }
}
