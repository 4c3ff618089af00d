use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::HashSet;
use uuid::Uuid;

use crate::models::attempt::{AnswerMap, PresentationPlan};
use crate::models::attempt_question::AttemptQuestion;
use crate::models::module::Module;
use crate::models::question::{QuestionType, QuestionWithChoices};

const NOT_ANSWERED: &str = "Not answered.";

/// Result of grading one selection against one question.
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionGrade {
    pub earned: Decimal,
    pub correct: bool,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackEntry {
    pub question_id: Uuid,
    pub answered: bool,
    pub correct: bool,
    pub earned: Decimal,
    pub max: i32,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttemptScore {
    pub earned: Decimal,
    pub max: i64,
    pub percent: i16,
    pub passed: bool,
    pub feedback: Vec<FeedbackEntry>,
}

pub struct GradingService;

impl GradingService {
    /// Drops repeated choice ids, keeping the first occurrence.
    pub fn normalize_selection(selected: &[Uuid]) -> Vec<Uuid> {
        let mut seen = HashSet::with_capacity(selected.len());
        selected.iter().copied().filter(|id| seen.insert(*id)).collect()
    }

    pub fn grade_question(
        question: &QuestionWithChoices,
        selected: &[Uuid],
        negative_marking: bool,
    ) -> QuestionGrade {
        let selected = Self::normalize_selection(selected);
        let explanation = question.question.explanation.trim();
        let points = Decimal::from(question.question.points);

        match question.question.question_type {
            QuestionType::Single | QuestionType::TrueFalse => {
                let correct = selected.len() == 1
                    && question.choice(selected[0]).map_or(false, |c| c.is_correct);
                let message = if !explanation.is_empty() {
                    explanation.to_string()
                } else if correct {
                    "Correct.".to_string()
                } else {
                    "Incorrect.".to_string()
                };
                QuestionGrade {
                    earned: if correct { points } else { Decimal::ZERO },
                    correct,
                    message,
                }
            }
            QuestionType::Multi => {
                let correct_ids: HashSet<Uuid> = question.correct_ids().collect();
                let incorrect_ids: HashSet<Uuid> = question.incorrect_ids().collect();

                if correct_ids.is_empty() {
                    tracing::warn!(question_id = %question.id(), "multi question has no correct choices");
                    return QuestionGrade {
                        earned: Decimal::ZERO,
                        correct: false,
                        message: "No correct choices configured.".to_string(),
                    };
                }

                let sel_correct = selected.iter().filter(|id| correct_ids.contains(id)).count();
                let sel_wrong = selected.iter().filter(|id| incorrect_ids.contains(id)).count();

                let mut fraction = Decimal::from(sel_correct) / Decimal::from(correct_ids.len());
                if negative_marking {
                    fraction -= Decimal::from(sel_wrong) / Decimal::from(incorrect_ids.len().max(1));
                }
                let fraction = fraction.max(Decimal::ZERO).min(Decimal::ONE);
                let earned = (points * fraction)
                    .round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven);

                let correct = sel_correct == correct_ids.len() && sel_wrong == 0;
                let mut message = if sel_wrong > 0 && negative_marking {
                    "Some incorrect choices selected.".to_string()
                } else if sel_correct < correct_ids.len() {
                    "You missed some correct choices.".to_string()
                } else {
                    "Correct.".to_string()
                };
                if !explanation.is_empty() {
                    message.push(' ');
                    message.push_str(explanation);
                }

                QuestionGrade {
                    earned,
                    correct,
                    message,
                }
            }
        }
    }

    /// `round(100 * earned / max)`, ties to even; zero when nothing is scorable.
    pub fn percent(earned: Decimal, max: i64) -> i16 {
        if max <= 0 {
            return 0;
        }
        let pct = (Decimal::from(100) * earned / Decimal::from(max))
            .round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven);
        pct.to_i16().unwrap_or(0).clamp(0, 100)
    }

    pub fn passed(percent: i16, module: &Module) -> bool {
        percent >= module.effective_pass_mark()
    }

    /// The selection each presented question is scored from: its progress
    /// row when one exists, else its entry in `answers`. Unanswered
    /// questions have no entry.
    pub fn effective_selections(
        plan: &PresentationPlan,
        rows: &[AttemptQuestion],
        answers: &AnswerMap,
    ) -> AnswerMap {
        plan.presented_questions
            .iter()
            .filter_map(|question_id| {
                rows.iter()
                    .find(|r| r.question_id == *question_id)
                    .map(|r| r.final_choices.clone())
                    .or_else(|| answers.get(question_id).cloned())
                    .map(|selected| (*question_id, selected))
            })
            .collect()
    }

    /// The single aggregation used by every way of finishing an attempt.
    ///
    /// Walks the presented questions in plan order. A question's selection is
    /// taken from its progress row when one exists, else from `answers`;
    /// questions with neither earn nothing. Presented ids missing from the
    /// bank are skipped.
    pub fn score_attempt(
        plan: &PresentationPlan,
        module: &Module,
        bank: &[QuestionWithChoices],
        rows: &[AttemptQuestion],
        answers: &AnswerMap,
    ) -> AttemptScore {
        let mut earned = Decimal::ZERO;
        let mut max: i64 = 0;
        let mut feedback = Vec::with_capacity(plan.len());

        for question_id in &plan.presented_questions {
            let Some(question) = bank.iter().find(|q| q.id() == *question_id) else {
                continue;
            };
            let points = question.question.points;
            max += i64::from(points);

            let entry = if let Some(row) = rows.iter().find(|r| r.question_id == *question_id) {
                let grade = Self::grade_question(question, &row.final_choices, module.negative_marking);
                FeedbackEntry {
                    question_id: *question_id,
                    answered: true,
                    correct: row.correct,
                    earned: row.points_awarded,
                    max: points,
                    message: grade.message,
                }
            } else if let Some(selected) = answers.get(question_id) {
                let grade = Self::grade_question(question, selected, module.negative_marking);
                FeedbackEntry {
                    question_id: *question_id,
                    answered: true,
                    correct: grade.correct,
                    earned: grade.earned,
                    max: points,
                    message: grade.message,
                }
            } else {
                FeedbackEntry {
                    question_id: *question_id,
                    answered: false,
                    correct: false,
                    earned: Decimal::ZERO,
                    max: points,
                    message: NOT_ANSWERED.to_string(),
                }
            };

            earned += entry.earned;
            feedback.push(entry);
        }

        let percent = Self::percent(earned, max);
        AttemptScore {
            earned,
            max,
            percent,
            passed: Self::passed(percent, module),
            feedback,
        }
    }
}
