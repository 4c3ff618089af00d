use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::database::store::{AttemptStore, SopViewTracker, XpLedger};
use crate::error::{Error, Result};
use crate::models::attempt::{Completion, ModuleAttempt};
use crate::models::attempt_question::{AnswerRecorded, AttemptQuestion, RecordAnswer};
use crate::models::module::Module;
use crate::models::question::QuestionWithChoices;
use crate::models::signoff::SupervisorSignoff;
use crate::models::xp_event::{NewXpEvent, XpEvent, XpFilter, XpSource};

#[derive(Default)]
struct State {
    modules: HashMap<Uuid, Module>,
    questions: Vec<QuestionWithChoices>,
    sop_views: HashSet<(Uuid, Uuid)>,
    attempts: HashMap<Uuid, ModuleAttempt>,
    attempt_questions: Vec<AttemptQuestion>,
    xp_events: Vec<XpEvent>,
    signoffs: Vec<SupervisorSignoff>,
}

impl State {
    fn push_award(&mut self, award: &NewXpEvent, now: chrono::DateTime<chrono::Utc>) -> Option<XpEvent> {
        if award.is_once_per_module() {
            let exists = self.xp_events.iter().any(|e| {
                e.source == XpSource::ModulePass
                    && e.user_id == award.user_id
                    && e.skill_id == award.skill_id
                    && e.module_id == award.module_id
            });
            if exists {
                return None;
            }
        }
        let event = award.clone().into_event(now);
        self.xp_events.push(event.clone());
        Some(event)
    }
}

/// In-process store with the same atomicity as `PgStore`: every operation
/// runs under one lock.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_module(&self, module: Module) {
        self.state.lock().await.modules.insert(module.id, module);
    }

    pub async fn add_question(&self, question: QuestionWithChoices) {
        self.state.lock().await.questions.push(question);
    }

    pub async fn mark_sop_viewed(&self, sop_id: Uuid, user_id: Uuid) {
        self.state.lock().await.sop_views.insert((sop_id, user_id));
    }

    pub async fn signoff_count(&self) -> usize {
        self.state.lock().await.signoffs.len()
    }
}

#[async_trait]
impl AttemptStore for MemoryStore {
    async fn fetch_module(&self, module_id: Uuid) -> Result<Option<Module>> {
        Ok(self.state.lock().await.modules.get(&module_id).cloned())
    }

    async fn question_bank(&self, module_id: Uuid) -> Result<Vec<QuestionWithChoices>> {
        let state = self.state.lock().await;
        let mut bank: Vec<QuestionWithChoices> = state
            .questions
            .iter()
            .filter(|q| q.question.module_id == module_id)
            .cloned()
            .collect();
        bank.sort_by_key(|q| (q.question.display_order, q.question.id));
        for q in &mut bank {
            q.choices.sort_by_key(|c| (c.display_order, c.id));
        }
        Ok(bank)
    }

    async fn insert_attempt(&self, attempt: &ModuleAttempt) -> Result<ModuleAttempt> {
        let mut state = self.state.lock().await;
        state.attempts.insert(attempt.id, attempt.clone());
        Ok(attempt.clone())
    }

    async fn fetch_attempt(&self, attempt_id: Uuid, user_id: Uuid) -> Result<Option<ModuleAttempt>> {
        let state = self.state.lock().await;
        Ok(state
            .attempts
            .get(&attempt_id)
            .filter(|a| a.user_id == user_id)
            .cloned())
    }

    async fn attempts_for_user(&self, user_id: Uuid) -> Result<Vec<ModuleAttempt>> {
        let state = self.state.lock().await;
        let mut attempts: Vec<ModuleAttempt> = state
            .attempts
            .values()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect();
        attempts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(attempts)
    }

    async fn attempt_questions(&self, attempt_id: Uuid) -> Result<Vec<AttemptQuestion>> {
        let state = self.state.lock().await;
        Ok(state
            .attempt_questions
            .iter()
            .filter(|row| row.attempt_id == attempt_id)
            .cloned()
            .collect())
    }

    async fn record_answer(&self, answer: &RecordAnswer) -> Result<AnswerRecorded> {
        let mut state = self.state.lock().await;
        if !state.attempts.contains_key(&answer.attempt_id) {
            return Err(Error::NotFound("Attempt not found".to_string()));
        }

        let existing = state
            .attempt_questions
            .iter_mut()
            .find(|row| row.attempt_id == answer.attempt_id && row.question_id == answer.question_id);

        let row = match existing {
            Some(row) => {
                row.selection_history.push(answer.entry());
                row.final_choices = answer.choice_ids.clone();
                row.correct = answer.correct;
                row.points_awarded = answer.points_awarded;
                row.time_taken += answer.time_taken;
                row.changed_answer = true;
                row.updated_at = answer.submitted_at;
                row.clone()
            }
            None => {
                let row = AttemptQuestion {
                    id: Uuid::new_v4(),
                    attempt_id: answer.attempt_id,
                    question_id: answer.question_id,
                    selection_history: vec![answer.entry()],
                    final_choices: answer.choice_ids.clone(),
                    correct: answer.correct,
                    points_awarded: answer.points_awarded,
                    time_taken: answer.time_taken,
                    changed_answer: false,
                    created_at: answer.submitted_at,
                    updated_at: answer.submitted_at,
                };
                state.attempt_questions.push(row.clone());
                row
            }
        };

        if let Some(attempt) = state
            .attempts
            .get_mut(&answer.attempt_id)
            .filter(|a| !a.is_completed())
        {
            attempt
                .answers
                .insert(answer.question_id, answer.choice_ids.clone());
        }

        let answered = state
            .attempt_questions
            .iter()
            .filter(|r| r.attempt_id == answer.attempt_id)
            .map(|r| r.question_id)
            .collect();

        Ok(AnswerRecorded {
            question: row,
            answered,
        })
    }

    async fn complete_attempt(
        &self,
        completion: &Completion,
        awards: &[NewXpEvent],
    ) -> Result<Option<(ModuleAttempt, Vec<XpEvent>)>> {
        let mut state = self.state.lock().await;

        let attempt = match state.attempts.get_mut(&completion.attempt_id) {
            Some(attempt) if !attempt.is_completed() => attempt,
            _ => return Ok(None),
        };
        attempt.completed_at = Some(completion.completed_at);
        attempt.score = completion.score;
        attempt.passed = completion.passed;
        attempt.answers = completion.answers.clone();
        let attempt = attempt.clone();

        let created = awards
            .iter()
            .filter_map(|award| state.push_award(award, completion.completed_at))
            .collect();

        Ok(Some((attempt, created)))
    }
}

#[async_trait]
impl XpLedger for MemoryStore {
    async fn xp_total(&self, filter: &XpFilter) -> Result<i64> {
        let state = self.state.lock().await;
        Ok(state
            .xp_events
            .iter()
            .filter(|e| filter.matches(e))
            .map(|e| i64::from(e.amount))
            .sum())
    }

    async fn xp_events(&self, filter: &XpFilter) -> Result<Vec<XpEvent>> {
        let state = self.state.lock().await;
        let mut events: Vec<XpEvent> = state
            .xp_events
            .iter()
            .rev()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        events.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(events)
    }

    async fn record_signoff(
        &self,
        signoff: &SupervisorSignoff,
        award: &NewXpEvent,
    ) -> Result<(SupervisorSignoff, XpEvent)> {
        let mut state = self.state.lock().await;
        let event = state
            .push_award(award, signoff.created_at)
            .ok_or_else(|| Error::Internal("Sign-off XP event was not created".to_string()))?;
        state.signoffs.push(signoff.clone());
        Ok((signoff.clone(), event))
    }
}

#[async_trait]
impl SopViewTracker for MemoryStore {
    async fn has_completed_view(&self, sop_id: Uuid, user_id: Uuid) -> Result<bool> {
        Ok(self.state.lock().await.sop_views.contains(&(sop_id, user_id)))
    }
}
