use chrono::Utc;
use rand::Rng;
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::database::store::{AttemptStore, SopViewTracker};
use crate::error::{Error, Result};
use crate::models::actor::Actor;
use crate::models::attempt::{AnswerMap, Completion, ModuleAttempt, PresentationPlan};
use crate::models::attempt_question::RecordAnswer;
use crate::models::module::Module;
use crate::models::question::QuestionWithChoices;
use crate::services::events::{AttemptCompleted, CompletionObserver};
use crate::services::grading_service::{FeedbackEntry, GradingService};
use crate::services::selection_service::SelectionService;
use crate::services::xp_service::XpService;

pub struct StartedAttempt {
    pub attempt: ModuleAttempt,
    /// Presented questions in plan order, choices in plan order.
    pub questions: Vec<QuestionWithChoices>,
}

pub struct NextQuestion {
    pub question: Option<QuestionWithChoices>,
    pub remaining: usize,
    pub total: usize,
}

#[derive(Debug, Clone)]
pub struct AnswerFeedback {
    pub correct: bool,
    pub earned: Decimal,
    pub max: i32,
    pub message: String,
}

pub struct SubmitOutcome {
    pub completed: bool,
    pub remaining: usize,
    pub feedback: Option<AnswerFeedback>,
}

#[derive(Debug, Clone)]
pub struct AttemptResult {
    pub attempt_id: Uuid,
    pub percent: i16,
    pub passed: bool,
    pub earned: Decimal,
    pub max: i64,
    pub feedback: Vec<FeedbackEntry>,
}

pub struct ReviewedQuestion {
    pub question: QuestionWithChoices,
    pub selected: Vec<Uuid>,
    pub result: FeedbackEntry,
}

pub struct AttemptReview {
    pub attempt: ModuleAttempt,
    pub module: Module,
    pub questions: Vec<ReviewedQuestion>,
}

#[derive(Clone)]
pub struct AttemptService {
    store: Arc<dyn AttemptStore>,
    sop_views: Arc<dyn SopViewTracker>,
    observer: Arc<dyn CompletionObserver>,
}

impl AttemptService {
    pub fn new(
        store: Arc<dyn AttemptStore>,
        sop_views: Arc<dyn SopViewTracker>,
        observer: Arc<dyn CompletionObserver>,
    ) -> Self {
        Self {
            store,
            sop_views,
            observer,
        }
    }

    pub async fn start_attempt<R>(&self, actor: &Actor, module_id: Uuid, rng: &mut R) -> Result<StartedAttempt>
    where
        R: Rng + Send + ?Sized,
    {
        let module = self
            .store
            .fetch_module(module_id)
            .await?
            .filter(|m| m.active)
            .ok_or_else(|| Error::NotFound("Module not found".to_string()))?;

        if module.require_viewed {
            if let Some(sop_id) = module.sop_id {
                if !self.sop_views.has_completed_view(sop_id, actor.user_id).await? {
                    tracing::warn!(
                        user_id = %actor.user_id,
                        module_id = %module.id,
                        sop_id = %sop_id,
                        "attempt start blocked, SOP not viewed"
                    );
                    return Err(Error::Forbidden(
                        "View the SOP before starting this module".to_string(),
                    ));
                }
            }
        }

        let bank = self.store.question_bank(module.id).await?;
        if bank.is_empty() {
            tracing::warn!(module_id = %module.id, "starting attempt on a module with no questions");
        }

        let plan = SelectionService::build_plan(&module, &bank, rng);
        let attempt = ModuleAttempt::open(actor.user_id, module.id, plan, Utc::now());
        let attempt = self.store.insert_attempt(&attempt).await?;

        tracing::info!(
            attempt_id = %attempt.id,
            user_id = %actor.user_id,
            module_id = %module.id,
            questions = attempt.plan.len(),
            "attempt started"
        );

        let questions = presented_questions(&attempt.plan, &bank);
        Ok(StartedAttempt { attempt, questions })
    }

    pub async fn list_my_attempts(&self, actor: &Actor) -> Result<Vec<ModuleAttempt>> {
        self.store.attempts_for_user(actor.user_id).await
    }

    pub async fn next_question(&self, actor: &Actor, attempt_id: Uuid) -> Result<NextQuestion> {
        let attempt = self.load_owned(actor, attempt_id).await?;
        let answered: HashSet<Uuid> = self
            .store
            .attempt_questions(attempt.id)
            .await?
            .into_iter()
            .map(|row| row.question_id)
            .collect();

        let pending: Vec<Uuid> = attempt
            .plan
            .presented_questions
            .iter()
            .copied()
            .filter(|id| !answered.contains(id))
            .collect();

        let question = match pending.first() {
            Some(_) => {
                let bank = self.store.question_bank(attempt.module_id).await?;
                pending
                    .iter()
                    .find_map(|id| bank.iter().find(|q| q.id() == *id))
                    .map(|q| with_plan_order(q, &attempt.plan))
            }
            None => None,
        };

        Ok(NextQuestion {
            question,
            remaining: pending.len(),
            total: attempt.plan.len(),
        })
    }

    pub async fn submit_answer(
        &self,
        actor: &Actor,
        attempt_id: Uuid,
        question_id: Uuid,
        choice_ids: &[Uuid],
        time_taken: Option<f64>,
    ) -> Result<SubmitOutcome> {
        let attempt = self.load_owned(actor, attempt_id).await?;
        if !attempt.plan.contains(question_id) {
            return Err(Error::BadRequest(
                "Question not part of this attempt".to_string(),
            ));
        }

        let (module, bank) = self.load_module(&attempt).await?;
        let question = bank
            .iter()
            .find(|q| q.id() == question_id)
            .ok_or_else(|| Error::NotFound("Question not found".to_string()))?;

        let selection = GradingService::normalize_selection(choice_ids);
        let grade = GradingService::grade_question(question, &selection, module.negative_marking);

        let recorded = self
            .store
            .record_answer(&RecordAnswer {
                attempt_id: attempt.id,
                question_id,
                choice_ids: selection,
                correct: grade.correct,
                points_awarded: grade.earned,
                time_taken: time_taken.unwrap_or(0.0).max(0.0),
                submitted_at: Utc::now(),
            })
            .await?;

        let answered: HashSet<Uuid> = recorded.answered.into_iter().collect();
        let remaining = attempt
            .plan
            .presented_questions
            .iter()
            .filter(|id| !answered.contains(id))
            .count();

        let mut completed = attempt.is_completed();
        if remaining == 0 && !completed {
            self.finalize(&attempt, &module, &bank, None).await?;
            completed = true;
        }

        let feedback = module
            .feedback_mode
            .reveals(question.question.question_type)
            .then(|| AnswerFeedback {
                correct: grade.correct,
                earned: grade.earned,
                max: question.question.points,
                message: grade.message,
            });

        Ok(SubmitOutcome {
            completed,
            remaining,
            feedback,
        })
    }

    /// Scores every presented question from `answers` alone and finalizes.
    /// An attempt that is already completed keeps its stored result.
    pub async fn submit_all(
        &self,
        actor: &Actor,
        attempt_id: Uuid,
        answers: Vec<(Uuid, Vec<Uuid>)>,
    ) -> Result<AttemptResult> {
        let attempt = self.load_owned(actor, attempt_id).await?;
        if attempt.plan.is_empty() {
            return Err(Error::BadRequest("Attempt has no questions".to_string()));
        }

        let mut submitted = AnswerMap::with_capacity(answers.len());
        for (question_id, choice_ids) in answers {
            if !attempt.plan.contains(question_id) {
                return Err(Error::BadRequest(
                    "Question not part of this attempt".to_string(),
                ));
            }
            submitted.insert(question_id, GradingService::normalize_selection(&choice_ids));
        }

        let (module, bank) = self.load_module(&attempt).await?;
        if attempt.is_completed() {
            return self.stored_result(&attempt, &module, &bank);
        }
        self.finalize(&attempt, &module, &bank, Some(submitted)).await
    }

    /// Finalizes with whatever has been answered so far. Idempotent.
    pub async fn finish(&self, actor: &Actor, attempt_id: Uuid) -> Result<AttemptResult> {
        let attempt = self.load_owned(actor, attempt_id).await?;
        let (module, bank) = self.load_module(&attempt).await?;

        if attempt.is_completed() {
            return self.stored_result(&attempt, &module, &bank);
        }
        if attempt.plan.is_empty() {
            return Err(Error::BadRequest("Attempt has no questions".to_string()));
        }
        self.finalize(&attempt, &module, &bank, None).await
    }

    pub async fn review(&self, actor: &Actor, attempt_id: Uuid) -> Result<AttemptReview> {
        let attempt = self.load_owned(actor, attempt_id).await?;
        let rows = self.store.attempt_questions(attempt.id).await?;
        if rows.is_empty() && attempt.answers.is_empty() {
            return Err(Error::BadRequest(
                "Submit at least one answer before reviewing".to_string(),
            ));
        }

        let (module, bank) = self.load_module(&attempt).await?;
        let rows = if attempt.is_completed() { Vec::new() } else { rows };
        let selections = GradingService::effective_selections(&attempt.plan, &rows, &attempt.answers);
        let score = GradingService::score_attempt(&attempt.plan, &module, &bank, &rows, &attempt.answers);

        let questions = presented_questions(&attempt.plan, &bank)
            .into_iter()
            .zip(score.feedback)
            .map(|(question, result)| {
                let selected = selections.get(&question.id()).cloned().unwrap_or_default();
                ReviewedQuestion {
                    question,
                    selected,
                    result,
                }
            })
            .collect();

        Ok(AttemptReview {
            attempt,
            module,
            questions,
        })
    }

    async fn load_owned(&self, actor: &Actor, attempt_id: Uuid) -> Result<ModuleAttempt> {
        self.store
            .fetch_attempt(attempt_id, actor.user_id)
            .await?
            .ok_or_else(|| Error::NotFound("Attempt not found".to_string()))
    }

    async fn load_module(&self, attempt: &ModuleAttempt) -> Result<(Module, Vec<QuestionWithChoices>)> {
        let module = self
            .store
            .fetch_module(attempt.module_id)
            .await?
            .ok_or_else(|| Error::NotFound("Module not found".to_string()))?;
        let bank = self.store.question_bank(module.id).await?;
        Ok((module, bank))
    }

    async fn finalize(
        &self,
        attempt: &ModuleAttempt,
        module: &Module,
        bank: &[QuestionWithChoices],
        bulk: Option<AnswerMap>,
    ) -> Result<AttemptResult> {
        let (score, scored) = match bulk {
            Some(answers) => (
                GradingService::score_attempt(&attempt.plan, module, bank, &[], &answers),
                answers,
            ),
            None => {
                let rows = self.store.attempt_questions(attempt.id).await?;
                (
                    GradingService::score_attempt(&attempt.plan, module, bank, &rows, &attempt.answers),
                    GradingService::effective_selections(&attempt.plan, &rows, &attempt.answers),
                )
            }
        };

        let completion = Completion {
            attempt_id: attempt.id,
            completed_at: Utc::now(),
            score: score.percent,
            passed: score.passed,
            answers: scored,
        };
        let awards = XpService::completion_awards(module, attempt.user_id, score.percent, score.passed);

        match self.store.complete_attempt(&completion, &awards).await? {
            Some((saved, xp_awarded)) => {
                tracing::info!(
                    attempt_id = %saved.id,
                    score = saved.score,
                    passed = saved.passed,
                    xp_events = xp_awarded.len(),
                    "attempt finalized"
                );
                self.observer.attempt_completed(&AttemptCompleted {
                    attempt_id: saved.id,
                    user_id: saved.user_id,
                    org_id: module.org_id,
                    module_id: module.id,
                    skill_id: module.skill_id,
                    score: saved.score,
                    passed: saved.passed,
                    completed_at: completion.completed_at,
                    xp_awarded,
                });
                Ok(AttemptResult {
                    attempt_id: saved.id,
                    percent: score.percent,
                    passed: score.passed,
                    earned: score.earned,
                    max: score.max,
                    feedback: score.feedback,
                })
            }
            None => {
                tracing::debug!(attempt_id = %attempt.id, "attempt already finalized by another request");
                let current = self
                    .store
                    .fetch_attempt(attempt.id, attempt.user_id)
                    .await?
                    .ok_or_else(|| Error::NotFound("Attempt not found".to_string()))?;
                self.stored_result(&current, module, bank)
            }
        }
    }

    /// Result of an already completed attempt: percent and pass flag as
    /// stored, points recomputed from the selections saved at finalization.
    /// Progress rows recorded after completion do not affect it.
    fn stored_result(
        &self,
        attempt: &ModuleAttempt,
        module: &Module,
        bank: &[QuestionWithChoices],
    ) -> Result<AttemptResult> {
        let score = GradingService::score_attempt(&attempt.plan, module, bank, &[], &attempt.answers);
        Ok(AttemptResult {
            attempt_id: attempt.id,
            percent: attempt.score,
            passed: attempt.passed,
            earned: score.earned,
            max: score.max,
            feedback: score.feedback,
        })
    }
}

fn with_plan_order(question: &QuestionWithChoices, plan: &PresentationPlan) -> QuestionWithChoices {
    let choices = match plan.choices_for(question.id()) {
        Some(order) => order
            .iter()
            .filter_map(|id| question.choice(*id).cloned())
            .collect(),
        None => question.choices.clone(),
    };
    QuestionWithChoices {
        question: question.question.clone(),
        choices,
    }
}

fn presented_questions(plan: &PresentationPlan, bank: &[QuestionWithChoices]) -> Vec<QuestionWithChoices> {
    plan.presented_questions
        .iter()
        .filter_map(|id| bank.iter().find(|q| q.id() == *id))
        .map(|q| with_plan_order(q, plan))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory_store::MemoryStore;
    use crate::database::store::{MockSopViewTracker, XpLedger};
    use crate::models::module::FeedbackMode;
    use crate::models::question::{Choice, Question, QuestionType};
    use crate::models::xp_event::{XpFilter, XpSource};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingObserver(AtomicUsize);

    impl CompletionObserver for CountingObserver {
        fn attempt_completed(&self, _event: &AttemptCompleted) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        observer: Arc<CountingObserver>,
        service: AttemptService,
        module: Module,
        questions: Vec<QuestionWithChoices>,
        actor: Actor,
    }

    impl Fixture {
        fn correct(&self, idx: usize) -> Vec<Uuid> {
            self.questions[idx].correct_ids().collect()
        }

        fn wrong(&self, idx: usize) -> Vec<Uuid> {
            self.questions[idx].incorrect_ids().take(1).collect()
        }

        async fn module_pass_events(&self) -> usize {
            self.store
                .xp_events(&XpFilter {
                    user_id: self.actor.user_id,
                    ..Default::default()
                })
                .await
                .unwrap()
                .into_iter()
                .filter(|e| e.source == XpSource::ModulePass)
                .count()
        }

        async fn start(&self) -> StartedAttempt {
            self.service
                .start_attempt(&self.actor, self.module.id, &mut StdRng::seed_from_u64(11))
                .await
                .unwrap()
        }
    }

    fn question(module_id: Uuid, order: i32, points: i32) -> QuestionWithChoices {
        let id = Uuid::new_v4();
        QuestionWithChoices {
            question: Question {
                id,
                module_id,
                question_type: QuestionType::Single,
                text: format!("Step {}", order),
                display_order: order,
                points,
                explanation: String::new(),
            },
            choices: (0..3)
                .map(|i| Choice {
                    id: Uuid::new_v4(),
                    question_id: id,
                    text: format!("Answer {}", i),
                    is_correct: i == 1,
                    display_order: i,
                })
                .collect(),
        }
    }

    async fn fixture_with(configure: impl FnOnce(&mut Module), question_count: usize) -> Fixture {
        let org_id = Uuid::new_v4();
        let mut module = Module {
            id: Uuid::new_v4(),
            org_id,
            skill_id: Uuid::new_v4(),
            sop_id: None,
            title: "Confined space entry".into(),
            difficulty: 2,
            active: true,
            passing_score: 70,
            pass_mark: 80,
            require_viewed: false,
            question_pool_count: None,
            shuffle_questions: true,
            shuffle_choices: true,
            negative_marking: false,
            feedback_mode: FeedbackMode::Immediate,
            created_at: Utc::now(),
        };
        configure(&mut module);

        let store = Arc::new(MemoryStore::new());
        store.add_module(module.clone()).await;
        let questions: Vec<_> = (0..question_count)
            .map(|i| question(module.id, i as i32, 10))
            .collect();
        for q in &questions {
            store.add_question(q.clone()).await;
        }

        let observer = Arc::new(CountingObserver::default());
        let service = AttemptService::new(store.clone(), store.clone(), observer.clone());

        Fixture {
            store,
            observer,
            service,
            module,
            questions,
            actor: Actor::learner(Uuid::new_v4(), org_id),
        }
    }

    async fn fixture() -> Fixture {
        fixture_with(|_| {}, 2).await
    }

    #[tokio::test]
    async fn start_rejects_inactive_module() {
        let f = fixture_with(|m| m.active = false, 2).await;

        let result = f
            .service
            .start_attempt(&f.actor, f.module.id, &mut StdRng::seed_from_u64(1))
            .await;

        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn empty_bank_yields_an_attempt_that_cannot_be_submitted() {
        let f = fixture_with(|_| {}, 0).await;

        let started = f.start().await;
        assert!(started.attempt.plan.is_empty());
        assert!(started.questions.is_empty());

        let next = f.service.next_question(&f.actor, started.attempt.id).await.unwrap();
        assert!(next.question.is_none());
        assert_eq!((next.remaining, next.total), (0, 0));

        let bulk = f.service.submit_all(&f.actor, started.attempt.id, vec![]).await;
        assert!(matches!(bulk, Err(Error::BadRequest(_))));
        let finish = f.service.finish(&f.actor, started.attempt.id).await;
        assert!(matches!(finish, Err(Error::BadRequest(_))));
        assert_eq!(f.observer.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn start_requires_viewed_sop() {
        let sop_id = Uuid::new_v4();
        let f = fixture_with(
            |m| {
                m.require_viewed = true;
                m.sop_id = Some(sop_id);
            },
            2,
        )
        .await;

        let mut views = MockSopViewTracker::new();
        views
            .expect_has_completed_view()
            .times(1)
            .returning(|_, _| Ok(false));
        let service = AttemptService::new(f.store.clone(), Arc::new(views), f.observer.clone());

        let result = service
            .start_attempt(&f.actor, f.module.id, &mut StdRng::seed_from_u64(1))
            .await;

        assert!(matches!(result, Err(Error::Forbidden(_))));
        assert!(f.store.attempts_for_user(f.actor.user_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn start_passes_gate_once_sop_viewed() {
        let sop_id = Uuid::new_v4();
        let f = fixture_with(
            |m| {
                m.require_viewed = true;
                m.sop_id = Some(sop_id);
            },
            2,
        )
        .await;

        let user_id = f.actor.user_id;
        let mut views = MockSopViewTracker::new();
        views
            .expect_has_completed_view()
            .withf(move |sop, user| *sop == sop_id && *user == user_id)
            .times(1)
            .returning(|_, _| Ok(true));
        let service = AttemptService::new(f.store.clone(), Arc::new(views), f.observer.clone());

        let started = service
            .start_attempt(&f.actor, f.module.id, &mut StdRng::seed_from_u64(1))
            .await
            .unwrap();

        assert_eq!(started.questions.len(), 2);
    }

    #[tokio::test]
    async fn started_questions_follow_the_stored_plan() {
        let f = fixture_with(|m| m.question_pool_count = Some(3), 6).await;

        let started = f.start().await;

        assert_eq!(started.attempt.plan.len(), 3);
        for (question, id) in started.questions.iter().zip(&started.attempt.plan.presented_questions) {
            assert_eq!(question.id(), *id);
            let shown: Vec<Uuid> = question.choices.iter().map(|c| c.id).collect();
            assert_eq!(started.attempt.plan.choices_for(*id).unwrap(), shown.as_slice());
        }
    }

    #[tokio::test]
    async fn incremental_flow_finalizes_after_last_question() {
        let f = fixture().await;
        let started = f.start().await;
        let attempt_id = started.attempt.id;
        let order = started.attempt.plan.presented_questions.clone();
        let idx = |id: Uuid| f.questions.iter().position(|q| q.id() == id).unwrap();

        let next = f.service.next_question(&f.actor, attempt_id).await.unwrap();
        assert_eq!(next.total, 2);
        assert_eq!(next.remaining, 2);
        assert_eq!(next.question.unwrap().id(), order[0]);

        let first = f
            .service
            .submit_answer(&f.actor, attempt_id, order[0], &f.correct(idx(order[0])), Some(4.0))
            .await
            .unwrap();
        assert!(!first.completed);
        assert_eq!(first.remaining, 1);
        assert!(first.feedback.unwrap().correct);

        let next = f.service.next_question(&f.actor, attempt_id).await.unwrap();
        assert_eq!(next.question.unwrap().id(), order[1]);

        let second = f
            .service
            .submit_answer(&f.actor, attempt_id, order[1], &f.correct(idx(order[1])), None)
            .await
            .unwrap();
        assert!(second.completed);
        assert_eq!(second.remaining, 0);

        let next = f.service.next_question(&f.actor, attempt_id).await.unwrap();
        assert!(next.question.is_none());
        assert_eq!(next.remaining, 0);

        let attempt = f
            .store
            .fetch_attempt(attempt_id, f.actor.user_id)
            .await
            .unwrap()
            .unwrap();
        assert!(attempt.is_completed());
        assert_eq!(attempt.score, 100);
        assert!(attempt.passed);
        assert_eq!(f.observer.0.load(Ordering::SeqCst), 1);
        assert_eq!(f.module_pass_events().await, 1);
    }

    #[tokio::test]
    async fn resubmission_appends_history() {
        let f = fixture_with(|_| {}, 3).await;
        let started = f.start().await;
        let q = started.attempt.plan.presented_questions[0];
        let idx = f.questions.iter().position(|x| x.id() == q).unwrap();

        f.service
            .submit_answer(&f.actor, started.attempt.id, q, &f.wrong(idx), Some(2.0))
            .await
            .unwrap();
        f.service
            .submit_answer(&f.actor, started.attempt.id, q, &f.correct(idx), Some(3.0))
            .await
            .unwrap();

        let rows = f.store.attempt_questions(started.attempt.id).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].selection_history.len(), 2);
        assert!(rows[0].changed_answer);
        assert!(rows[0].correct);
        assert_eq!(rows[0].time_taken, 5.0);
    }

    #[tokio::test]
    async fn foreign_question_is_rejected() {
        let f = fixture().await;
        let started = f.start().await;

        let result = f
            .service
            .submit_answer(&f.actor, started.attempt.id, Uuid::new_v4(), &[], None)
            .await;

        assert!(matches!(result, Err(Error::BadRequest(_))));
    }

    #[tokio::test]
    async fn other_users_cannot_see_the_attempt() {
        let f = fixture().await;
        let started = f.start().await;
        let stranger = Actor::learner(Uuid::new_v4(), f.actor.org_id);

        let result = f.service.next_question(&stranger, started.attempt.id).await;
        assert!(matches!(result, Err(Error::NotFound(_))));

        let result = f.service.finish(&stranger, started.attempt.id).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn end_feedback_mode_hides_correctness() {
        let f = fixture_with(|m| m.feedback_mode = FeedbackMode::End, 2).await;
        let started = f.start().await;
        let q = started.attempt.plan.presented_questions[0];

        let outcome = f
            .service
            .submit_answer(&f.actor, started.attempt.id, q, &[], None)
            .await
            .unwrap();

        assert!(outcome.feedback.is_none());
    }

    #[tokio::test]
    async fn finish_is_idempotent() {
        let f = fixture().await;
        let started = f.start().await;
        let q = started.attempt.plan.presented_questions[0];
        let idx = f.questions.iter().position(|x| x.id() == q).unwrap();
        f.service
            .submit_answer(&f.actor, started.attempt.id, q, &f.correct(idx), None)
            .await
            .unwrap();

        let first = f.service.finish(&f.actor, started.attempt.id).await.unwrap();
        let second = f.service.finish(&f.actor, started.attempt.id).await.unwrap();

        assert_eq!(first.percent, 50);
        assert!(!first.passed);
        assert_eq!(
            (first.percent, first.passed, first.earned, first.max),
            (second.percent, second.passed, second.earned, second.max)
        );
        assert_eq!(f.observer.0.load(Ordering::SeqCst), 1);
        assert_eq!(first.feedback.iter().filter(|e| !e.answered).count(), 1);
    }

    #[tokio::test]
    async fn bulk_submit_scores_and_awards_xp() {
        let f = fixture().await;
        let started = f.start().await;
        let answers = vec![
            (f.questions[0].id(), f.correct(0)),
            (f.questions[1].id(), f.correct(1)),
        ];

        let result = f
            .service
            .submit_all(&f.actor, started.attempt.id, answers.clone())
            .await
            .unwrap();

        assert_eq!(result.percent, 100);
        assert!(result.passed);
        assert_eq!(result.earned, Decimal::from(20));
        assert_eq!(result.max, 20);

        let events = f
            .store
            .xp_events(&XpFilter {
                user_id: f.actor.user_id,
                ..Default::default()
            })
            .await
            .unwrap();
        let mut amounts: Vec<(XpSource, i32)> = events.iter().map(|e| (e.source, e.amount)).collect();
        amounts.sort_by_key(|(_, amount)| *amount);
        assert_eq!(amounts, vec![(XpSource::Quiz, 20), (XpSource::ModulePass, 120)]);

        let again = f
            .service
            .submit_all(&f.actor, started.attempt.id, vec![])
            .await
            .unwrap();
        assert_eq!((again.percent, again.passed, again.max), (100, true, 20));
        assert_eq!(f.observer.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn bulk_submit_treats_missing_answers_as_empty() {
        let f = fixture().await;
        let started = f.start().await;

        let result = f
            .service
            .submit_all(&f.actor, started.attempt.id, vec![(f.questions[0].id(), f.correct(0))])
            .await
            .unwrap();

        assert_eq!(result.percent, 50);
        assert!(!result.passed);
        assert_eq!(f.module_pass_events().await, 0);
    }

    #[tokio::test]
    async fn completed_result_follows_the_selections_it_was_scored_from() {
        let f = fixture().await;
        let started = f.start().await;
        let attempt_id = started.attempt.id;
        let order = started.attempt.plan.presented_questions.clone();
        let idx = |id: Uuid| f.questions.iter().position(|q| q.id() == id).unwrap();
        let (first, second) = (order[0], order[1]);

        f.service
            .submit_answer(&f.actor, attempt_id, first, &f.correct(idx(first)), None)
            .await
            .unwrap();

        let bulk = f
            .service
            .submit_all(
                &f.actor,
                attempt_id,
                vec![(first, f.wrong(idx(first))), (second, f.wrong(idx(second)))],
            )
            .await
            .unwrap();
        assert_eq!((bulk.percent, bulk.earned, bulk.max), (0, Decimal::ZERO, 20));

        let finished = f.service.finish(&f.actor, attempt_id).await.unwrap();
        assert_eq!(
            (finished.percent, finished.passed, finished.earned),
            (bulk.percent, bulk.passed, bulk.earned)
        );
        assert_eq!(finished.feedback, bulk.feedback);

        let review = f.service.review(&f.actor, attempt_id).await.unwrap();
        assert_eq!(review.attempt.score, 0);
        assert_eq!(review.questions[0].selected, f.wrong(idx(first)));
        assert!(!review.questions[0].result.correct);

        let late = f
            .service
            .submit_answer(&f.actor, attempt_id, second, &f.correct(idx(second)), None)
            .await
            .unwrap();
        assert!(late.completed);

        let finished = f.service.finish(&f.actor, attempt_id).await.unwrap();
        assert_eq!(finished.earned, Decimal::ZERO);
        let review = f.service.review(&f.actor, attempt_id).await.unwrap();
        assert_eq!(review.questions[1].selected, f.wrong(idx(second)));
        assert_eq!(f.observer.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn incremental_result_is_stable_after_completion() {
        let f = fixture().await;
        let started = f.start().await;
        let attempt_id = started.attempt.id;
        let order = started.attempt.plan.presented_questions.clone();
        let idx = |id: Uuid| f.questions.iter().position(|q| q.id() == id).unwrap();

        f.service
            .submit_answer(&f.actor, attempt_id, order[0], &f.wrong(idx(order[0])), None)
            .await
            .unwrap();
        f.service
            .submit_answer(&f.actor, attempt_id, order[1], &f.correct(idx(order[1])), None)
            .await
            .unwrap();
        let before = f.service.finish(&f.actor, attempt_id).await.unwrap();
        assert_eq!((before.percent, before.earned), (50, Decimal::from(10)));

        f.service
            .submit_answer(&f.actor, attempt_id, order[0], &f.correct(idx(order[0])), None)
            .await
            .unwrap();

        let after = f.service.finish(&f.actor, attempt_id).await.unwrap();
        assert_eq!((after.percent, after.earned), (50, Decimal::from(10)));
        let review = f.service.review(&f.actor, attempt_id).await.unwrap();
        assert_eq!(review.questions[0].selected, f.wrong(idx(order[0])));

        let rows = f.store.attempt_questions(attempt_id).await.unwrap();
        let row = rows.iter().find(|r| r.question_id == order[0]).unwrap();
        assert_eq!(row.selection_history.len(), 2);
    }

    #[tokio::test]
    async fn module_pass_xp_is_granted_once_across_attempts() {
        let f = fixture().await;
        let all_correct = || {
            vec![
                (f.questions[0].id(), f.correct(0)),
                (f.questions[1].id(), f.correct(1)),
            ]
        };

        for _ in 0..2 {
            let started = f.start().await;
            let result = f
                .service
                .submit_all(&f.actor, started.attempt.id, all_correct())
                .await
                .unwrap();
            assert!(result.passed);
        }

        let events = f
            .store
            .xp_events(&XpFilter {
                user_id: f.actor.user_id,
                ..Default::default()
            })
            .await
            .unwrap();
        let count = |source: XpSource| events.iter().filter(|e| e.source == source).count();
        assert_eq!(count(XpSource::ModulePass), 1);
        assert_eq!(count(XpSource::Quiz), 2);
        assert_eq!(f.observer.0.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn review_requires_a_submission() {
        let f = fixture().await;
        let started = f.start().await;

        let result = f.service.review(&f.actor, started.attempt.id).await;
        assert!(matches!(result, Err(Error::BadRequest(_))));

        let q = started.attempt.plan.presented_questions[0];
        let idx = f.questions.iter().position(|x| x.id() == q).unwrap();
        f.service
            .submit_answer(&f.actor, started.attempt.id, q, &f.wrong(idx), None)
            .await
            .unwrap();

        let review = f.service.review(&f.actor, started.attempt.id).await.unwrap();
        assert_eq!(review.questions.len(), 2);
        assert_eq!(review.questions[0].question.id(), q);
        assert_eq!(review.questions[0].selected, f.wrong(idx));
        assert!(!review.questions[0].result.correct);
        assert!(review.questions[1].selected.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_last_answers_finalize_once() {
        let f = fixture().await;
        let started = f.start().await;
        let attempt_id = started.attempt.id;

        let submit = |idx: usize| {
            let service = f.service.clone();
            let actor = f.actor;
            let question_id = f.questions[idx].id();
            let choices = f.correct(idx);
            tokio::spawn(async move {
                service
                    .submit_answer(&actor, attempt_id, question_id, &choices, None)
                    .await
            })
        };

        let (a, b) = tokio::join!(submit(0), submit(1));
        a.unwrap().unwrap();
        b.unwrap().unwrap();

        assert_eq!(f.observer.0.load(Ordering::SeqCst), 1);
        assert_eq!(f.module_pass_events().await, 1);
    }
}
