use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use std::collections::HashMap;
use uuid::Uuid;

use crate::database::store::{AttemptStore, SopViewTracker, XpLedger};
use crate::error::{Error, Result};
use crate::models::attempt::{AnswerMap, Completion, ModuleAttempt, PresentationPlan};
use crate::models::attempt_question::{
    AnswerRecorded, AttemptQuestion, RecordAnswer, SelectionEntry,
};
use crate::models::module::Module;
use crate::models::question::{Choice, Question, QuestionWithChoices};
use crate::models::signoff::SupervisorSignoff;
use crate::models::xp_event::{NewXpEvent, XpEvent, XpFilter};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_xp_event(
        tx: &mut Transaction<'_, Postgres>,
        award: &NewXpEvent,
        now: DateTime<Utc>,
    ) -> Result<Option<XpEvent>> {
        let sql = if award.is_once_per_module() {
            r#"
            INSERT INTO xp_events (id, user_id, org_id, skill_id, module_id, source, amount, meta, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (user_id, skill_id, module_id) WHERE source = 'module_pass' DO NOTHING
            RETURNING *
            "#
        } else {
            r#"
            INSERT INTO xp_events (id, user_id, org_id, skill_id, module_id, source, amount, meta, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#
        };

        let row = sqlx::query_as::<_, XpEventRow>(sql)
            .bind(Uuid::new_v4())
            .bind(award.user_id)
            .bind(award.org_id)
            .bind(award.skill_id)
            .bind(award.module_id)
            .bind(award.source.as_str())
            .bind(award.amount)
            .bind(&award.meta)
            .bind(now)
            .fetch_optional(&mut **tx)
            .await?;

        row.map(XpEvent::try_from).transpose()
    }
}

#[async_trait]
impl AttemptStore for PgStore {
    async fn fetch_module(&self, module_id: Uuid) -> Result<Option<Module>> {
        let row = sqlx::query_as::<_, ModuleRow>(r#"SELECT * FROM modules WHERE id = $1"#)
            .bind(module_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Module::try_from).transpose()
    }

    async fn question_bank(&self, module_id: Uuid) -> Result<Vec<QuestionWithChoices>> {
        let questions = sqlx::query_as::<_, QuestionRow>(
            r#"
            SELECT id, module_id, qtype, text, display_order, points, explanation
            FROM questions
            WHERE module_id = $1
            ORDER BY display_order, id
            "#,
        )
        .bind(module_id)
        .fetch_all(&self.pool)
        .await?;

        let ids: Vec<Uuid> = questions.iter().map(|q| q.id).collect();
        let choices = sqlx::query_as::<_, Choice>(
            r#"
            SELECT id, question_id, text, is_correct, display_order
            FROM choices
            WHERE question_id = ANY($1)
            ORDER BY display_order, id
            "#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_question: HashMap<Uuid, Vec<Choice>> = HashMap::new();
        for choice in choices {
            by_question.entry(choice.question_id).or_default().push(choice);
        }

        questions
            .into_iter()
            .map(|row| {
                let question = Question::try_from(row)?;
                let choices = by_question.remove(&question.id).unwrap_or_default();
                Ok(QuestionWithChoices { question, choices })
            })
            .collect()
    }

    async fn insert_attempt(&self, attempt: &ModuleAttempt) -> Result<ModuleAttempt> {
        let row = sqlx::query_as::<_, AttemptRow>(
            r#"
            INSERT INTO module_attempts (
                id, user_id, module_id, created_at, completed_at, score, passed,
                answers, presented_questions, choice_order
            ) VALUES ($1, $2, $3, $4, NULL, 0, FALSE, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(attempt.id)
        .bind(attempt.user_id)
        .bind(attempt.module_id)
        .bind(attempt.created_at)
        .bind(Json(&attempt.answers))
        .bind(Json(&attempt.plan.presented_questions))
        .bind(Json(&attempt.plan.choice_order))
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn fetch_attempt(&self, attempt_id: Uuid, user_id: Uuid) -> Result<Option<ModuleAttempt>> {
        let row = sqlx::query_as::<_, AttemptRow>(
            r#"SELECT * FROM module_attempts WHERE id = $1 AND user_id = $2"#,
        )
        .bind(attempt_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(ModuleAttempt::from))
    }

    async fn attempts_for_user(&self, user_id: Uuid) -> Result<Vec<ModuleAttempt>> {
        let rows = sqlx::query_as::<_, AttemptRow>(
            r#"SELECT * FROM module_attempts WHERE user_id = $1 ORDER BY created_at DESC"#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(ModuleAttempt::from).collect())
    }

    async fn attempt_questions(&self, attempt_id: Uuid) -> Result<Vec<AttemptQuestion>> {
        let rows = sqlx::query_as::<_, AttemptQuestionRow>(
            r#"SELECT * FROM module_attempt_questions WHERE attempt_id = $1 ORDER BY created_at"#,
        )
        .bind(attempt_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(AttemptQuestion::from).collect())
    }

    async fn record_answer(&self, answer: &RecordAnswer) -> Result<AnswerRecorded> {
        let mut tx = self.pool.begin().await?;

        // Serializes submissions for the same attempt.
        let locked: Option<Uuid> =
            sqlx::query_scalar(r#"SELECT id FROM module_attempts WHERE id = $1 FOR UPDATE"#)
                .bind(answer.attempt_id)
                .fetch_optional(&mut *tx)
                .await?;
        if locked.is_none() {
            return Err(Error::NotFound("Attempt not found".to_string()));
        }

        let row = sqlx::query_as::<_, AttemptQuestionRow>(
            r#"
            INSERT INTO module_attempt_questions (
                id, attempt_id, question_id, selection_history, final_choices,
                correct, points_awarded, time_taken, changed_answer, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, FALSE, $9, $9)
            ON CONFLICT (attempt_id, question_id) DO UPDATE SET
                selection_history = module_attempt_questions.selection_history || EXCLUDED.selection_history,
                final_choices = EXCLUDED.final_choices,
                correct = EXCLUDED.correct,
                points_awarded = EXCLUDED.points_awarded,
                time_taken = module_attempt_questions.time_taken + EXCLUDED.time_taken,
                changed_answer = TRUE,
                updated_at = EXCLUDED.updated_at
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(answer.attempt_id)
        .bind(answer.question_id)
        .bind(Json(vec![answer.entry()]))
        .bind(Json(&answer.choice_ids))
        .bind(answer.correct)
        .bind(answer.points_awarded)
        .bind(answer.time_taken)
        .bind(answer.submitted_at)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE module_attempts
            SET answers = jsonb_set(answers, ARRAY[$2::text], $3::jsonb, true)
            WHERE id = $1 AND completed_at IS NULL
            "#,
        )
        .bind(answer.attempt_id)
        .bind(answer.question_id.to_string())
        .bind(Json(&answer.choice_ids))
        .execute(&mut *tx)
        .await?;

        let answered: Vec<Uuid> = sqlx::query_scalar(
            r#"SELECT question_id FROM module_attempt_questions WHERE attempt_id = $1"#,
        )
        .bind(answer.attempt_id)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(AnswerRecorded {
            question: row.into(),
            answered,
        })
    }

    async fn complete_attempt(
        &self,
        completion: &Completion,
        awards: &[NewXpEvent],
    ) -> Result<Option<(ModuleAttempt, Vec<XpEvent>)>> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, AttemptRow>(
            r#"
            UPDATE module_attempts
            SET completed_at = $2,
                score = $3,
                passed = $4,
                answers = $5
            WHERE id = $1 AND completed_at IS NULL
            RETURNING *
            "#,
        )
        .bind(completion.attempt_id)
        .bind(completion.completed_at)
        .bind(completion.score)
        .bind(completion.passed)
        .bind(Json(&completion.answers))
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(None);
        };

        let mut created = Vec::with_capacity(awards.len());
        for award in awards {
            if let Some(event) = Self::insert_xp_event(&mut tx, award, completion.completed_at).await? {
                created.push(event);
            }
        }

        tx.commit().await?;
        Ok(Some((row.into(), created)))
    }
}

#[async_trait]
impl XpLedger for PgStore {
    async fn xp_total(&self, filter: &XpFilter) -> Result<i64> {
        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(amount), 0)::BIGINT FROM xp_events
            WHERE user_id = $1
              AND ($2::uuid IS NULL OR org_id = $2)
              AND ($3::uuid IS NULL OR skill_id = $3)
              AND ($4::timestamptz IS NULL OR created_at >= $4)
            "#,
        )
        .bind(filter.user_id)
        .bind(filter.org_id)
        .bind(filter.skill_id)
        .bind(filter.since)
        .fetch_one(&self.pool)
        .await?;
        Ok(total)
    }

    async fn xp_events(&self, filter: &XpFilter) -> Result<Vec<XpEvent>> {
        let rows = sqlx::query_as::<_, XpEventRow>(
            r#"
            SELECT * FROM xp_events
            WHERE user_id = $1
              AND ($2::uuid IS NULL OR org_id = $2)
              AND ($3::uuid IS NULL OR skill_id = $3)
              AND ($4::timestamptz IS NULL OR created_at >= $4)
            ORDER BY created_at DESC
            "#,
        )
        .bind(filter.user_id)
        .bind(filter.org_id)
        .bind(filter.skill_id)
        .bind(filter.since)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(XpEvent::try_from).collect()
    }

    async fn record_signoff(
        &self,
        signoff: &SupervisorSignoff,
        award: &NewXpEvent,
    ) -> Result<(SupervisorSignoff, XpEvent)> {
        let mut tx = self.pool.begin().await?;

        let saved = sqlx::query_as::<_, SupervisorSignoff>(
            r#"
            INSERT INTO supervisor_signoffs (id, org_id, user_id, skill_id, supervisor_id, note, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(signoff.id)
        .bind(signoff.org_id)
        .bind(signoff.user_id)
        .bind(signoff.skill_id)
        .bind(signoff.supervisor_id)
        .bind(&signoff.note)
        .bind(signoff.created_at)
        .fetch_one(&mut *tx)
        .await?;

        let event = Self::insert_xp_event(&mut tx, award, signoff.created_at)
            .await?
            .ok_or_else(|| Error::Internal("Sign-off XP event was not created".to_string()))?;

        tx.commit().await?;
        Ok((saved, event))
    }
}

#[async_trait]
impl SopViewTracker for PgStore {
    async fn has_completed_view(&self, sop_id: Uuid, user_id: Uuid) -> Result<bool> {
        let viewed: bool = sqlx::query_scalar(
            r#"SELECT EXISTS(SELECT 1 FROM sop_views WHERE sop_id = $1 AND user_id = $2 AND completed)"#,
        )
        .bind(sop_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(viewed)
    }
}

#[derive(FromRow)]
struct ModuleRow {
    id: Uuid,
    org_id: Uuid,
    skill_id: Uuid,
    sop_id: Option<Uuid>,
    title: String,
    difficulty: i16,
    active: bool,
    passing_score: i16,
    pass_mark: i16,
    require_viewed: bool,
    question_pool_count: Option<i32>,
    shuffle_questions: bool,
    shuffle_choices: bool,
    negative_marking: bool,
    feedback_mode: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<ModuleRow> for Module {
    type Error = Error;

    fn try_from(row: ModuleRow) -> Result<Self> {
        Ok(Module {
            id: row.id,
            org_id: row.org_id,
            skill_id: row.skill_id,
            sop_id: row.sop_id,
            title: row.title,
            difficulty: row.difficulty,
            active: row.active,
            passing_score: row.passing_score,
            pass_mark: row.pass_mark,
            require_viewed: row.require_viewed,
            question_pool_count: row.question_pool_count,
            shuffle_questions: row.shuffle_questions,
            shuffle_choices: row.shuffle_choices,
            negative_marking: row.negative_marking,
            feedback_mode: row.feedback_mode.parse().map_err(Error::Internal)?,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct QuestionRow {
    id: Uuid,
    module_id: Uuid,
    qtype: String,
    text: String,
    display_order: i32,
    points: i32,
    explanation: String,
}

impl TryFrom<QuestionRow> for Question {
    type Error = Error;

    fn try_from(row: QuestionRow) -> Result<Self> {
        Ok(Question {
            id: row.id,
            module_id: row.module_id,
            question_type: row.qtype.parse().map_err(Error::Internal)?,
            text: row.text,
            display_order: row.display_order,
            points: row.points,
            explanation: row.explanation,
        })
    }
}

#[derive(FromRow)]
struct AttemptRow {
    id: Uuid,
    user_id: Uuid,
    module_id: Uuid,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    score: i16,
    passed: bool,
    answers: Json<AnswerMap>,
    presented_questions: Json<Vec<Uuid>>,
    choice_order: Json<HashMap<Uuid, Vec<Uuid>>>,
}

impl From<AttemptRow> for ModuleAttempt {
    fn from(row: AttemptRow) -> Self {
        ModuleAttempt {
            id: row.id,
            user_id: row.user_id,
            module_id: row.module_id,
            created_at: row.created_at,
            completed_at: row.completed_at,
            score: row.score,
            passed: row.passed,
            answers: row.answers.0,
            plan: PresentationPlan {
                presented_questions: row.presented_questions.0,
                choice_order: row.choice_order.0,
            },
        }
    }
}

#[derive(FromRow)]
struct AttemptQuestionRow {
    id: Uuid,
    attempt_id: Uuid,
    question_id: Uuid,
    selection_history: Json<Vec<SelectionEntry>>,
    final_choices: Json<Vec<Uuid>>,
    correct: bool,
    points_awarded: Decimal,
    time_taken: f64,
    changed_answer: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<AttemptQuestionRow> for AttemptQuestion {
    fn from(row: AttemptQuestionRow) -> Self {
        AttemptQuestion {
            id: row.id,
            attempt_id: row.attempt_id,
            question_id: row.question_id,
            selection_history: row.selection_history.0,
            final_choices: row.final_choices.0,
            correct: row.correct,
            points_awarded: row.points_awarded,
            time_taken: row.time_taken,
            changed_answer: row.changed_answer,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(FromRow)]
struct XpEventRow {
    id: Uuid,
    user_id: Uuid,
    org_id: Uuid,
    skill_id: Option<Uuid>,
    module_id: Option<Uuid>,
    source: String,
    amount: i32,
    meta: JsonValue,
    created_at: DateTime<Utc>,
}

impl TryFrom<XpEventRow> for XpEvent {
    type Error = Error;

    fn try_from(row: XpEventRow) -> Result<Self> {
        Ok(XpEvent {
            id: row.id,
            user_id: row.user_id,
            org_id: row.org_id,
            skill_id: row.skill_id,
            module_id: row.module_id,
            source: row.source.parse().map_err(Error::Internal)?,
            amount: row.amount,
            meta: row.meta,
            created_at: row.created_at,
        })
    }
}
