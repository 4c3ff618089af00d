#![allow(dead_code)]

use std::env;
use std::sync::{Arc, Once};

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::Value as JsonValue;
use tower::ServiceExt;
use uuid::Uuid;

use training_backend::database::memory_store::MemoryStore;
use training_backend::middleware::auth::Claims;
use training_backend::models::module::{FeedbackMode, Module};
use training_backend::models::question::{Choice, Question, QuestionType, QuestionWithChoices};
use training_backend::{routes, AppState};

const JWT_SECRET: &str = "test_secret_key";

static INIT: Once = Once::new();

pub fn init() {
    INIT.call_once(|| {
        env::set_var("SERVER_ADDRESS", "127.0.0.1:0");
        env::set_var("DATABASE_URL", "postgres://localhost/unused");
        env::set_var("JWT_SECRET", JWT_SECRET);
        training_backend::config::init_config().expect("init config");
    });
}

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
}

pub async fn app() -> TestApp {
    init();
    let store = Arc::new(MemoryStore::new());
    let router = routes::router(AppState::from_store(store.clone()));
    TestApp { router, store }
}

pub fn token(user_id: Uuid, org_id: Uuid, role: Option<&str>) -> String {
    let claims = Claims {
        sub: user_id.to_string(),
        org: org_id.to_string(),
        exp: (Utc::now().timestamp() + 3600) as usize,
        role: role.map(str::to_string),
    };
    tokio_test::assert_ok!(encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    ))
}

impl TestApp {
    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<JsonValue>,
    ) -> (StatusCode, JsonValue) {
        send(&self.router, method, uri, token, body).await
    }
}

pub async fn send(
    router: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<JsonValue>,
) -> (StatusCode, JsonValue) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let req = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let res = router.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        JsonValue::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(JsonValue::Null)
    };
    (status, json)
}

pub struct Seeded {
    pub module: Module,
    pub questions: Vec<QuestionWithChoices>,
}

impl Seeded {
    pub fn question(&self, id: Uuid) -> &QuestionWithChoices {
        self.questions.iter().find(|q| q.id() == id).unwrap()
    }

    pub fn correct(&self, id: Uuid) -> Vec<Uuid> {
        self.question(id).correct_ids().collect()
    }
}

/// A module in `org_id` with `count` single-answer questions worth 10 points each.
pub async fn seed_module(
    store: &MemoryStore,
    org_id: Uuid,
    count: usize,
    configure: impl FnOnce(&mut Module),
) -> Seeded {
    let mut module = Module {
        id: Uuid::new_v4(),
        org_id,
        skill_id: Uuid::new_v4(),
        sop_id: None,
        title: "Warehouse safety".into(),
        difficulty: 2,
        active: true,
        passing_score: 80,
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
    store.add_module(module.clone()).await;

    let mut questions = Vec::with_capacity(count);
    for i in 0..count {
        let id = Uuid::new_v4();
        let question = QuestionWithChoices {
            question: Question {
                id,
                module_id: module.id,
                question_type: QuestionType::Single,
                text: format!("Safety question {}", i + 1),
                display_order: i as i32,
                points: 10,
                explanation: String::new(),
            },
            choices: (0..4)
                .map(|c| Choice {
                    id: Uuid::new_v4(),
                    question_id: id,
                    text: format!("Choice {}", c),
                    is_correct: c == 2,
                    display_order: c,
                })
                .collect(),
        };
        store.add_question(question.clone()).await;
        questions.push(question);
    }

    Seeded { module, questions }
}

pub fn uuids(value: &JsonValue) -> Vec<Uuid> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().and_then(|s| Uuid::parse_str(s).ok()))
                .collect()
        })
        .unwrap_or_default()
}

pub fn ids_of(value: &JsonValue) -> Vec<Uuid> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v["id"].as_str().and_then(|s| Uuid::parse_str(s).ok()))
                .collect()
        })
        .unwrap_or_default()
}
