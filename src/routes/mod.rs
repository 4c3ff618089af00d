pub mod attempts;
pub mod health;
pub mod xp;

use axum::{
    response::Json,
    routing::{get, post},
    Router,
};
use utoipa::OpenApi;

use crate::middleware::auth::require_bearer_auth;
use crate::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(
        attempts::start_attempt,
        attempts::list_my_attempts,
        attempts::next_question,
        attempts::submit_answer,
        attempts::submit_all,
        attempts::finish_attempt,
        attempts::review_attempt,
        xp::create_signoff,
        xp::my_xp,
        xp::my_xp_events,
    ),
    tags((name = "attempts", description = "Quiz attempt engine"))
)]
pub struct ApiDoc;

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Full HTTP surface. Everything under `/api` except the OpenAPI document
/// requires a bearer token.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route(
            "/api/modules/:module_id/attempts",
            post(attempts::start_attempt),
        )
        .route("/api/attempts", get(attempts::list_my_attempts))
        .route("/api/attempts/:id/next", get(attempts::next_question))
        .route("/api/attempts/:id/answer", post(attempts::submit_answer))
        .route("/api/attempts/:id/submit", post(attempts::submit_all))
        .route("/api/attempts/:id/finish", post(attempts::finish_attempt))
        .route("/api/attempts/:id/review", get(attempts::review_attempt))
        .route("/api/signoffs", post(xp::create_signoff))
        .route("/api/me/xp", get(xp::my_xp))
        .route("/api/me/xp/events", get(xp::my_xp_events))
        .route_layer(axum::middleware::from_fn(require_bearer_auth));

    Router::new()
        .route("/health", get(health::health))
        .route("/api/openapi.json", get(openapi_json))
        .merge(api)
        .with_state(state)
}
