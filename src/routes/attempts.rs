use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::attempt_dto::{
        AttemptResultResponse, AttemptSummary, NextQuestionResponse, ReviewResponse,
        StartAttemptResponse, SubmitAllRequest, SubmitAnswerRequest, SubmitAnswerResponse,
    },
    error::Result,
    middleware::auth::Claims,
    AppState,
};

#[utoipa::path(
    post,
    path = "/api/modules/{module_id}/attempts",
    params(
        ("module_id" = Uuid, Path, description = "Module ID")
    ),
    responses(
        (status = 201, description = "Attempt started", body = StartAttemptResponse),
        (status = 403, description = "SOP must be viewed first"),
        (status = 404, description = "Module not found or inactive")
    )
)]
#[axum::debug_handler]
pub async fn start_attempt(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(module_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let actor = claims.actor()?;
    let mut rng = StdRng::from_entropy();
    let started = state
        .attempt_service
        .start_attempt(&actor, module_id, &mut rng)
        .await?;
    Ok((StatusCode::CREATED, Json(StartAttemptResponse::from(started))))
}

#[utoipa::path(
    get,
    path = "/api/attempts",
    responses(
        (status = 200, description = "Attempts of the caller, newest first", body = [AttemptSummary])
    )
)]
#[axum::debug_handler]
pub async fn list_my_attempts(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse> {
    let actor = claims.actor()?;
    let attempts = state.attempt_service.list_my_attempts(&actor).await?;
    let body: Vec<AttemptSummary> = attempts.into_iter().map(AttemptSummary::from).collect();
    Ok(Json(body))
}

#[utoipa::path(
    get,
    path = "/api/attempts/{id}/next",
    params(
        ("id" = Uuid, Path, description = "Attempt ID")
    ),
    responses(
        (status = 200, description = "First unanswered question", body = NextQuestionResponse),
        (status = 404, description = "Attempt not found")
    )
)]
#[axum::debug_handler]
pub async fn next_question(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let actor = claims.actor()?;
    let next = state.attempt_service.next_question(&actor, id).await?;
    Ok(Json(NextQuestionResponse::from(next)))
}

#[utoipa::path(
    post,
    path = "/api/attempts/{id}/answer",
    params(
        ("id" = Uuid, Path, description = "Attempt ID")
    ),
    request_body = SubmitAnswerRequest,
    responses(
        (status = 200, description = "Answer recorded", body = SubmitAnswerResponse),
        (status = 400, description = "Question not part of this attempt"),
        (status = 404, description = "Attempt not found")
    )
)]
#[axum::debug_handler]
pub async fn submit_answer(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(req): Json<SubmitAnswerRequest>,
) -> Result<impl IntoResponse> {
    req.validate()?;
    let actor = claims.actor()?;
    let outcome = state
        .attempt_service
        .submit_answer(&actor, id, req.question_id, &req.choice_ids, req.time_taken)
        .await?;
    Ok(Json(SubmitAnswerResponse::from(outcome)))
}

#[utoipa::path(
    post,
    path = "/api/attempts/{id}/submit",
    params(
        ("id" = Uuid, Path, description = "Attempt ID")
    ),
    request_body = SubmitAllRequest,
    responses(
        (status = 200, description = "Attempt scored", body = AttemptResultResponse),
        (status = 400, description = "Invalid answers"),
        (status = 404, description = "Attempt not found")
    )
)]
#[axum::debug_handler]
pub async fn submit_all(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(req): Json<SubmitAllRequest>,
) -> Result<impl IntoResponse> {
    let actor = claims.actor()?;
    let result = state
        .attempt_service
        .submit_all(&actor, id, req.into_pairs())
        .await?;
    Ok(Json(AttemptResultResponse::from(result)))
}

#[utoipa::path(
    post,
    path = "/api/attempts/{id}/finish",
    params(
        ("id" = Uuid, Path, description = "Attempt ID")
    ),
    responses(
        (status = 200, description = "Attempt result", body = AttemptResultResponse),
        (status = 404, description = "Attempt not found")
    )
)]
#[axum::debug_handler]
pub async fn finish_attempt(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let actor = claims.actor()?;
    let result = state.attempt_service.finish(&actor, id).await?;
    Ok(Json(AttemptResultResponse::from(result)))
}

#[utoipa::path(
    get,
    path = "/api/attempts/{id}/review",
    params(
        ("id" = Uuid, Path, description = "Attempt ID")
    ),
    responses(
        (status = 200, description = "Questions with correctness and selections", body = ReviewResponse),
        (status = 400, description = "Nothing submitted yet"),
        (status = 404, description = "Attempt not found")
    )
)]
#[axum::debug_handler]
pub async fn review_attempt(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let actor = claims.actor()?;
    let review = state.attempt_service.review(&actor, id).await?;
    Ok(Json(ReviewResponse::from(review)))
}
