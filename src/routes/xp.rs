use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use validator::Validate;

use crate::{
    dto::xp_dto::{
        CreateSignoffPayload, SignoffResponse, XpEventResponse, XpQuery, XpSummaryResponse,
    },
    error::Result,
    middleware::auth::Claims,
    AppState,
};

#[utoipa::path(
    post,
    path = "/api/signoffs",
    request_body = CreateSignoffPayload,
    responses(
        (status = 201, description = "Sign-off recorded and XP awarded", body = SignoffResponse),
        (status = 403, description = "Caller is not a manager")
    )
)]
#[axum::debug_handler]
pub async fn create_signoff(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateSignoffPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let actor = claims.actor()?;
    let (signoff, event) = state
        .xp_service
        .create_signoff(&actor, payload.user_id, payload.skill_id, payload.note)
        .await?;
    Ok((StatusCode::CREATED, Json(SignoffResponse::new(signoff, &event))))
}

#[utoipa::path(
    get,
    path = "/api/me/xp",
    params(
        ("skill_id" = Option<Uuid>, Query, description = "Only XP for this skill"),
        ("since_days" = Option<i64>, Query, description = "Only XP earned in the last N days")
    ),
    responses(
        (status = 200, description = "Total XP and level", body = XpSummaryResponse)
    )
)]
#[axum::debug_handler]
pub async fn my_xp(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<XpQuery>,
) -> Result<impl IntoResponse> {
    query.validate()?;
    let actor = claims.actor()?;
    let summary = state
        .xp_service
        .summary(&actor, query.skill_id, query.since_days)
        .await?;
    Ok(Json(XpSummaryResponse::from(summary)))
}

#[utoipa::path(
    get,
    path = "/api/me/xp/events",
    params(
        ("skill_id" = Option<Uuid>, Query, description = "Only XP for this skill"),
        ("since_days" = Option<i64>, Query, description = "Only XP earned in the last N days")
    ),
    responses(
        (status = 200, description = "Ledger entries, newest first", body = [XpEventResponse])
    )
)]
#[axum::debug_handler]
pub async fn my_xp_events(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<XpQuery>,
) -> Result<impl IntoResponse> {
    query.validate()?;
    let actor = claims.actor()?;
    let events = state
        .xp_service
        .events(&actor, query.skill_id, query.since_days)
        .await?;
    let body: Vec<XpEventResponse> = events.into_iter().map(XpEventResponse::from).collect();
    Ok(Json(body))
}
