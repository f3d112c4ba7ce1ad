use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Extension, Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::error::EngineError;
use crate::middlewares::auth::JwtClaims;
use crate::models::{AttemptStatus, AttemptSummary};
use crate::services::AppState;

#[derive(Serialize)]
pub struct ProgressResponse {
    pub attempt_number: u32,
    pub status: AttemptStatus,
    pub current_task_order: u32,
    pub total_tasks: u32,
    pub has_report: bool,
}

/// GET /api/v1/professions
pub async fn list_professions(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, EngineError> {
    let professions = state
        .store
        .list_professions()
        .await
        .map_err(EngineError::persistence)?;
    Ok(Json(professions))
}

/// GET /api/v1/professions/{id}
pub async fn get_profession(
    State(state): State<Arc<AppState>>,
    Path(profession_id): Path<String>,
) -> Result<impl IntoResponse, EngineError> {
    let profession = state
        .attempt_service()
        .get_profession(&profession_id)
        .await?;
    Ok(Json(profession))
}

/// GET /api/v1/professions/{id}/progress
///
/// Seeds attempt #1 on first contact with a purchased profession.
pub async fn get_progress(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(profession_id): Path<String>,
) -> Result<impl IntoResponse, EngineError> {
    let attempt = state
        .attempt_service()
        .current_or_seed(&claims.sub, &profession_id)
        .await?;

    let scenario = state
        .store
        .get_scenario(&profession_id)
        .await
        .map_err(EngineError::persistence)?
        .ok_or(EngineError::NotFound("scenario"))?;
    let total_tasks = state
        .store
        .count_tasks(&scenario.id)
        .await
        .map_err(EngineError::persistence)?;

    Ok(Json(ProgressResponse {
        attempt_number: attempt.attempt_number,
        status: attempt.status,
        current_task_order: attempt.current_task_order,
        total_tasks,
        has_report: attempt.final_report.is_some(),
    }))
}

/// GET /api/v1/professions/{id}/attempts
pub async fn get_history(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(profession_id): Path<String>,
) -> Result<impl IntoResponse, EngineError> {
    let history = state
        .attempt_service()
        .history(&claims.sub, &profession_id)
        .await?;
    Ok(Json(history))
}

/// GET /api/v1/professions/{id}/attempts/{number}
pub async fn get_attempt(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path((profession_id, attempt_number)): Path<(String, u32)>,
) -> Result<impl IntoResponse, EngineError> {
    let attempt = state
        .attempt_service()
        .by_number(&claims.sub, &profession_id, attempt_number)
        .await?;
    Ok(Json(AttemptSummary::from(&attempt)))
}

/// POST /api/v1/professions/{id}/restart
pub async fn restart_attempt(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(profession_id): Path<String>,
) -> Result<impl IntoResponse, EngineError> {
    let attempt = state
        .attempt_service()
        .restart(&claims.sub, &profession_id)
        .await?;
    Ok(Json(AttemptSummary::from(&attempt)))
}
