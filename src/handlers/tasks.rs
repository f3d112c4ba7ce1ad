use axum::{
    extract::{Path, Query, State},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    Extension, Json,
};
use futures::stream::{self, Stream};
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::error::EngineError;
use crate::extractors::AppJson;
use crate::metrics::SSE_CONNECTIONS_ACTIVE;
use crate::middlewares::auth::JwtClaims;
use crate::models::{ReportResponse, SubmitAnswerRequest, TaskStreamEvent};
use crate::services::AppState;

/// Decrements the active-connection gauge when the SSE stream is dropped,
/// including on client disconnect.
struct ConnectionGauge;

impl ConnectionGauge {
    fn new() -> Self {
        SSE_CONNECTIONS_ACTIVE.inc();
        ConnectionGauge
    }
}

impl Drop for ConnectionGauge {
    fn drop(&mut self) {
        SSE_CONNECTIONS_ACTIVE.dec();
    }
}

fn event_stream(
    rx: mpsc::Receiver<TaskStreamEvent>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    let gauge = ConnectionGauge::new();
    stream::unfold((rx, gauge), |(mut rx, gauge)| async move {
        let event = rx.recv().await?;
        let sse = Event::default()
            .event(event.event_name())
            .data(event.to_sse_data());
        Some((Ok(sse), (rx, gauge)))
    })
}

/// GET /api/v1/tasks/{profession_id}/current
///
/// Streams the current task: metadata, then tokens (unless cached), then
/// done. A completed attempt yields no more tasks; its report is read
/// through the report endpoint.
pub async fn get_current_task(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(profession_id): Path<String>,
) -> Result<impl IntoResponse, EngineError> {
    let rx = state
        .engine()
        .fetch_current(&claims.sub, &profession_id)
        .await?;
    Ok(Sse::new(event_stream(rx)).keep_alive(KeepAlive::default()))
}

/// POST /api/v1/tasks/{task_id}/submit
///
/// Persists the answer to the addressed task, then streams the next
/// question, or the final report when the last task was just answered.
/// Submitting an already answered task is rejected as a duplicate.
pub async fn submit_answer(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(task_id): Path<String>,
    AppJson(req): AppJson<SubmitAnswerRequest>,
) -> Result<impl IntoResponse, EngineError> {
    if req.answer.trim().is_empty() {
        return Err(EngineError::Invalid("answer must not be empty"));
    }
    let rx = state
        .engine()
        .submit_answer(&claims.sub, &task_id, req.answer.trim())
        .await?;
    Ok(Sse::new(event_stream(rx)).keep_alive(KeepAlive::default()))
}

#[derive(Deserialize)]
pub struct ReportQuery {
    pub attempt: Option<u32>,
}

/// GET /api/v1/tasks/{profession_id}/report?attempt=N
pub async fn get_report(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(profession_id): Path<String>,
    Query(query): Query<ReportQuery>,
) -> Result<impl IntoResponse, EngineError> {
    let attempt = state
        .engine()
        .final_report(&claims.sub, &profession_id, query.attempt)
        .await?;
    let final_report = attempt
        .final_report
        .clone()
        .ok_or(EngineError::NotFound("report"))?;
    Ok(Json(ReportResponse {
        attempt_number: attempt.attempt_number,
        final_report,
        completed_at: attempt.completed_at,
    }))
}
