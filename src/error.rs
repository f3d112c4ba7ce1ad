use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use serde_json::json;

use crate::services::ai_client::AiError;

/// Error taxonomy of the progression core. Streamed endpoints surface
/// `Generation` failures as in-band error events; everything else maps to a
/// structured HTTP error via `IntoResponse`.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{0} not found")]
    NotFound(&'static str),

    /// The scenario is exhausted for this attempt. Callers distinguish
    /// "completed" from "awaiting the last answer" by comparing answered and
    /// template counts.
    #[error("no more tasks in this scenario")]
    NoMoreTasks,

    #[error("task already answered in this attempt")]
    DuplicateSubmission,

    #[error("attempt limit reached ({0})")]
    AttemptLimitExceeded(u32),

    #[error("profession has not been purchased")]
    AccessDenied,

    #[error("{0}")]
    Invalid(&'static str),

    #[error("generation failed: {0}")]
    Generation(#[from] AiError),

    #[error("storage failure: {0:#}")]
    Persistence(#[source] anyhow::Error),
}

impl EngineError {
    pub fn persistence(err: impl Into<anyhow::Error>) -> Self {
        EngineError::Persistence(err.into())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::NotFound(_) => "not_found",
            EngineError::NoMoreTasks => "no_more_tasks",
            EngineError::DuplicateSubmission => "duplicate_submission",
            EngineError::AttemptLimitExceeded(_) => "attempt_limit_exceeded",
            EngineError::AccessDenied => "access_denied",
            EngineError::Invalid(_) => "invalid_request",
            EngineError::Generation(_) => "generation_failure",
            EngineError::Persistence(_) => "persistence_failure",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            EngineError::NotFound(_) | EngineError::NoMoreTasks => StatusCode::NOT_FOUND,
            EngineError::DuplicateSubmission => StatusCode::CONFLICT,
            EngineError::AttemptLimitExceeded(_) => StatusCode::BAD_REQUEST,
            EngineError::AccessDenied => StatusCode::FORBIDDEN,
            EngineError::Invalid(_) => StatusCode::BAD_REQUEST,
            EngineError::Generation(_) => StatusCode::BAD_GATEWAY,
            EngineError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {:#}", self);
        } else {
            tracing::warn!("Request rejected: {}", self);
        }
        (
            status,
            Json(json!({
                "kind": self.kind(),
                "message": self.to_string(),
            })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_taxonomy() {
        assert_eq!(
            EngineError::NotFound("task").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            EngineError::DuplicateSubmission.status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            EngineError::AttemptLimitExceeded(3).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            EngineError::Generation(AiError::Timeout).status_code(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn kinds_are_stable_identifiers() {
        assert_eq!(EngineError::NoMoreTasks.kind(), "no_more_tasks");
        assert_eq!(
            EngineError::AttemptLimitExceeded(3).kind(),
            "attempt_limit_exceeded"
        );
    }
}
