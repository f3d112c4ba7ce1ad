use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Extension, Json,
};
use std::sync::Arc;

use crate::error::EngineError;
use crate::extractors::AppJson;
use crate::middlewares::auth::JwtClaims;
use crate::models::CreatePaymentRequest;
use crate::services::payment_service::WebhookEvent;
use crate::services::AppState;

/// GET /api/v1/payments/packages
pub async fn list_packages(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, EngineError> {
    let packages = state
        .store
        .list_packages()
        .await
        .map_err(EngineError::persistence)?;
    Ok(Json(packages))
}

/// POST /api/v1/payments
pub async fn create_payment(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    AppJson(req): AppJson<CreatePaymentRequest>,
) -> Result<impl IntoResponse, EngineError> {
    let created = state
        .payment_service()?
        .create_payment(&claims.sub, &req)
        .await?;
    Ok(Json(created))
}

/// POST /api/v1/payments/webhook
///
/// Provider callbacks carry no user JWT, so this route stays public; the
/// payment id in the metadata is the only thing acted on.
pub async fn webhook(
    State(state): State<Arc<AppState>>,
    AppJson(event): AppJson<WebhookEvent>,
) -> Result<impl IntoResponse, EngineError> {
    state.payment_service()?.handle_webhook(&event).await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

/// POST /api/v1/payments/{id}/confirm
pub async fn confirm_payment(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(payment_id): Path<String>,
) -> Result<impl IntoResponse, EngineError> {
    let existing = state
        .store
        .get_payment(&payment_id)
        .await
        .map_err(EngineError::persistence)?
        .ok_or(EngineError::NotFound("payment"))?;
    if existing.user_id != claims.sub {
        return Err(EngineError::NotFound("payment"));
    }
    let payment = state.payment_service()?.confirm(&payment_id).await?;
    Ok(Json(payment))
}

/// GET /api/v1/payments/history
pub async fn payment_history(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> Result<impl IntoResponse, EngineError> {
    let payments = state.payment_service()?.history(&claims.sub).await?;
    Ok(Json(payments))
}
