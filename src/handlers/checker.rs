// src/handlers/checker.rs

use axum::{Json, extract::State, response::IntoResponse};
use chrono::Utc;
use serde_json::json;
use validator::Validate;

use crate::{
    config::Config,
    error::AppError,
    services::verification::{self, CheckResultRequest, VerificationOutcome},
    state::SharedStore,
};

/// Public result checker.
///
/// Verifies the scratch-card PIN for a student and, if accepted, returns the
/// student's profile and every result on file. Refusals carry a machine code
/// such as `CARD_EXPIRED` next to the human message.
pub async fn check_result(
    State(store): State<SharedStore>,
    State(config): State<Config>,
    Json(payload): Json<CheckResultRequest>,
) -> Result<impl IntoResponse, AppError> {
    let payload = payload.normalized();
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    match verification::verify(store.as_ref(), &config.card_policy, &payload, Utc::now()).await? {
        VerificationOutcome::Granted(access) => Ok(Json(access)),
        VerificationOutcome::Denied(denial) => Err(AppError::AccessDenied(denial)),
    }
}

/// Liveness probe that also checks the store.
pub async fn health(State(store): State<SharedStore>) -> Result<impl IntoResponse, AppError> {
    store.health_check().await.map_err(|e| {
        tracing::error!("Health check failed: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(Json(json!({ "status": "ok" })))
}
