// src/handlers/cards.rs

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use validator::Validate;

use crate::{
    config::Config,
    error::AppError,
    models::access_card::{AccessCard, CardListParams, CardStatus, GenerateCardsRequest},
    services::cards::{self, IssueOverrides},
    state::SharedStore,
};

/// Lists scratch cards, newest first. `?status=unused|used|expired|deactivated` filters.
/// Admin only.
pub async fn list_cards(
    State(store): State<SharedStore>,
    Query(params): Query<CardListParams>,
) -> Result<impl IntoResponse, AppError> {
    let status = params
        .status
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<CardStatus>())
        .transpose()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let cards = store.list_cards(status).await?;
    Ok(Json(cards))
}

/// Card counts per status.
pub async fn card_summary(State(store): State<SharedStore>) -> Result<impl IntoResponse, AppError> {
    Ok(Json(store.card_summary().await?))
}

pub async fn get_card(
    State(store): State<SharedStore>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let card = store
        .get_card(id)
        .await?
        .ok_or(AppError::NotFound("Card not found".to_string()))?;
    Ok(Json(card))
}

/// Generates a batch of cards.
/// Returns 201 Created with every card, plaintext PINs included, for printing.
pub async fn generate_cards(
    State(store): State<SharedStore>,
    State(config): State<Config>,
    Json(payload): Json<GenerateCardsRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let overrides = IssueOverrides {
        usage_limit: payload.usage_limit,
        expiry_days: payload.expiry_days,
    };
    let cards = cards::generate_cards(
        store.as_ref(),
        &config.card_policy,
        payload.count,
        overrides,
        Utc::now(),
    )
    .await?;

    Ok((StatusCode::CREATED, Json(cards)))
}

/// Issues a new PIN and resets usage for a card.
pub async fn regenerate_card(
    State(store): State<SharedStore>,
    State(config): State<Config>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let card = cards::regenerate_card(store.as_ref(), &config.card_policy, id, Utc::now())
        .await?
        .ok_or(AppError::NotFound("Card not found".to_string()))?;
    Ok(Json(card))
}

pub async fn deactivate_card(
    State(store): State<SharedStore>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    set_status(&store, id, CardStatus::Deactivated).await
}

/// Expires a card ahead of its expiry date.
pub async fn expire_card(
    State(store): State<SharedStore>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    set_status(&store, id, CardStatus::Expired).await
}

async fn set_status(
    store: &SharedStore,
    id: i64,
    status: CardStatus,
) -> Result<Json<AccessCard>, AppError> {
    let card = store
        .set_card_status(id, status)
        .await?
        .ok_or(AppError::NotFound("Card not found".to_string()))?;

    tracing::info!("Card {} set to {}", card.serial_number, status);
    Ok(Json(card))
}

pub async fn delete_card(
    State(store): State<SharedStore>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    if !store.delete_card(id).await? {
        return Err(AppError::NotFound("Card not found".to_string()));
    }
    Ok(StatusCode::NO_CONTENT)
}
