// src/services/cards.rs

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use tokio::task::JoinSet;

use crate::{
    config::CardPolicy,
    error::AppError,
    models::access_card::{AccessCard, CardReissue, NewAccessCard},
    store::{AccessCardStore, StoreError},
    utils::{
        hash::{hash_password, hash_password_blocking},
        pin::{generate_pin, generate_serial},
    },
};

/// Attempts before a uniqueness clash with stored cards is reported.
const ISSUE_ATTEMPTS: u32 = 3;

/// Per-batch overrides of the configured card policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct IssueOverrides {
    pub usage_limit: Option<i32>,
    pub expiry_days: Option<i64>,
}

/// Generate `count` fresh cards and store them as one batch.
///
/// The returned cards carry their plaintext PINs for printing.
pub async fn generate_cards<S>(
    store: &S,
    policy: &CardPolicy,
    count: u32,
    overrides: IssueOverrides,
    now: DateTime<Utc>,
) -> Result<Vec<AccessCard>, AppError>
where
    S: AccessCardStore + ?Sized,
{
    if !(1..=500).contains(&count) {
        return Err(AppError::BadRequest(
            "Between 1 and 500 cards can be generated per batch".to_string(),
        ));
    }

    let usage_limit = overrides.usage_limit.unwrap_or(policy.usage_limit_default);
    let expiry_date = expiry_after(
        now,
        overrides.expiry_days.unwrap_or(policy.expiry_duration_days),
    )?;

    let mut attempt = 1;
    loop {
        let batch = draw_batch(policy, count as usize, usage_limit, expiry_date, now).await?;

        match store.insert_cards(&batch).await {
            Ok(cards) => {
                tracing::info!(
                    "Generated {} access cards (usage limit {}, expires {})",
                    cards.len(),
                    usage_limit,
                    expiry_date
                );
                return Ok(cards);
            }
            Err(StoreError::Conflict(msg)) if attempt < ISSUE_ATTEMPTS => {
                tracing::warn!("Card batch clashed with stored cards, redrawing: {}", msg);
                attempt += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// `now` plus `days`, rejecting spans chrono cannot represent.
fn expiry_after(now: DateTime<Utc>, days: i64) -> Result<DateTime<Utc>, AppError> {
    Duration::try_days(days)
        .and_then(|span| now.checked_add_signed(span))
        .ok_or_else(|| AppError::BadRequest(format!("Expiry of {days} days is out of range")))
}

/// Draw unique serials and PINs, then hash the PINs in parallel on the blocking pool.
async fn draw_batch(
    policy: &CardPolicy,
    count: usize,
    usage_limit: i32,
    expiry_date: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<Vec<NewAccessCard>, AppError> {
    let mut serials = HashSet::with_capacity(count);
    let mut pins = HashSet::with_capacity(count);
    let mut drafts = Vec::with_capacity(count);

    while drafts.len() < count {
        let serial = generate_serial(now);
        let pin = generate_pin(policy.pin_length);
        if serials.contains(&serial) || pins.contains(&pin) {
            continue;
        }
        serials.insert(serial.clone());
        pins.insert(pin.clone());
        drafts.push((serial, pin));
    }

    let mut hashing = JoinSet::new();
    for (serial, pin) in drafts {
        hashing.spawn_blocking(move || {
            hash_password(&pin).map(|pin_hash| NewAccessCard {
                serial_number: serial,
                pin,
                pin_hash,
                expiry_date,
                usage_limit,
                created_at: now,
            })
        });
    }

    let mut batch = Vec::with_capacity(count);
    while let Some(joined) = hashing.join_next().await {
        let card = joined
            .map_err(|e| AppError::InternalServerError(format!("PIN hashing failed: {e}")))??;
        batch.push(card);
    }
    batch.sort_by(|a, b| a.serial_number.cmp(&b.serial_number));

    Ok(batch)
}

/// Issue a new PIN for an existing card and reset its usage, binding and expiry.
///
/// The card keeps its usage limit. Returns `None` when the card does not exist.
pub async fn regenerate_card<S>(
    store: &S,
    policy: &CardPolicy,
    id: i64,
    now: DateTime<Utc>,
) -> Result<Option<AccessCard>, AppError>
where
    S: AccessCardStore + ?Sized,
{
    let Some(card) = store.get_card(id).await? else {
        return Ok(None);
    };
    let expiry_date = expiry_after(now, policy.expiry_duration_days)?;

    let mut attempt = 1;
    loop {
        let pin = generate_pin(policy.pin_length);
        let pin_hash = hash_password_blocking(pin.clone()).await?;
        let reissue = CardReissue {
            pin,
            pin_hash,
            expiry_date,
            usage_limit: card.usage_limit,
        };

        match store.reissue_card(id, &reissue).await {
            Ok(reissued) => {
                tracing::info!("Regenerated PIN for card {}", card.serial_number);
                return Ok(reissued);
            }
            Err(StoreError::Conflict(_)) if attempt < ISSUE_ATTEMPTS => attempt += 1,
            Err(e) => return Err(e.into()),
        }
    }
}
