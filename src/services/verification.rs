// src/services/verification.rs

use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{
    config::CardPolicy,
    error::AppError,
    models::{
        access_card::{AccessCard, CardStatus, CardUsage},
        result::ResultRecord,
        student::Student,
    },
    store::{AccessCardStore, ResultStore, StudentDirectory},
    utils::hash::verify_password_blocking,
};

/// Why a result-checker submission was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    StudentNotFound,
    InvalidPin,
    CardExpired,
    CardDeactivated,
    UsageLimitExceeded,
    CardBoundToOtherStudent,
}

impl Denial {
    /// Stable machine-readable code sent to clients.
    pub fn code(&self) -> &'static str {
        match self {
            Denial::StudentNotFound => "STUDENT_NOT_FOUND",
            Denial::InvalidPin => "INVALID_PIN",
            Denial::CardExpired => "CARD_EXPIRED",
            Denial::CardDeactivated => "CARD_DEACTIVATED",
            Denial::UsageLimitExceeded => "USAGE_LIMIT_EXCEEDED",
            Denial::CardBoundToOtherStudent => "CARD_BOUND_TO_OTHER_STUDENT",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Denial::StudentNotFound => "No student was found with this student ID.",
            Denial::InvalidPin => "Invalid PIN. Please check the PIN on your scratch card.",
            Denial::CardExpired => "This scratch card has expired.",
            Denial::CardDeactivated => {
                "This scratch card has been deactivated. Please contact the school."
            }
            Denial::UsageLimitExceeded => "This scratch card has reached its usage limit.",
            Denial::CardBoundToOtherStudent => {
                "This scratch card has already been used for another student."
            }
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Denial::StudentNotFound => StatusCode::NOT_FOUND,
            Denial::InvalidPin => StatusCode::BAD_REQUEST,
            Denial::CardExpired => StatusCode::GONE,
            Denial::CardDeactivated => StatusCode::FORBIDDEN,
            Denial::UsageLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            Denial::CardBoundToOtherStudent => StatusCode::FORBIDDEN,
        }
    }
}

/// DTO submitted by the public result checker.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CheckResultRequest {
    #[validate(length(min = 1, max = 64, message = "PIN is required."))]
    pub pin: String,
    #[validate(length(min = 1, max = 50, message = "Student ID is required."))]
    pub student_id: String,
    /// When present the card is located by serial number and the PIN is
    /// checked only against its hash.
    #[validate(length(min = 1, max = 32))]
    pub serial_number: Option<String>,
}

impl CheckResultRequest {
    /// Trims surrounding whitespace picked up from copy-pasting a card.
    pub fn normalized(self) -> Self {
        Self {
            pin: self.pin.trim().to_string(),
            student_id: self.student_id.trim().to_string(),
            serial_number: self
                .serial_number
                .map(|serial| serial.trim().to_string())
                .filter(|serial| !serial.is_empty()),
        }
    }
}

/// Payload returned when access is granted.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultAccess {
    pub student: Student,
    pub results: Vec<ResultRecord>,
    pub usage_count: i32,
    pub usage_limit: i32,
}

#[derive(Debug)]
pub enum VerificationOutcome {
    Granted(ResultAccess),
    Denied(Denial),
}

/// Decide whether `request` unlocks the student's results and account for the use.
///
/// Checks run in order: student, card, expiry, deactivation, usage limit, PIN
/// hash, binding. Refusals come back as [`Denial`]; only storage failures are errors.
///
/// The usage write is conditional on the usage count read here. When a
/// concurrent verification of the same card wins that race, the card is
/// re-read and checked again, up to `policy.verify_max_attempts` times.
pub async fn verify<S>(
    store: &S,
    policy: &CardPolicy,
    request: &CheckResultRequest,
    now: DateTime<Utc>,
) -> Result<VerificationOutcome, AppError>
where
    S: StudentDirectory + AccessCardStore + ResultStore + ?Sized,
{
    let Some(student) = store.find_student(&request.student_id).await? else {
        return Ok(deny(Denial::StudentNotFound, None));
    };

    let card = match &request.serial_number {
        Some(serial) => store.find_card_by_serial(serial).await?,
        None => store.find_card_by_pin(&request.pin).await?,
    };
    let Some(mut card) = card else {
        return Ok(deny(Denial::InvalidPin, None));
    };

    // PIN hash already accepted in an earlier attempt; skips re-hashing on retry.
    let mut accepted_hash: Option<String> = None;
    let mut attempt = 1;

    loop {
        if let Some(denial) = check_card(store, &card, request, now, &mut accepted_hash).await? {
            return Ok(deny(denial, Some(&card)));
        }

        let usage = CardUsage {
            student_id: request.student_id.clone(),
            used_at: now,
        };
        if store
            .record_card_usage(card.id, card.usage_count, &usage)
            .await?
        {
            let usage_count = card.usage_count + 1;
            let results = store.list_results_for_student(&request.student_id).await?;

            tracing::info!(
                serial = %card.serial_number,
                student_id = %request.student_id,
                usage_count,
                usage_limit = card.usage_limit,
                "Result access granted"
            );

            return Ok(VerificationOutcome::Granted(ResultAccess {
                student,
                results,
                usage_count,
                usage_limit: card.usage_limit,
            }));
        }

        if attempt >= policy.verify_max_attempts {
            tracing::warn!(
                "Gave up recording usage of card {} after {} attempts",
                card.serial_number,
                attempt
            );
            return Err(AppError::Conflict(
                "This scratch card is being used by another request. Please try again."
                    .to_string(),
            ));
        }
        attempt += 1;

        card = match store.get_card(card.id).await? {
            Some(reloaded) => reloaded,
            // Deleted while we were checking it.
            None => return Ok(deny(Denial::InvalidPin, None)),
        };
    }
}

/// Expiry, deactivation, usage limit, PIN hash and binding checks, in that order.
async fn check_card<S>(
    store: &S,
    card: &AccessCard,
    request: &CheckResultRequest,
    now: DateTime<Utc>,
    accepted_hash: &mut Option<String>,
) -> Result<Option<Denial>, AppError>
where
    S: AccessCardStore + ?Sized,
{
    if card.is_past_expiry(now) || card.status == CardStatus::Expired {
        if !card.status.is_terminal() {
            store.mark_card_expired(card.id).await?;
        }
        return Ok(Some(Denial::CardExpired));
    }

    if card.status == CardStatus::Deactivated {
        return Ok(Some(Denial::CardDeactivated));
    }

    if card.is_exhausted() {
        return Ok(Some(Denial::UsageLimitExceeded));
    }

    if accepted_hash.as_deref() != Some(card.pin_hash.as_str()) {
        if !verify_password_blocking(request.pin.clone(), card.pin_hash.clone()).await? {
            return Ok(Some(Denial::InvalidPin));
        }
        *accepted_hash = Some(card.pin_hash.clone());
    }

    if card
        .bound_student_id
        .as_deref()
        .is_some_and(|bound| bound != request.student_id)
    {
        return Ok(Some(Denial::CardBoundToOtherStudent));
    }

    Ok(None)
}

fn deny(denial: Denial, card: Option<&AccessCard>) -> VerificationOutcome {
    tracing::info!(
        code = denial.code(),
        serial = card.map(|c| c.serial_number.as_str()).unwrap_or("-"),
        "Result access denied"
    );
    VerificationOutcome::Denied(denial)
}
