// src/models/access_card.rs

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use thiserror::Error;
use validator::Validate;

/// Lifecycle state of a scratch card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardStatus {
    Unused,
    /// Usage limit reached.
    Used,
    Expired,
    /// Switched off by an administrator.
    Deactivated,
}

impl CardStatus {
    pub const ALL: [CardStatus; 4] = [
        CardStatus::Unused,
        CardStatus::Used,
        CardStatus::Expired,
        CardStatus::Deactivated,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CardStatus::Unused => "unused",
            CardStatus::Used => "used",
            CardStatus::Expired => "expired",
            CardStatus::Deactivated => "deactivated",
        }
    }

    /// Expired and deactivated cards never verify again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CardStatus::Expired | CardStatus::Deactivated)
    }
}

impl fmt::Display for CardStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown card status: {0}")]
pub struct UnknownCardStatus(pub String);

impl FromStr for CardStatus {
    type Err = UnknownCardStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CardStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownCardStatus(s.to_string()))
    }
}

impl TryFrom<String> for CardStatus {
    type Error = UnknownCardStatus;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Represents the 'access_cards' table in the database.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessCard {
    pub id: i64,

    /// Printed on the card next to the scratch panel.
    pub serial_number: String,

    /// Plaintext PIN, kept for printing and admin display only.
    pub pin: String,

    /// Argon2 hash of `pin`. Never serialized.
    #[serde(skip)]
    pub pin_hash: String,

    /// Student the card was first used for.
    pub bound_student_id: Option<String>,

    #[sqlx(try_from = "String")]
    pub status: CardStatus,

    pub expiry_date: DateTime<Utc>,
    pub usage_limit: i32,
    pub usage_count: i32,
    pub used_at: Option<DateTime<Utc>>,
    pub used_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AccessCard {
    pub fn is_past_expiry(&self, now: DateTime<Utc>) -> bool {
        now > self.expiry_date
    }

    pub fn is_exhausted(&self) -> bool {
        self.usage_count >= self.usage_limit
    }
}

/// A card ready to be inserted by a batch generation.
#[derive(Debug, Clone)]
pub struct NewAccessCard {
    pub serial_number: String,
    pub pin: String,
    pub pin_hash: String,
    pub expiry_date: DateTime<Utc>,
    pub usage_limit: i32,
    pub created_at: DateTime<Utc>,
}

/// Replacement credentials written when an admin regenerates a card.
#[derive(Debug, Clone)]
pub struct CardReissue {
    pub pin: String,
    pub pin_hash: String,
    pub expiry_date: DateTime<Utc>,
    pub usage_limit: i32,
}

/// A successful use of a card by a student.
#[derive(Debug, Clone)]
pub struct CardUsage {
    pub student_id: String,
    pub used_at: DateTime<Utc>,
}

/// Count of cards in each status.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CardSummary {
    pub total: i64,
    pub unused: i64,
    pub used: i64,
    pub expired: i64,
    pub deactivated: i64,
}

impl CardSummary {
    pub fn add(&mut self, status: CardStatus, count: i64) {
        self.total += count;
        match status {
            CardStatus::Unused => self.unused += count,
            CardStatus::Used => self.used += count,
            CardStatus::Expired => self.expired += count,
            CardStatus::Deactivated => self.deactivated += count,
        }
    }
}

/// DTO for a batch card generation.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct GenerateCardsRequest {
    #[validate(range(min = 1, max = 500, message = "Between 1 and 500 cards per batch."))]
    pub count: u32,
    /// Overrides the configured usage limit for this batch.
    #[validate(range(min = 1, max = 1000))]
    pub usage_limit: Option<i32>,
    /// Overrides the configured validity period for this batch.
    #[validate(range(min = 1, max = 3650))]
    pub expiry_days: Option<i64>,
}

/// Query parameters for listing cards.
#[derive(Debug, Deserialize)]
pub struct CardListParams {
    pub status: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parse_roundtrip() {
        for status in CardStatus::ALL {
            assert_eq!(status.as_str().parse::<CardStatus>().unwrap(), status);
        }
        assert!("revoked".parse::<CardStatus>().is_err());
    }

    #[test]
    fn test_terminal_states() {
        assert!(CardStatus::Expired.is_terminal());
        assert!(CardStatus::Deactivated.is_terminal());
        assert!(!CardStatus::Unused.is_terminal());
        assert!(!CardStatus::Used.is_terminal());
    }

    #[test]
    fn test_summary_accumulates() {
        let mut summary = CardSummary::default();
        summary.add(CardStatus::Unused, 3);
        summary.add(CardStatus::Expired, 2);
        assert_eq!(summary.total, 5);
        assert_eq!(summary.unused, 3);
        assert_eq!(summary.expired, 2);
    }
}
