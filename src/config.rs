// src/config.rs

use std::{env, net::SocketAddr, str::FromStr};

use dotenvy::dotenv;
use thiserror::Error;

/// Errors raised while reading configuration from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// Longest card validity accepted from configuration or a generation request.
pub const MAX_CARD_EXPIRY_DAYS: i64 = 3650;

/// Matches the longest PIN the result checker accepts.
pub const MAX_PIN_LENGTH: usize = 64;

/// One year.
pub const MAX_JWT_EXPIRATION_SECS: u64 = 31_536_000;

/// Which persistence backend the server runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    /// Process-local store. Data is lost on restart.
    Memory,
}

impl FromStr for StoreBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "memory" => Ok(Self::Memory),
            _ => Err(()),
        }
    }
}

/// How equal averages are ranked inside a cohort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TieBreak {
    /// Ties keep the store's natural load order (ascending row id);
    /// every result gets a distinct position.
    #[default]
    LoadOrder,
    /// Equal averages share a position and the next position is skipped (1, 2, 2, 4).
    Shared,
}

impl FromStr for TieBreak {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "load_order" | "stable" => Ok(Self::LoadOrder),
            "shared" | "competition" => Ok(Self::Shared),
            _ => Err(()),
        }
    }
}

/// Limits applied to scratch cards at issuance and verification time.
#[derive(Debug, Clone)]
pub struct CardPolicy {
    /// Successful verifications allowed per card unless overridden at generation.
    pub usage_limit_default: i32,
    /// Days between issuance (or regeneration) and expiry.
    pub expiry_duration_days: i64,
    /// Number of decimal digits in a generated PIN.
    pub pin_length: usize,
    /// How many times a verification re-reads the card after losing a concurrent update.
    pub verify_max_attempts: u32,
}

impl Default for CardPolicy {
    fn default() -> Self {
        Self {
            usage_limit_default: 30,
            expiry_duration_days: 365,
            pin_length: 12,
            verify_max_attempts: 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub store_backend: StoreBackend,
    pub database_url: Option<String>,
    pub jwt_secret: String,
    /// Admin token lifetime in seconds.
    pub jwt_expiration: u64,
    pub rust_log: String,
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,
    pub listen_addr: SocketAddr,
    /// Directory holding the built web client, served as a fallback route.
    pub static_dir: Option<String>,
    pub cors_origins: Vec<String>,
    pub card_policy: CardPolicy,
    pub tie_break: TieBreak,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let store_backend = parse_or(&lookup, "STORE_BACKEND", StoreBackend::Postgres)?;

        let database_url = non_empty(&lookup, "DATABASE_URL");
        if store_backend == StoreBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        let jwt_secret =
            non_empty(&lookup, "JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?;

        let jwt_expiration = in_range(
            "JWT_EXPIRATION",
            parse_or(&lookup, "JWT_EXPIRATION", 86_400u64)?,
            60,
            MAX_JWT_EXPIRATION_SECS,
        )?;

        let rust_log = non_empty(&lookup, "RUST_LOG").unwrap_or_else(|| "info".to_string());

        let listen_addr = parse_or(
            &lookup,
            "LISTEN_ADDR",
            SocketAddr::from(([0, 0, 0, 0], 3000)),
        )?;

        let cors_origins = non_empty(&lookup, "CORS_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(|origin| origin.trim().to_string())
                    .filter(|origin| !origin.is_empty())
                    .collect()
            })
            .unwrap_or_else(|| {
                vec![
                    "http://localhost:5173".to_string(),
                    "http://127.0.0.1:5173".to_string(),
                ]
            });

        let defaults = CardPolicy::default();
        let card_policy = CardPolicy {
            usage_limit_default: at_least(
                "CARD_USAGE_LIMIT",
                parse_or(&lookup, "CARD_USAGE_LIMIT", defaults.usage_limit_default)?,
                1,
            )?,
            expiry_duration_days: in_range(
                "CARD_EXPIRY_DAYS",
                parse_or(&lookup, "CARD_EXPIRY_DAYS", defaults.expiry_duration_days)?,
                1,
                MAX_CARD_EXPIRY_DAYS,
            )?,
            pin_length: in_range(
                "CARD_PIN_LENGTH",
                parse_or(&lookup, "CARD_PIN_LENGTH", defaults.pin_length)?,
                6,
                MAX_PIN_LENGTH,
            )?,
            verify_max_attempts: at_least(
                "VERIFY_MAX_ATTEMPTS",
                parse_or(&lookup, "VERIFY_MAX_ATTEMPTS", defaults.verify_max_attempts)?,
                1,
            )?,
        };

        let tie_break = parse_or(&lookup, "RANKING_TIE_BREAK", TieBreak::default())?;

        Ok(Self {
            store_backend,
            database_url,
            jwt_secret,
            jwt_expiration,
            rust_log,
            admin_username: non_empty(&lookup, "ADMIN_USERNAME"),
            admin_password: non_empty(&lookup, "ADMIN_PASSWORD"),
            listen_addr,
            static_dir: non_empty(&lookup, "STATIC_DIR"),
            cors_origins,
            card_policy,
            tie_break,
        })
    }
}

fn non_empty<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).filter(|value| !value.trim().is_empty())
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match non_empty(lookup, key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
        None => Ok(default),
    }
}

fn at_least<T>(key: &'static str, value: T, min: T) -> Result<T, ConfigError>
where
    T: PartialOrd + ToString,
{
    if value < min {
        return Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
        });
    }
    Ok(value)
}

fn in_range<T>(key: &'static str, value: T, min: T, max: T) -> Result<T, ConfigError>
where
    T: PartialOrd + ToString,
{
    let value = at_least(key, value, min)?;
    if value > max {
        return Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
        });
    }
    Ok(value)
}
