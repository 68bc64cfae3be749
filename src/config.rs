use std::env;
use std::ops::RangeInclusive;
use std::str::FromStr;

use chrono::{FixedOffset, Offset};
use serde::Deserialize;

use crate::db::models::MAX_LEAD_MINUTES;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub telegram: TelegramConfig,
    pub push: PushConfig,
    pub scanner: ScannerConfig,
    pub rate_limit: RateLimitConfig,
    pub display: DisplayConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub frontend_url: String,
    /// Shared secret the external scheduler must present as a bearer token
    /// when triggering a scan. Read from `CRON_SECRET`; unset means open.
    pub cron_secret: Option<String>,
    /// `LOG_FORMAT=json` switches tracing output to JSON lines.
    pub log_json: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: Option<String>,
}

/// VAPID material for Web Push.
#[derive(Debug, Clone, Deserialize)]
pub struct PushConfig {
    /// PEM-encoded EC private key (`VAPID_PRIVATE_KEY_PEM`).
    pub private_key_pem: Option<String>,
    /// Base64url public key handed to browsers (`VAPID_PUBLIC_KEY`).
    pub public_key: Option<String>,
    /// Contact URI placed in the `sub` claim (`VAPID_SUBJECT`).
    pub subject: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScannerConfig {
    /// Lead time applied when a user has no stored settings.
    pub default_lead_minutes: i64,
    /// Grace period after the ideal trigger instant in which a late scan still fires.
    pub late_window_minutes: i64,
    /// Span during which a second notification for the same occurrence and user is blocked.
    pub dedup_window_hours: i64,
    /// How far ahead single (non-recurring) events are loaded.
    pub lookahead_hours: i64,
    /// Per-attempt timeout for every push or chat delivery.
    pub delivery_timeout_seconds: u64,
    /// Candidates processed concurrently within one scan.
    pub concurrency: usize,
    /// Dedup log rows older than this are pruned by the retention worker.
    pub log_retention_days: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Allowed requests per second (per IP) for the scan trigger
    pub cron_per_second: u32,
    /// Burst size for the scan trigger
    pub cron_burst: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DisplayConfig {
    /// Fixed offset of the single display zone, in minutes east of UTC.
    pub utc_offset_minutes: i32,
}

impl DisplayConfig {
    pub fn offset(&self) -> FixedOffset {
        // Validated in `Config::from_env`; fall back to UTC for hand-built configs.
        FixedOffset::east_opt(self.utc_offset_minutes * 60)
            .unwrap_or_else(|| chrono::Utc.fix())
    }

    /// Current wall-clock time in the display zone.
    pub fn now_local(&self) -> chrono::NaiveDateTime {
        chrono::Utc::now().with_timezone(&self.offset()).naive_local()
    }
}

/// Upper bounds for the scanner knobs; larger values overflow chrono durations.
const MAX_LATE_WINDOW_MINUTES: i64 = 24 * 60;
const MAX_DEDUP_WINDOW_HOURS: i64 = 24 * 31;
const MAX_LOOKAHEAD_HOURS: i64 = 24 * 31;
const MAX_DELIVERY_TIMEOUT_SECONDS: u64 = 300;
const MAX_LOG_RETENTION_DAYS: i64 = 3650;

fn parse_value<T: FromStr>(key: &str, raw: Option<String>, default: T) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(v) => v
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
    }
}

/// Unset falls back to `default`; a set but unparsable value is an error.
fn env_parse<T: FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    parse_value(key, env::var(key).ok(), default)
}

fn required_secret(key: &str, raw: Option<String>) -> Result<String, ConfigError> {
    raw.map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ConfigError::MissingEnv(key.to_string()))
}

fn check<T: PartialOrd>(key: &str, value: T, range: RangeInclusive<T>) -> Result<(), ConfigError> {
    if range.contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue(key.to_string()))
    }
}

impl ScannerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check(
            "NOTIFY_DEFAULT_LEAD_MINUTES",
            self.default_lead_minutes,
            0..=MAX_LEAD_MINUTES,
        )?;
        check(
            "NOTIFY_LATE_WINDOW_MINUTES",
            self.late_window_minutes,
            1..=MAX_LATE_WINDOW_MINUTES,
        )?;
        check(
            "NOTIFY_DEDUP_WINDOW_HOURS",
            self.dedup_window_hours,
            1..=MAX_DEDUP_WINDOW_HOURS,
        )?;
        check(
            "NOTIFY_LOOKAHEAD_HOURS",
            self.lookahead_hours,
            1..=MAX_LOOKAHEAD_HOURS,
        )?;
        check(
            "NOTIFY_DELIVERY_TIMEOUT_SECONDS",
            self.delivery_timeout_seconds,
            1..=MAX_DELIVERY_TIMEOUT_SECONDS,
        )?;
        check("NOTIFY_SCAN_CONCURRENCY", self.concurrency, 1..=usize::MAX)?;

        // Pruning must never drop rows the dedup window still needs.
        let min_retention_days = (self.dedup_window_hours + 23) / 24;
        check(
            "NOTIFY_LOG_RETENTION_DAYS",
            self.log_retention_days,
            min_retention_days..=MAX_LOG_RETENTION_DAYS,
        )
    }
}

impl RateLimitConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check("RATE_LIMIT_CRON_PER_SECOND", self.cron_per_second, 1..=u32::MAX)?;
        check("RATE_LIMIT_CRON_BURST", self.cron_burst, 1..=u32::MAX)
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let utc_offset_minutes: i32 = env::var("DISPLAY_UTC_OFFSET_MINUTES")
            .unwrap_or_else(|_| "-180".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("DISPLAY_UTC_OFFSET_MINUTES".to_string()))?;
        if utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .is_none()
        {
            return Err(ConfigError::InvalidValue(
                "DISPLAY_UTC_OFFSET_MINUTES".to_string(),
            ));
        }

        let config = Config {
            server: ServerConfig {
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("PORT")
                    .unwrap_or_else(|_| "8080".to_string())
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("PORT".to_string()))?,
                frontend_url: env::var("FRONTEND_URL")
                    .unwrap_or_else(|_| "http://localhost:3000".to_string()),
                cron_secret: env::var("CRON_SECRET")
                    .ok()
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty()),
                log_json: matches!(
                    env::var("LOG_FORMAT").map(|v| v.to_lowercase()).as_deref(),
                    Ok("json")
                ),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "sqlite://data/agenda.db".to_string()),
                max_connections: env_parse("DATABASE_MAX_CONNECTIONS", 5)?,
            },
            jwt: JwtConfig {
                secret: required_secret("JWT_SECRET", env::var("JWT_SECRET").ok())?,
            },
            telegram: TelegramConfig {
                bot_token: env::var("TELEGRAM_BOT_TOKEN")
                    .ok()
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty()),
            },
            push: PushConfig {
                private_key_pem: env::var("VAPID_PRIVATE_KEY_PEM")
                    .ok()
                    .map(|s| s.replace("\\n", "\n").trim().to_string())
                    .filter(|s| !s.is_empty()),
                public_key: env::var("VAPID_PUBLIC_KEY")
                    .ok()
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty()),
                subject: env::var("VAPID_SUBJECT")
                    .unwrap_or_else(|_| "mailto:admin@localhost".to_string()),
            },
            scanner: ScannerConfig {
                default_lead_minutes: env_parse("NOTIFY_DEFAULT_LEAD_MINUTES", 15)?,
                late_window_minutes: env_parse("NOTIFY_LATE_WINDOW_MINUTES", 30)?,
                dedup_window_hours: env_parse("NOTIFY_DEDUP_WINDOW_HOURS", 12)?,
                lookahead_hours: env_parse("NOTIFY_LOOKAHEAD_HOURS", 24)?,
                delivery_timeout_seconds: env_parse("NOTIFY_DELIVERY_TIMEOUT_SECONDS", 10)?,
                concurrency: env_parse("NOTIFY_SCAN_CONCURRENCY", 4)?,
                log_retention_days: env_parse("NOTIFY_LOG_RETENTION_DAYS", 30)?,
            },
            rate_limit: RateLimitConfig {
                cron_per_second: env_parse("RATE_LIMIT_CRON_PER_SECOND", 1)?,
                cron_burst: env_parse("RATE_LIMIT_CRON_BURST", 5)?,
            },
            display: DisplayConfig { utc_offset_minutes },
        };

        config.scanner.validate()?;
        config.rate_limit.validate()?;
        Ok(config)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                frontend_url: "http://localhost:3000".to_string(),
                cron_secret: None,
                log_json: false,
            },
            database: DatabaseConfig {
                url: "sqlite://data/agenda.db".to_string(),
                max_connections: 5,
            },
            jwt: JwtConfig {
                secret: String::new(),
            },
            telegram: TelegramConfig { bot_token: None },
            push: PushConfig {
                private_key_pem: None,
                public_key: None,
                subject: "mailto:admin@localhost".to_string(),
            },
            scanner: ScannerConfig {
                default_lead_minutes: 15,
                late_window_minutes: 30,
                dedup_window_hours: 12,
                lookahead_hours: 24,
                delivery_timeout_seconds: 10,
                concurrency: 4,
                log_retention_days: 30,
            },
            rate_limit: RateLimitConfig {
                cron_per_second: 1,
                cron_burst: 5,
            },
            display: DisplayConfig {
                utc_offset_minutes: -180,
            },
        }
    }
}
