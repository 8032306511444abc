//! Process configuration read from environment variables.
//!
//! | Variable                | Default          |
//! |-------------------------|------------------|
//! | `BIND_ADDR`             | `0.0.0.0:8080`   |
//! | `JWT_SECRET`            | dev default      |
//! | `DATABASE_URL`          | unset: in-memory |
//! | `DATABASE_MAX_CONNECTIONS` | `10`          |
//! | `SESSION_TTL_MINUTES`   | `60`             |
//! | `SEED_DEFAULTS`         | `true`           |
//! | `OTP_LOG_CODES`         | `false`          |
//! | `SEED_MANAGER_*`        | see `SeedManager`|

use std::collections::HashMap;

use chrono::NaiveDate;
use thiserror::Error;

use malvader_auth::IdentityInput;

pub const DEV_JWT_SECRET: &str = "dev-secret";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid value for {key}: {message}")]
pub struct ConfigError {
    pub key: &'static str,
    pub message: String,
}

/// Identity of the root manager created on first start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedManager {
    pub name: String,
    pub national_id: String,
    pub email: String,
    pub birth_date: NaiveDate,
    pub phone: String,
    pub password: String,
}

impl Default for SeedManager {
    fn default() -> Self {
        Self {
            name: "Root Manager".to_string(),
            national_id: "00000000191".to_string(),
            email: "manager@malvader.local".to_string(),
            birth_date: NaiveDate::from_ymd_opt(1980, 1, 1).unwrap_or_default(),
            phone: "61900000000".to_string(),
            password: "change-me-now".to_string(),
        }
    }
}

impl SeedManager {
    pub fn identity(&self) -> IdentityInput {
        IdentityInput {
            name: self.name.clone(),
            national_id: self.national_id.clone(),
            email: self.email.clone(),
            birth_date: self.birth_date,
            phone: self.phone.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: String,
    pub jwt_secret: String,
    /// `true` when `JWT_SECRET` was not provided.
    pub jwt_secret_is_default: bool,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub session_ttl_minutes: i64,
    pub seed_defaults: bool,
    pub seed_manager: SeedManager,
    /// Write one-time codes in clear to the log. Local development only.
    pub otp_log_codes: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            jwt_secret: DEV_JWT_SECRET.to_string(),
            jwt_secret_is_default: true,
            database_url: None,
            database_max_connections: 10,
            session_ttl_minutes: 60,
            seed_defaults: true,
            seed_manager: SeedManager::default(),
            otp_log_codes: false,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(std::env::vars().collect())
    }

    /// Build from an explicit variable map (used by `from_env` and tests).
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let var = |key: &str| vars.get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let (jwt_secret, jwt_secret_is_default) = match var("JWT_SECRET") {
            Some(secret) => (secret, false),
            None => (defaults.jwt_secret, true),
        };

        let database_max_connections = match var("DATABASE_MAX_CONNECTIONS") {
            Some(raw) => parse_number("DATABASE_MAX_CONNECTIONS", &raw)?,
            None => defaults.database_max_connections,
        };

        let session_ttl_minutes = match var("SESSION_TTL_MINUTES") {
            Some(raw) => {
                let minutes: i64 = parse_number("SESSION_TTL_MINUTES", &raw)?;
                if minutes <= 0 {
                    return Err(ConfigError {
                        key: "SESSION_TTL_MINUTES",
                        message: "must be positive".to_string(),
                    });
                }
                minutes
            }
            None => defaults.session_ttl_minutes,
        };

        let seed_defaults = match var("SEED_DEFAULTS") {
            Some(raw) => parse_flag("SEED_DEFAULTS", &raw)?,
            None => defaults.seed_defaults,
        };

        let otp_log_codes = match var("OTP_LOG_CODES") {
            Some(raw) => parse_flag("OTP_LOG_CODES", &raw)?,
            None => defaults.otp_log_codes,
        };

        let mut seed_manager = defaults.seed_manager;
        if let Some(name) = var("SEED_MANAGER_NAME") {
            seed_manager.name = name;
        }
        if let Some(national_id) = var("SEED_MANAGER_NATIONAL_ID") {
            seed_manager.national_id = national_id;
        }
        if let Some(email) = var("SEED_MANAGER_EMAIL") {
            seed_manager.email = email;
        }
        if let Some(raw) = var("SEED_MANAGER_BIRTH_DATE") {
            seed_manager.birth_date =
                NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|e| ConfigError {
                    key: "SEED_MANAGER_BIRTH_DATE",
                    message: e.to_string(),
                })?;
        }
        if let Some(phone) = var("SEED_MANAGER_PHONE") {
            seed_manager.phone = phone;
        }
        if let Some(password) = var("SEED_MANAGER_PASSWORD") {
            seed_manager.password = password;
        }

        Ok(Self {
            bind_addr: var("BIND_ADDR").unwrap_or(defaults.bind_addr),
            jwt_secret,
            jwt_secret_is_default,
            database_url: var("DATABASE_URL"),
            database_max_connections,
            session_ttl_minutes,
            seed_defaults,
            seed_manager,
            otp_log_codes,
        })
    }
}

fn parse_number<T: std::str::FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.parse().map_err(|e: T::Err| ConfigError {
        key,
        message: e.to_string(),
    })
}

fn parse_flag(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError {
            key,
            message: format!("expected a boolean, got '{other}'"),
        }),
    }
}
