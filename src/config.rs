// src/config.rs

//! Configuration loading utilities.
//!
//! Secrets, paths and the polling interval come from the environment;
//! everything else lives in the TOML file named by `CONFIG_PATH`.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{AppError, Result};
use crate::models::BotConfig;

const DEFAULT_CHECK_INTERVAL_MINUTES: u64 = 60;
const DEFAULT_TIMESTAMP_FILE: &str = "last_check.txt";
const DEFAULT_CONFIG_PATH: &str = "config.toml";
const DEFAULT_BLUESKY_SERVICE: &str = "https://bsky.social";

/// Settings read from environment variables.
#[derive(Debug, Clone)]
pub struct Settings {
    pub bluesky_handle: Option<String>,
    pub bluesky_password: Option<String>,
    /// PDS that hosts the bot account
    pub bluesky_service: String,
    /// Optional Socrata app token
    pub chicago_data_token: Option<String>,
    pub check_interval: Duration,
    pub timestamp_file: PathBuf,
    pub log_file: Option<PathBuf>,
    pub config_path: PathBuf,
}

/// Login for the social network account.
#[derive(Clone)]
pub struct Credentials {
    pub handle: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("handle", &self.handle)
            .field("password", &"***")
            .finish()
    }
}

impl Settings {
    /// Read settings from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through an arbitrary lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let interval_minutes = match get("CHECK_INTERVAL_MINUTES") {
            Some(raw) => raw.parse::<u64>().map_err(|_| {
                AppError::config(format!(
                    "CHECK_INTERVAL_MINUTES must be a whole number of minutes, got '{raw}'"
                ))
            })?,
            None => DEFAULT_CHECK_INTERVAL_MINUTES,
        };
        if interval_minutes == 0 {
            return Err(AppError::config("CHECK_INTERVAL_MINUTES must be > 0"));
        }

        Ok(Self {
            bluesky_handle: get("BLUESKY_HANDLE"),
            bluesky_password: get("BLUESKY_PASSWORD"),
            bluesky_service: get("BLUESKY_SERVICE")
                .unwrap_or_else(|| DEFAULT_BLUESKY_SERVICE.to_string()),
            chicago_data_token: get("CHICAGO_DATA_TOKEN"),
            check_interval: Duration::from_secs(interval_minutes * 60),
            timestamp_file: get("TIMESTAMP_FILE")
                .unwrap_or_else(|| DEFAULT_TIMESTAMP_FILE.to_string())
                .into(),
            log_file: get("LOG_FILE").map(PathBuf::from),
            config_path: get("CONFIG_PATH")
                .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string())
                .into(),
        })
    }

    /// Credentials needed by commands that post.
    pub fn credentials(&self) -> Result<Credentials> {
        let mut missing = Vec::new();
        if self.bluesky_handle.is_none() {
            missing.push("BLUESKY_HANDLE (Bluesky handle)");
        }
        if self.bluesky_password.is_none() {
            missing.push("BLUESKY_PASSWORD (Bluesky app password)");
        }
        match (&self.bluesky_handle, &self.bluesky_password) {
            (Some(handle), Some(password)) => Ok(Credentials {
                handle: handle.clone(),
                password: password.clone(),
            }),
            _ => Err(AppError::config(format!(
                "Missing required environment variables: {}",
                missing.join(", ")
            ))),
        }
    }
}

/// Load and validate the bot configuration named by the settings.
pub fn load_all(settings: &Settings) -> Result<BotConfig> {
    let config = BotConfig::load_or_default(&settings.config_path)?;
    config
        .validate()
        .map_err(|e| AppError::config(format!("Invalid configuration: {e}")))?;
    Ok(config)
}
