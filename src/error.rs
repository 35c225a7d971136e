// src/error.rs

//! Unified error handling for the bot.

use std::fmt;
use std::path::Path;

use thiserror::Error;

/// Result type alias for bot operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Configuration could not be loaded or failed validation
    #[error("Configuration error: {0}")]
    Config(String),

    /// The data portal could not be reached or returned garbage
    #[error("Data source unavailable: {0}")]
    SourceUnavailable(String),

    /// The cursor file exists but cannot be read or parsed
    #[error("Cursor store corrupt at {path}: {message}")]
    CursorStoreCorrupt { path: String, message: String },

    /// The social network rejected our credentials
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The social network asked us to slow down
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Network hiccup or server-side error while posting
    #[error("Transient publish failure: {0}")]
    TransientPublish(String),

    /// The post was rejected and retrying will not help
    #[error("Permanent publish failure: {0}")]
    PermanentPublish(String),
}

impl AppError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a data source error.
    pub fn source_unavailable(message: impl fmt::Display) -> Self {
        Self::SourceUnavailable(message.to_string())
    }

    /// Create a cursor corruption error for the given file.
    pub fn cursor_corrupt(path: &Path, message: impl fmt::Display) -> Self {
        Self::CursorStoreCorrupt {
            path: path.display().to_string(),
            message: message.to_string(),
        }
    }

    /// Create an authentication error.
    pub fn authentication(message: impl fmt::Display) -> Self {
        Self::Authentication(message.to_string())
    }

    /// Whether waiting and retrying the same publish call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited(_) | Self::TransientPublish(_))
    }

    /// Whether the process must stop instead of moving on to the next cycle.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Authentication(_) | Self::CursorStoreCorrupt { .. } | Self::Config(_)
        )
    }
}
