//! Cursor persistence.
//!
//! The only durable state the bot owns is the application-date watermark
//! of the last processed batch.
//!
//! ```text
//! last_check.txt    # 2024-05-03T14:00:00.000
//! ```

pub mod local;

use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::error::Result;

// Re-export for convenience
pub use local::FileCursorStore;

/// Text format of a stored cursor. Lexical order matches time order.
pub const CURSOR_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

/// Trait for cursor storage backends.
#[async_trait]
pub trait CursorStore: Send + Sync {
    /// Load the stored cursor, or `None` when nothing was stored yet.
    ///
    /// Unreadable or unparseable contents are `CursorStoreCorrupt`.
    async fn load(&self) -> Result<Option<NaiveDateTime>>;

    /// Persist a new cursor value.
    async fn save(&self, cursor: NaiveDateTime) -> Result<()>;
}

/// Render a cursor the way it is stored and sent to the portal.
pub fn format_cursor(cursor: NaiveDateTime) -> String {
    cursor.format(CURSOR_FORMAT).to_string()
}

/// Parse a stored cursor. Accepts the stored format with or without fractional seconds.
pub fn parse_cursor(raw: &str) -> std::result::Result<NaiveDateTime, chrono::ParseError> {
    let raw = raw.trim();
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S"))
}
