//! Local filesystem cursor store.
//!
//! The cursor lives in a single text file, replaced atomically on every
//! save so a crash never leaves a half-written timestamp behind.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::NaiveDateTime;
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::storage::{CursorStore, format_cursor, parse_cursor};

/// Cursor stored in a plain text file.
#[derive(Debug, Clone)]
pub struct FileCursorStore {
    path: PathBuf,
}

impl FileCursorStore {
    /// Create a store backed by the given file. The file is created on first save.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Ensure parent directory exists.
    async fn ensure_dir(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        Ok(())
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(&self, bytes: &[u8]) -> Result<()> {
        self.ensure_dir().await?;

        let tmp = self.path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl CursorStore for FileCursorStore {
    async fn load(&self) -> Result<Option<NaiveDateTime>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(AppError::cursor_corrupt(&self.path, e)),
        };

        let text = String::from_utf8(bytes)
            .map_err(|e| AppError::cursor_corrupt(&self.path, e))?;
        if text.trim().is_empty() {
            return Err(AppError::cursor_corrupt(&self.path, "file is empty"));
        }

        parse_cursor(&text)
            .map(Some)
            .map_err(|e| AppError::cursor_corrupt(&self.path, format!("'{}': {}", text.trim(), e)))
    }

    async fn save(&self, cursor: NaiveDateTime) -> Result<()> {
        let text = format_cursor(cursor);
        self.write_bytes(format!("{text}\n").as_bytes())
            .await
            .map_err(|e| AppError::cursor_corrupt(&self.path, format!("write failed: {e}")))?;
        log::debug!("Cursor saved to {}: {}", self.path.display(), text);
        Ok(())
    }
}
