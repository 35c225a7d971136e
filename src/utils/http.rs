// src/utils/http.rs

//! HTTP client utilities.

use std::time::Duration;

use crate::error::Result;
use crate::models::SourceConfig;

/// Create the shared asynchronous HTTP client.
///
/// One client serves both the data portal and the social network so the
/// connection pool and timeouts are configured in one place.
pub fn create_async_client(config: &SourceConfig) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(&config.user_agent)
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;
    Ok(client)
}

/// Truncate a response body for log output.
pub fn snippet(body: &str) -> String {
    const MAX: usize = 300;
    let trimmed = body.trim();
    match trimmed.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_builds_from_defaults() {
        assert!(create_async_client(&SourceConfig::default()).is_ok());
    }

    #[test]
    fn test_snippet_truncates_on_char_boundary() {
        let body = "é".repeat(400);
        let short = snippet(&body);
        assert!(short.ends_with("..."));
        assert_eq!(short.chars().count(), 303);
        assert_eq!(snippet("  ok \n"), "ok");
    }
}
