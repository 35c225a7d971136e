// src/services/chicago.rs

//! Chicago Data Portal client.
//!
//! Queries the business licenses dataset through the SODA API for retail
//! food licenses filed after a cursor, following `$offset` pagination.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use reqwest::Client;
use serde::Deserialize;
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{Restaurant, SourceConfig};
use crate::storage::format_cursor;
use crate::utils::http::snippet;
use crate::utils::url::dataset_url;

const SELECT_FIELDS: &str = "legal_name,doing_business_as_name,address,zip_code,\
license_description,business_activity,square_footage,application_type,\
application_created_date,ward";

/// Source of license records newer than a cursor.
#[async_trait]
pub trait LicenseSource: Send + Sync {
    /// Fetch every record with `application_date > since`, oldest first
    /// unless the source is configured otherwise.
    ///
    /// Returns an empty vector when nothing is new. Network, HTTP and payload
    /// errors are reported as `SourceUnavailable`.
    async fn fetch_new_records(&self, since: NaiveDateTime) -> Result<Vec<Restaurant>>;
}

/// SODA client for the business licenses dataset.
pub struct ChicagoDataClient {
    client: Client,
    endpoint: Url,
    config: SourceConfig,
    app_token: Option<String>,
    max_records: Option<usize>,
    newest_first: bool,
}

impl ChicagoDataClient {
    /// Create a client for the dataset named in the configuration.
    pub fn new(client: Client, config: &SourceConfig, app_token: Option<String>) -> Result<Self> {
        let endpoint = dataset_url(&config.base_url, &config.dataset)?;
        Ok(Self {
            client,
            endpoint,
            config: config.clone(),
            app_token,
            max_records: None,
            newest_first: false,
        })
    }

    /// Stop paginating once this many records have been collected.
    pub fn with_max_records(mut self, max_records: usize) -> Self {
        self.max_records = Some(max_records);
        self
    }

    /// Return the newest records first. Combined with a record cap this
    /// keeps the most recent filings instead of the oldest.
    pub fn newest_first(mut self) -> Self {
        self.newest_first = true;
        self
    }

    /// SoQL `$order` clause. Ties are broken by name, address and row id.
    fn order_clause(&self) -> &'static str {
        if self.newest_first {
            "application_created_date DESC, legal_name ASC, address ASC, :id ASC"
        } else {
            "application_created_date ASC, legal_name ASC, address ASC, :id ASC"
        }
    }

    /// SoQL `$where` clause for records filed after `since`.
    fn where_clause(&self, since: NaiveDateTime) -> String {
        format!(
            "license_description like '{}' AND application_type='{}' \
             AND application_created_date > '{}'",
            escape_soql(&self.config.license_pattern),
            escape_soql(&self.config.application_type),
            format_cursor(since)
        )
    }

    /// Query parameters for one page.
    fn page_query(
        &self,
        since: NaiveDateTime,
        offset: usize,
        limit: usize,
    ) -> Vec<(&'static str, String)> {
        vec![
            ("$select", SELECT_FIELDS.to_string()),
            ("$where", self.where_clause(since)),
            ("$order", self.order_clause().to_string()),
            ("$limit", limit.to_string()),
            ("$offset", offset.to_string()),
        ]
    }

    /// Fetch one page of raw rows.
    async fn fetch_page(
        &self,
        since: NaiveDateTime,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<LicenseRow>> {
        let mut request = self
            .client
            .get(self.endpoint.clone())
            .header("Accept", "application/json")
            .query(&self.page_query(since, offset, limit));
        if let Some(token) = &self.app_token {
            request = request.header("X-App-Token", token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AppError::source_unavailable(format!("request failed: {e}")))?;
        log::debug!("Requested {}", response.url());

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::source_unavailable(format!("reading body failed: {e}")))?;
        if !status.is_success() {
            return Err(AppError::source_unavailable(format!(
                "portal returned {}: {}",
                status,
                snippet(&body)
            )));
        }

        serde_json::from_str(&body).map_err(|e| {
            AppError::source_unavailable(format!("malformed payload ({e}): {}", snippet(&body)))
        })
    }
}

#[async_trait]
impl LicenseSource for ChicagoDataClient {
    async fn fetch_new_records(&self, since: NaiveDateTime) -> Result<Vec<Restaurant>> {
        let page_size = self.config.page_size.max(1);
        let mut records = Vec::new();
        let mut offset = 0;

        loop {
            let limit = match self.max_records {
                Some(max) => page_size.min(max.saturating_sub(records.len())),
                None => page_size,
            };
            if limit == 0 {
                break;
            }

            let rows = self.fetch_page(since, offset, limit).await?;
            let row_count = rows.len();
            log::debug!("Fetched page at offset {}: {} rows", offset, row_count);

            records.extend(rows.into_iter().filter_map(LicenseRow::into_restaurant));

            if row_count < limit {
                break;
            }
            offset += row_count;
        }

        log::info!(
            "Found {} new license records since {}",
            records.len(),
            format_cursor(since)
        );
        Ok(records)
    }
}

/// Escape a literal for inclusion in a single-quoted SoQL string.
fn escape_soql(value: &str) -> String {
    value.replace('\'', "''")
}

/// A field the portal may send either as a JSON string or a number.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Number(f64),
}

impl Scalar {
    fn as_text(&self) -> Option<String> {
        let text = match self {
            Scalar::Text(s) => s.trim().to_string(),
            Scalar::Number(n) if n.fract() == 0.0 => format!("{}", *n as i64),
            Scalar::Number(n) => n.to_string(),
        };
        (!text.is_empty()).then_some(text)
    }

    fn as_number(&self) -> Option<f64> {
        match self {
            Scalar::Number(n) => Some(*n),
            Scalar::Text(s) => s.trim().replace(',', "").parse().ok(),
        }
    }
}

/// One row of the licenses dataset as sent by the portal.
#[derive(Debug, Default, Deserialize)]
struct LicenseRow {
    legal_name: Option<String>,
    doing_business_as_name: Option<String>,
    address: Option<String>,
    zip_code: Option<Scalar>,
    license_description: Option<String>,
    business_activity: Option<String>,
    square_footage: Option<Scalar>,
    application_created_date: Option<String>,
    ward: Option<Scalar>,
}

impl LicenseRow {
    /// Convert to a record, dropping rows without a name or application date.
    fn into_restaurant(self) -> Option<Restaurant> {
        let name = non_empty(self.doing_business_as_name).or_else(|| non_empty(self.legal_name));
        let Some(name) = name else {
            log::warn!("Skipping license row without a business name");
            return None;
        };

        let raw_date = non_empty(self.application_created_date);
        let Some(application_date) = raw_date.as_deref().and_then(parse_portal_timestamp) else {
            log::warn!(
                "Skipping '{}': missing or invalid application date {:?}",
                name,
                raw_date
            );
            return None;
        };

        Some(Restaurant {
            name,
            address: non_empty(self.address).unwrap_or_default(),
            ward: self
                .ward
                .and_then(|w| w.as_number())
                .filter(|w| *w >= 0.0 && w.fract() == 0.0)
                .map(|w| w as u32),
            zip_code: self.zip_code.and_then(|z| z.as_text()),
            business_activity: non_empty(self.business_activity),
            square_footage: self
                .square_footage
                .and_then(|s| s.as_number())
                .filter(|s| s.is_finite() && *s >= 0.0),
            license_type: non_empty(self.license_description).unwrap_or_default(),
            application_date,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse a SODA floating timestamp such as `2024-01-15T00:00:00.000`.
fn parse_portal_timestamp(raw: &str) -> Option<NaiveDateTime> {
    crate::storage::parse_cursor(raw).ok().or_else(|| {
        chrono::NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
    })
}
