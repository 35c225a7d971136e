//! Bot configuration structures loaded from `config.toml`.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

use crate::error::{AppError, Result};

/// Root bot configuration.
///
/// Immutable once loaded; every section falls back to the defaults below.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BotConfig {
    /// Data portal query settings
    #[serde(default)]
    pub source: SourceConfig,

    /// Announcement, formatting, throttling and retry toggles
    #[serde(default)]
    pub features: FeaturesConfig,

    /// Hashtags appended to every post
    #[serde(default)]
    pub hashtags: HashtagConfig,

    /// Line templates for the announcement text
    #[serde(default)]
    pub post_template: PostTemplate,

    /// Inclusion and exclusion rules
    #[serde(default)]
    pub filters: FilterConfig,

    /// Logging and metrics settings
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

impl BotConfig {
    /// Load configuration, using defaults when the file does not exist.
    ///
    /// A file that exists but cannot be read or parsed is an error.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| {
                AppError::config(format!("Failed to parse {}: {}", path.display(), e))
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::warn!(
                    "Config file {} not found. Using defaults.",
                    path.display()
                );
                Ok(Self::default())
            }
            Err(e) => Err(AppError::config(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    /// All hashtags in configuration order, default set first.
    pub fn all_hashtags(&self) -> Vec<String> {
        self.hashtags
            .default_tags
            .iter()
            .chain(self.hashtags.additional.iter())
            .cloned()
            .collect()
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.source.base_url.trim().is_empty() {
            return Err(AppError::config("source.base_url is empty"));
        }
        if self.source.dataset.trim().is_empty() {
            return Err(AppError::config("source.dataset is empty"));
        }
        if self.source.user_agent.trim().is_empty() {
            return Err(AppError::config("source.user_agent is empty"));
        }
        if self.source.timeout_secs == 0 {
            return Err(AppError::config("source.timeout_secs must be > 0"));
        }
        if self.source.page_size == 0 {
            return Err(AppError::config("source.page_size must be > 0"));
        }

        let formatting = &self.features.formatting;
        if formatting.max_length == 0 {
            return Err(AppError::config(
                "features.formatting.max_length must be > 0",
            ));
        }
        // Header plus a newline and at least a few characters of the name must fit.
        let header_len = self.post_template.header.graphemes(true).count();
        if header_len + 1 + MIN_NAME_BUDGET > formatting.max_length {
            return Err(AppError::config(format!(
                "post_template.header is {} characters; it leaves no room for the name within {}",
                header_len, formatting.max_length
            )));
        }
        if !self.post_template.name_line.contains("{name}") {
            return Err(AppError::config(
                "post_template.name_line must contain {name}",
            ));
        }
        if !self.post_template.address_line.contains("{address}") {
            return Err(AppError::config(
                "post_template.address_line must contain {address}",
            ));
        }

        if self.features.throttling.enabled && self.features.throttling.min_delay_between_posts == 0
        {
            log::warn!("Throttling is enabled with a zero delay; it has no effect");
        }

        if !matches!(
            self.monitoring.log_level.to_lowercase().as_str(),
            "trace" | "debug" | "info" | "warn" | "warning" | "error" | "critical"
        ) {
            return Err(AppError::config(format!(
                "monitoring.log_level '{}' is not a known level",
                self.monitoring.log_level
            )));
        }
        if self.monitoring.enable_metrics && self.monitoring.metrics_port == 0 {
            return Err(AppError::config("monitoring.metrics_port must be > 0"));
        }
        Ok(())
    }
}

/// Smallest number of name characters the header must leave room for.
const MIN_NAME_BUDGET: usize = 8;

/// Data portal query settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// SODA resource root
    #[serde(default = "defaults::base_url")]
    pub base_url: String,

    /// Dataset identifier of the business licenses table
    #[serde(default = "defaults::dataset")]
    pub dataset: String,

    /// SoQL `like` pattern applied to `license_description`
    #[serde(default = "defaults::license_pattern")]
    pub license_pattern: String,

    /// Only applications of this type are announced
    #[serde(default = "defaults::application_type")]
    pub application_type: String,

    /// Rows requested per page
    #[serde(default = "defaults::page_size")]
    pub page_size: usize,

    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::base_url(),
            dataset: defaults::dataset(),
            license_pattern: defaults::license_pattern(),
            application_type: defaults::application_type(),
            page_size: defaults::page_size(),
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
        }
    }
}

/// Grouped feature flags.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeaturesConfig {
    #[serde(default)]
    pub announcement: AnnouncementFlags,

    #[serde(default)]
    pub formatting: FormattingFlags,

    #[serde(default)]
    pub throttling: ThrottlingConfig,

    #[serde(default)]
    pub error_handling: ErrorHandlingConfig,
}

/// Which optional lines appear in an announcement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnouncementFlags {
    #[serde(default = "defaults::enabled")]
    pub include_ward: bool,

    #[serde(default = "defaults::enabled")]
    pub include_square_footage: bool,

    #[serde(default = "defaults::enabled")]
    pub include_business_activity: bool,
}

impl Default for AnnouncementFlags {
    fn default() -> Self {
        Self {
            include_ward: true,
            include_square_footage: true,
            include_business_activity: true,
        }
    }
}

/// Text formatting toggles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormattingFlags {
    #[serde(default = "defaults::enabled")]
    pub use_emojis: bool,

    #[serde(default = "defaults::enabled")]
    pub add_hashtags: bool,

    /// Platform limit in grapheme clusters
    #[serde(default = "defaults::max_length")]
    pub max_length: usize,

    /// BCP-47 language tag attached to posts
    #[serde(default = "defaults::language")]
    pub language: String,
}

impl Default for FormattingFlags {
    fn default() -> Self {
        Self {
            use_emojis: true,
            add_hashtags: true,
            max_length: defaults::max_length(),
            language: defaults::language(),
        }
    }
}

/// Minimum spacing between publish calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThrottlingConfig {
    #[serde(default = "defaults::enabled")]
    pub enabled: bool,

    /// Seconds between two consecutive publish calls
    #[serde(default = "defaults::min_delay_between_posts")]
    pub min_delay_between_posts: u64,
}

impl Default for ThrottlingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_delay_between_posts: defaults::min_delay_between_posts(),
        }
    }
}

/// Retry policy for failed posts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorHandlingConfig {
    #[serde(default = "defaults::enabled")]
    pub auto_retry: bool,

    /// Seconds to wait before retrying a failed post
    #[serde(default = "defaults::retry_delay")]
    pub retry_delay: u64,

    /// Retries after the first attempt
    #[serde(default = "defaults::max_retries")]
    pub max_retries: u32,
}

impl Default for ErrorHandlingConfig {
    fn default() -> Self {
        Self {
            auto_retry: true,
            retry_delay: defaults::retry_delay(),
            max_retries: defaults::max_retries(),
        }
    }
}

/// Hashtag lists; `default` and `additional` are concatenated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashtagConfig {
    #[serde(rename = "default", default = "defaults::hashtags")]
    pub default_tags: Vec<String>,

    #[serde(default)]
    pub additional: Vec<String>,
}

impl Default for HashtagConfig {
    fn default() -> Self {
        Self {
            default_tags: defaults::hashtags(),
            additional: Vec::new(),
        }
    }
}

/// Announcement line templates.
///
/// Supported placeholders:
/// - `{prefix}` (the line's emoji, empty when emojis are off)
/// - `{name}`, `{address}`, `{zip_code}`, `{business_activity}`
/// - `{square_footage}`, `{ward}`, `{license_type}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostTemplate {
    /// First line of every post
    #[serde(default = "defaults::header")]
    pub header: String,

    #[serde(default = "defaults::name_prefix")]
    pub name_prefix: String,
    #[serde(default = "defaults::address_prefix")]
    pub address_prefix: String,
    #[serde(default = "defaults::activity_prefix")]
    pub activity_prefix: String,
    #[serde(default = "defaults::square_footage_prefix")]
    pub square_footage_prefix: String,
    #[serde(default = "defaults::ward_prefix")]
    pub ward_prefix: String,

    #[serde(default = "defaults::name_line")]
    pub name_line: String,
    #[serde(default = "defaults::address_line")]
    pub address_line: String,
    #[serde(default = "defaults::activity_line")]
    pub activity_line: String,
    #[serde(default = "defaults::square_footage_line")]
    pub square_footage_line: String,
    #[serde(default = "defaults::ward_line")]
    pub ward_line: String,
}

impl Default for PostTemplate {
    fn default() -> Self {
        Self {
            header: defaults::header(),
            name_prefix: defaults::name_prefix(),
            address_prefix: defaults::address_prefix(),
            activity_prefix: defaults::activity_prefix(),
            square_footage_prefix: defaults::square_footage_prefix(),
            ward_prefix: defaults::ward_prefix(),
            name_line: defaults::name_line(),
            address_line: defaults::address_line(),
            activity_line: defaults::activity_line(),
            square_footage_line: defaults::square_footage_line(),
            ward_line: defaults::ward_line(),
        }
    }
}

/// Filter rule sets. Empty lists impose no restriction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterConfig {
    #[serde(default)]
    pub excluded_license_types: Vec<String>,

    #[serde(default)]
    pub included_wards: Vec<u32>,

    #[serde(default)]
    pub included_zip_codes: Vec<String>,
}

/// Logging and metrics settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    #[serde(default = "defaults::log_level")]
    pub log_level: String,

    #[serde(default)]
    pub enable_metrics: bool,

    #[serde(default = "defaults::metrics_port")]
    pub metrics_port: u16,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            log_level: defaults::log_level(),
            enable_metrics: false,
            metrics_port: defaults::metrics_port(),
        }
    }
}

mod defaults {
    // Source defaults
    pub fn base_url() -> String {
        "https://data.cityofchicago.org/resource/".into()
    }
    pub fn dataset() -> String {
        "xqx5-8hwx".into()
    }
    pub fn license_pattern() -> String {
        "%RETAIL FOOD%".into()
    }
    pub fn application_type() -> String {
        "ISSUE".into()
    }
    pub fn page_size() -> usize {
        100
    }
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; restaurant-bot/0.1)".into()
    }
    pub fn timeout() -> u64 {
        30
    }

    // Feature defaults
    pub fn enabled() -> bool {
        true
    }
    pub fn max_length() -> usize {
        300
    }
    pub fn language() -> String {
        "en".into()
    }
    pub fn min_delay_between_posts() -> u64 {
        2
    }
    pub fn retry_delay() -> u64 {
        300
    }
    pub fn max_retries() -> u32 {
        3
    }

    pub fn hashtags() -> Vec<String> {
        vec![
            "Chicago".into(),
            "ChicagoFood".into(),
            "NewRestaurant".into(),
        ]
    }

    // Template defaults
    pub fn header() -> String {
        "🆕 New Restaurant Alert!\n".into()
    }
    pub fn name_prefix() -> String {
        "🍽️".into()
    }
    pub fn address_prefix() -> String {
        "📍".into()
    }
    pub fn activity_prefix() -> String {
        "🍳".into()
    }
    pub fn square_footage_prefix() -> String {
        "📐".into()
    }
    pub fn ward_prefix() -> String {
        "📍".into()
    }
    pub fn name_line() -> String {
        "{prefix} {name}".into()
    }
    pub fn address_line() -> String {
        "{prefix} {address}, Chicago IL {zip_code}".into()
    }
    pub fn activity_line() -> String {
        "{prefix} {business_activity}".into()
    }
    pub fn square_footage_line() -> String {
        "{prefix} {square_footage} sq ft".into()
    }
    pub fn ward_line() -> String {
        "{prefix} Located in Ward {ward}".into()
    }

    // Monitoring defaults
    pub fn log_level() -> String {
        "info".into()
    }
    pub fn metrics_port() -> u16 {
        9090
    }
}
