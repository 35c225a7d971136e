// src/pipeline/preview.rs

//! Dry run: fetch recent records, filter and format them, print what would be posted.

use chrono::{Duration, NaiveDateTime};

use crate::error::Result;
use crate::models::{BotConfig, Restaurant};
use crate::pipeline::filter::evaluate;
use crate::pipeline::format::PostFormatter;
use crate::services::LicenseSource;
use crate::storage::format_cursor;
use crate::utils::{group_thousands, log as report};

/// Totals printed at the end of a preview.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewSummary {
    pub previewed: usize,
    pub would_post: usize,
    /// Nothing was found and the built-in sample was shown instead
    pub used_sample: bool,
}

/// Preview the records filed in the `days` before `now` without posting anything.
///
/// Records are shown in the order the source returns them; the CLI asks for
/// newest first so a record cap keeps the most recent filings.
pub async fn run_preview<S: LicenseSource>(
    config: &BotConfig,
    source: &S,
    days: u32,
    now: NaiveDateTime,
) -> Result<PreviewSummary> {
    report::header("Chicago Restaurant Bot Post Preview");

    let since = now - Duration::days(i64::from(days));
    report::field("Fetching restaurants since", format_cursor(since));

    let mut restaurants = source.fetch_new_records(since).await?;
    let used_sample = restaurants.is_empty();
    if used_sample {
        println!("\nNo new restaurants found in the last {days} days.");
        println!("Showing sample restaurant instead:");
        restaurants = vec![Restaurant::sample(now)];
    } else {
        println!("\nFound {} new restaurants!", restaurants.len());
    }

    let formatter = PostFormatter::new(config);
    let total = restaurants.len();
    let mut would_post = 0;

    for (i, restaurant) in restaurants.iter().enumerate() {
        println!("\n=== Restaurant {}/{} ===", i + 1, total);
        print_details(restaurant);

        println!("\nFormatted Post Preview:");
        report::separator();
        let post = formatter.format(restaurant);
        println!("{}", post.text);
        println!();
        report::field("Character Count", post.length);
        if post.truncated {
            report::sub_item(&format!(
                "Truncated to fit {} characters",
                formatter.max_length()
            ));
        }

        let verdict = evaluate(restaurant, &config.filters);
        if verdict.passed() {
            would_post += 1;
            report::status(true, "Would be posted");
        } else {
            report::status(false, &format!("Would be filtered out ({verdict})"));
        }
        report::separator();
    }

    report::summary(
        "Preview",
        &[("Would be posted", format!("{would_post}/{total}"))],
    );

    Ok(PreviewSummary {
        previewed: total,
        would_post,
        used_sample,
    })
}

fn print_details(restaurant: &Restaurant) {
    fn or_unknown(value: Option<String>) -> String {
        value.unwrap_or_else(|| "-".to_string())
    }

    println!("\nRestaurant Details:");
    report::separator();
    report::field("Name", &restaurant.name);
    report::field("Address", &restaurant.address);
    report::field("ZIP", or_unknown(restaurant.zip_code.clone()));
    report::field("License", &restaurant.license_type);
    report::field("Activity", or_unknown(restaurant.business_activity.clone()));
    report::field(
        "Size",
        or_unknown(
            restaurant
                .square_footage
                .map(|sq| format!("{} sq ft", group_thousands(sq))),
        ),
    );
    report::field("Ward", or_unknown(restaurant.ward.map(|w| w.to_string())));
    report::field("Application Date", format_cursor(restaurant.application_date));
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::NaiveDate;

    use super::*;
    use crate::error::AppError;

    struct FixedSource {
        records: Vec<Restaurant>,
        asked_since: Mutex<Option<NaiveDateTime>>,
    }

    impl FixedSource {
        fn new(records: Vec<Restaurant>) -> Self {
            Self {
                records,
                asked_since: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl LicenseSource for FixedSource {
        async fn fetch_new_records(&self, since: NaiveDateTime) -> Result<Vec<Restaurant>> {
            *self.asked_since.lock().unwrap() = Some(since);
            Ok(self.records.clone())
        }
    }

    struct DownSource;

    #[async_trait]
    impl LicenseSource for DownSource {
        async fn fetch_new_records(&self, _since: NaiveDateTime) -> Result<Vec<Restaurant>> {
            Err(AppError::source_unavailable("connection refused"))
        }
    }

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 10)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[tokio::test]
    async fn test_preview_counts_records_that_would_post() {
        let mut config = BotConfig::default();
        config.filters.included_wards = vec![42];

        let inside = Restaurant::sample(now());
        let mut outside = Restaurant::sample(now());
        outside.name = "Far Away Grill".into();
        outside.ward = Some(3);

        let source = FixedSource::new(vec![inside, outside]);
        let summary = run_preview(&config, &source, 7, now()).await.unwrap();

        assert_eq!(
            summary,
            PreviewSummary {
                previewed: 2,
                would_post: 1,
                used_sample: false
            }
        );
        assert_eq!(
            *source.asked_since.lock().unwrap(),
            Some(now() - Duration::days(7))
        );
    }

    #[tokio::test]
    async fn test_preview_falls_back_to_sample() {
        let source = FixedSource::new(Vec::new());
        let summary = run_preview(&BotConfig::default(), &source, 3, now())
            .await
            .unwrap();

        assert!(summary.used_sample);
        assert_eq!(summary.previewed, 1);
        assert_eq!(summary.would_post, 1);
    }

    #[tokio::test]
    async fn test_preview_reports_source_errors() {
        let result = run_preview(&BotConfig::default(), &DownSource, 7, now()).await;
        assert!(matches!(result, Err(AppError::SourceUnavailable(_))));
    }
}
