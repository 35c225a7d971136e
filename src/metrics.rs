// src/metrics.rs

//! Process counters and their Prometheus text rendering.
//!
//! The poll loop updates the counters; the optional HTTP exporter only reads them.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Upper bounds of the `processing_time_seconds` histogram buckets.
const BUCKETS: [f64; 11] = [0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// Shared counters for one bot process.
#[derive(Debug, Default)]
pub struct Metrics {
    restaurants_found: AtomicU64,
    posts_succeeded: AtomicU64,
    posts_failed: AtomicU64,
    records_filtered: AtomicU64,
    cycles_skipped: AtomicU64,
    processing: Histogram,
}

#[derive(Debug, Default)]
struct Histogram {
    buckets: [AtomicU64; BUCKETS.len()],
    count: AtomicU64,
    sum_micros: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MetricsSnapshot {
    pub restaurants_found: u64,
    pub posts_succeeded: u64,
    pub posts_failed: u64,
    pub records_filtered: u64,
    pub cycles_skipped: u64,
    pub processing_runs: u64,
    pub processing_seconds: f64,
}

impl Metrics {
    pub fn records_found(&self, n: usize) {
        self.restaurants_found.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn post_succeeded(&self) {
        self.posts_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn post_failed(&self) {
        self.posts_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_filtered(&self) {
        self.records_filtered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cycle_skipped(&self) {
        self.cycles_skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record how long one cycle took.
    pub fn observe_processing_time(&self, elapsed: Duration) {
        let secs = elapsed.as_secs_f64();
        for (bound, bucket) in BUCKETS.iter().zip(&self.processing.buckets) {
            if secs <= *bound {
                bucket.fetch_add(1, Ordering::Relaxed);
            }
        }
        self.processing.count.fetch_add(1, Ordering::Relaxed);
        self.processing
            .sum_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            restaurants_found: self.restaurants_found.load(Ordering::Relaxed),
            posts_succeeded: self.posts_succeeded.load(Ordering::Relaxed),
            posts_failed: self.posts_failed.load(Ordering::Relaxed),
            records_filtered: self.records_filtered.load(Ordering::Relaxed),
            cycles_skipped: self.cycles_skipped.load(Ordering::Relaxed),
            processing_runs: self.processing.count.load(Ordering::Relaxed),
            processing_seconds: self.processing.sum_micros.load(Ordering::Relaxed) as f64 / 1e6,
        }
    }

    /// Render every metric in the Prometheus text exposition format.
    pub fn render(&self) -> String {
        let snap = self.snapshot();
        let mut out = String::new();

        let counters = [
            (
                "restaurants_found_total",
                "Number of new restaurants found",
                snap.restaurants_found,
            ),
            (
                "posts_succeeded_total",
                "Number of successful posts",
                snap.posts_succeeded,
            ),
            ("posts_failed_total", "Number of failed posts", snap.posts_failed),
            (
                "records_filtered_total",
                "Number of records rejected by filters",
                snap.records_filtered,
            ),
            (
                "cycles_skipped_total",
                "Number of cycles skipped because the data source was unavailable",
                snap.cycles_skipped,
            ),
        ];
        for (name, help, value) in counters {
            let _ = writeln!(out, "# HELP {name} {help}");
            let _ = writeln!(out, "# TYPE {name} counter");
            let _ = writeln!(out, "{name} {value}");
        }

        let name = "processing_time_seconds";
        let _ = writeln!(out, "# HELP {name} Time spent processing one cycle");
        let _ = writeln!(out, "# TYPE {name} histogram");
        for (bound, bucket) in BUCKETS.iter().zip(&self.processing.buckets) {
            let _ = writeln!(
                out,
                "{name}_bucket{{le=\"{bound}\"}} {}",
                bucket.load(Ordering::Relaxed)
            );
        }
        let _ = writeln!(out, "{name}_bucket{{le=\"+Inf\"}} {}", snap.processing_runs);
        let _ = writeln!(out, "{name}_sum {}", snap.processing_seconds);
        let _ = writeln!(out, "{name}_count {}", snap.processing_runs);
        out
    }
}

/// Serve `/metrics` and `/health` until the process exits.
#[cfg(feature = "metrics")]
pub async fn serve(metrics: std::sync::Arc<Metrics>, port: u16) -> crate::error::Result<()> {
    use axum::{Router, extract::State, http::header, response::IntoResponse, routing::get};

    async fn render(State(metrics): State<std::sync::Arc<Metrics>>) -> impl IntoResponse {
        (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            metrics.render(),
        )
    }

    async fn health() -> &'static str {
        "ok"
    }

    let app = Router::new()
        .route("/metrics", get(render))
        .route("/health", get(health))
        .with_state(metrics);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    log::info!("Metrics server listening on port {}", port);
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}
