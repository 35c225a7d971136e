// src/pipeline/poll.rs

//! The polling loop.
//!
//! One cycle: read cursor → fetch → dedupe and filter → format and publish
//! → advance cursor. The cursor only moves after every fetched record was
//! attempted, and always to the newest application date of the batch, so a
//! record that permanently failed to post is not retried on the next cycle.
//!
//! A stop request is honored between publishes, but only at a change of
//! application date: records sharing a date are attempted together, so the
//! cursor can move past that date without re-posting any of them.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use tokio::sync::watch;

use crate::error::Result;
use crate::metrics::Metrics;
use crate::models::{BotConfig, FilterConfig, NaturalKey, Restaurant};
use crate::pipeline::filter::evaluate;
use crate::pipeline::format::PostFormatter;
use crate::services::{LicenseSource, Poster, PublishOutcome, Publisher};
use crate::storage::{CursorStore, format_cursor};

/// Where the loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    Fetching,
    Filtering,
    Posting,
    AdvancingCursor,
    Sleeping,
    Aborted,
}

impl fmt::Display for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CycleState::Idle => "IDLE",
            CycleState::Fetching => "FETCHING",
            CycleState::Filtering => "FILTERING",
            CycleState::Posting => "POSTING",
            CycleState::AdvancingCursor => "ADVANCING_CURSOR",
            CycleState::Sleeping => "SLEEPING",
            CycleState::Aborted => "ABORTED",
        };
        f.write_str(name)
    }
}

/// What happened in one cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub cursor_before: NaiveDateTime,
    pub cursor_after: NaiveDateTime,
    pub fetched: usize,
    pub duplicates: usize,
    pub filtered_out: usize,
    pub posted: usize,
    pub failed: Vec<(NaturalKey, String)>,
    /// The source was unavailable; nothing else ran
    pub skipped: bool,
    /// A stop was requested before every record was attempted
    pub interrupted: bool,
}

impl CycleReport {
    fn new(cursor: NaiveDateTime) -> Self {
        Self {
            cursor_before: cursor,
            cursor_after: cursor,
            fetched: 0,
            duplicates: 0,
            filtered_out: 0,
            posted: 0,
            failed: Vec::new(),
            skipped: false,
            interrupted: false,
        }
    }

    fn log_summary(&self) {
        if self.skipped {
            log::warn!(
                "Cycle skipped; cursor stays at {}",
                format_cursor(self.cursor_before)
            );
            return;
        }
        log::info!(
            "Cycle done: {} fetched, {} duplicate(s), {} filtered out, {} posted, {} failed; \
             cursor {} -> {}",
            self.fetched,
            self.duplicates,
            self.filtered_out,
            self.posted,
            self.failed.len(),
            format_cursor(self.cursor_before),
            format_cursor(self.cursor_after)
        );
    }
}

/// Orchestrates source, filter, formatter, publisher and cursor store.
pub struct PollLoop<S, P, C> {
    source: S,
    publisher: Publisher<P>,
    cursor_store: C,
    formatter: PostFormatter,
    filters: FilterConfig,
    interval: Duration,
    metrics: Arc<Metrics>,
    shutdown: Option<watch::Receiver<bool>>,
    state: CycleState,
}

impl<S, P, C> PollLoop<S, P, C>
where
    S: LicenseSource,
    P: Poster,
    C: CursorStore,
{
    pub fn new(
        config: &BotConfig,
        source: S,
        poster: P,
        cursor_store: C,
        interval: Duration,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            source,
            publisher: Publisher::new(poster, &config.features),
            cursor_store,
            formatter: PostFormatter::new(config),
            filters: config.filters.clone(),
            interval,
            metrics,
            shutdown: None,
            state: CycleState::Idle,
        }
    }

    /// Stop at the next safe point once the receiver reads `true`.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn state(&self) -> CycleState {
        self.state
    }

    fn transition(&mut self, next: CycleState) {
        log::debug!("State {} -> {}", self.state, next);
        self.state = next;
    }

    fn stop_requested(&self) -> bool {
        self.shutdown.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Run cycles until a stop is requested or a fatal error occurs.
    pub async fn run(&mut self) -> Result<()> {
        log::info!(
            "Starting poll loop (checking every {} minutes)",
            self.interval.as_secs() / 60
        );

        loop {
            match self.run_cycle().await {
                Ok(report) if report.interrupted => break,
                Ok(_) => {}
                Err(e) => {
                    self.transition(CycleState::Aborted);
                    log::error!("Aborting: {}", e);
                    return Err(e);
                }
            }

            if self.stop_requested() {
                break;
            }
            self.transition(CycleState::Sleeping);
            if self.sleep_or_stop().await {
                break;
            }
        }

        log::info!("Stop requested; poll loop exiting");
        self.transition(CycleState::Idle);
        Ok(())
    }

    /// Sleep for the interval. Returns true when woken by a stop request.
    async fn sleep_or_stop(&mut self) -> bool {
        let sleep = tokio::time::sleep(self.interval);
        let Some(rx) = self.shutdown.as_mut() else {
            sleep.await;
            return false;
        };
        tokio::pin!(sleep);

        let stopped = tokio::select! {
            _ = &mut sleep => return false,
            res = rx.wait_for(|stop| *stop) => res.is_ok(),
        };
        if !stopped {
            // Sender gone; nobody can ask us to stop any more.
            sleep.await;
        }
        stopped
    }

    /// Read the cursor, bootstrapping it to one interval ago when none is stored.
    async fn read_cursor(&mut self) -> Result<NaiveDateTime> {
        if let Some(cursor) = self.cursor_store.load().await? {
            return Ok(cursor);
        }
        let interval =
            chrono::Duration::from_std(self.interval).unwrap_or(chrono::Duration::hours(1));
        let cursor = Local::now().naive_local() - interval;
        log::info!(
            "No cursor stored; starting from {}",
            format_cursor(cursor)
        );
        self.cursor_store.save(cursor).await?;
        Ok(cursor)
    }

    /// Run exactly one cycle.
    ///
    /// Errors returned here are fatal. A source outage is reported through
    /// `CycleReport::skipped` instead.
    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        let started = std::time::Instant::now();
        self.transition(CycleState::Idle);

        let cursor = self.read_cursor().await?;
        let mut report = CycleReport::new(cursor);

        self.transition(CycleState::Fetching);
        let fetched = match self.source.fetch_new_records(cursor).await {
            Ok(records) => records,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                log::warn!("Fetching new licenses failed: {}", e);
                self.metrics.cycle_skipped();
                report.skipped = true;
                report.log_summary();
                return Ok(report);
            }
        };
        report.fetched = fetched.len();
        self.metrics.records_found(fetched.len());
        let batch_dates: Vec<NaiveDateTime> =
            fetched.iter().map(|r| r.application_date).collect();

        self.transition(CycleState::Filtering);
        let (unique, duplicates) = dedupe(fetched);
        report.duplicates = duplicates;

        let mut candidates: Vec<Restaurant> = Vec::with_capacity(unique.len());
        for restaurant in unique {
            let verdict = evaluate(&restaurant, &self.filters);
            if verdict.passed() {
                candidates.push(restaurant);
            } else {
                log::info!("Skipping {} - {}", restaurant.natural_key(), verdict);
                report.filtered_out += 1;
                self.metrics.record_filtered();
            }
        }
        candidates.sort_by(Restaurant::cmp_for_posting);

        self.transition(CycleState::Posting);
        let mut last_attempted: Option<NaiveDateTime> = None;
        let mut next_unattempted = None;
        for restaurant in &candidates {
            // A stop only takes effect once every record sharing the last
            // attempted date has been attempted.
            let at_date_boundary =
                last_attempted.is_none_or(|last| restaurant.application_date > last);
            if at_date_boundary && self.stop_requested() {
                next_unattempted = Some(restaurant.application_date);
                report.interrupted = true;
                break;
            }
            last_attempted = Some(restaurant.application_date);

            let key = restaurant.natural_key();
            let post = self.formatter.format(restaurant);
            if post.truncated {
                log::debug!(
                    "Announcement for {} truncated to {} characters",
                    key,
                    post.length
                );
            }

            match self.publisher.publish(&key, &post).await {
                Ok(PublishOutcome::Posted { .. }) => {
                    report.posted += 1;
                    self.metrics.post_succeeded();
                }
                Ok(PublishOutcome::Failed { attempts, reason }) => {
                    log::error!(
                        "Permanently failed to post {} after {} attempt(s): {}",
                        key,
                        attempts,
                        reason
                    );
                    report.failed.push((key, reason));
                    self.metrics.post_failed();
                }
                Err(e) => {
                    self.metrics.post_failed();
                    self.transition(CycleState::Aborted);
                    return Err(e);
                }
            }
        }

        self.transition(CycleState::AdvancingCursor);
        // On a stop request only dates strictly older than the first
        // unattempted record count as processed.
        let target = batch_dates
            .iter()
            .copied()
            .filter(|d| next_unattempted.is_none_or(|next| *d < next))
            .max();
        if let Some(target) = target.filter(|t| *t > cursor) {
            self.cursor_store.save(target).await?;
            report.cursor_after = target;
        }

        self.metrics.observe_processing_time(started.elapsed());
        report.log_summary();
        Ok(report)
    }
}

/// Drop records whose natural key was already seen, keeping the first.
fn dedupe(records: Vec<Restaurant>) -> (Vec<Restaurant>, usize) {
    let mut seen = HashSet::new();
    let mut unique = Vec::with_capacity(records.len());
    let mut duplicates = 0;
    for record in records {
        if seen.insert(record.natural_key()) {
            unique.push(record);
        } else {
            log::debug!("Dropping duplicate {}", record.natural_key());
            duplicates += 1;
        }
    }
    (unique, duplicates)
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::NaiveDate;

    use super::*;
    use crate::error::AppError;
    use crate::services::publisher::tests::{ScriptedPoster, receipt};
    use crate::services::PostReceipt;

    /// Source that replays one scripted response per cycle, then returns nothing.
    #[derive(Clone, Default)]
    struct ScriptedSource {
        responses: Arc<Mutex<VecDeque<Result<Vec<Restaurant>>>>>,
        seen_cursors: Arc<Mutex<Vec<NaiveDateTime>>>,
    }

    impl ScriptedSource {
        fn new(responses: Vec<Result<Vec<Restaurant>>>) -> Self {
            Self {
                responses: Arc::new(Mutex::new(responses.into())),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl LicenseSource for ScriptedSource {
        async fn fetch_new_records(&self, since: NaiveDateTime) -> Result<Vec<Restaurant>> {
            self.seen_cursors.lock().unwrap().push(since);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    /// In-memory cursor store that counts saves.
    #[derive(Clone, Default)]
    struct MemoryCursor {
        value: Arc<Mutex<Option<NaiveDateTime>>>,
        saves: Arc<Mutex<usize>>,
        corrupt: bool,
    }

    impl MemoryCursor {
        fn at(cursor: NaiveDateTime) -> Self {
            Self {
                value: Arc::new(Mutex::new(Some(cursor))),
                ..Self::default()
            }
        }

        fn get(&self) -> Option<NaiveDateTime> {
            *self.value.lock().unwrap()
        }
    }

    #[async_trait]
    impl CursorStore for MemoryCursor {
        async fn load(&self) -> Result<Option<NaiveDateTime>> {
            if self.corrupt {
                return Err(AppError::cursor_corrupt(
                    std::path::Path::new("memory"),
                    "garbage",
                ));
            }
            Ok(*self.value.lock().unwrap())
        }

        async fn save(&self, cursor: NaiveDateTime) -> Result<()> {
            *self.value.lock().unwrap() = Some(cursor);
            *self.saves.lock().unwrap() += 1;
            Ok(())
        }
    }

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 4, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn record(name: &str, date: NaiveDateTime) -> Restaurant {
        let mut r = Restaurant::sample(date);
        r.name = name.to_string();
        r
    }

    fn quick_config() -> BotConfig {
        let mut config = BotConfig::default();
        config.features.throttling.min_delay_between_posts = 1;
        config.features.error_handling.retry_delay = 10;
        config.features.error_handling.max_retries = 3;
        config
    }

    fn poll_loop(
        config: &BotConfig,
        source: ScriptedSource,
        poster: ScriptedPoster,
        cursor: MemoryCursor,
    ) -> PollLoop<ScriptedSource, ScriptedPoster, MemoryCursor> {
        PollLoop::new(
            config,
            source,
            poster,
            cursor,
            Duration::from_secs(3600),
            Arc::new(Metrics::default()),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_excluded_record_is_not_posted_and_cursor_advances() {
        let mut config = quick_config();
        config.filters.excluded_license_types = vec!["Mobile Food License".into()];

        let mut excluded = record("Taco Truck", at(3, 10));
        excluded.license_type = "Mobile Food License".into();
        let kept = record("Noodle Bar", at(2, 9));

        let source = ScriptedSource::new(vec![Ok(vec![kept, excluded])]);
        let poster = ScriptedPoster::default();
        let cursor = MemoryCursor::at(at(1, 0));
        let mut poll = poll_loop(&config, source, poster.clone(), cursor.clone());

        let report = poll.run_cycle().await.unwrap();

        assert_eq!(poster.call_count(), 1);
        assert!(poster.posted_texts()[0].contains("Noodle Bar"));
        assert_eq!(report.filtered_out, 1);
        assert_eq!(report.posted, 1);
        assert_eq!(cursor.get(), Some(at(3, 10)));
        assert_eq!(report.cursor_after, at(3, 10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_records_leave_cursor_untouched() {
        let source = ScriptedSource::new(vec![Ok(Vec::new())]);
        let poster = ScriptedPoster::default();
        let cursor = MemoryCursor::at(at(1, 0));
        let mut poll = poll_loop(&quick_config(), source, poster.clone(), cursor.clone());

        let report = poll.run_cycle().await.unwrap();

        assert_eq!(poster.call_count(), 0);
        assert_eq!(cursor.get(), Some(at(1, 0)));
        assert_eq!(*cursor.saves.lock().unwrap(), 0);
        assert_eq!(report.cursor_after, report.cursor_before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_source_unavailable_skips_cycle() {
        let source = ScriptedSource::new(vec![
            Err(AppError::source_unavailable("503")),
            Ok(vec![record("Late Diner", at(2, 8))]),
        ]);
        let poster = ScriptedPoster::default();
        let cursor = MemoryCursor::at(at(1, 0));
        let mut poll = poll_loop(&quick_config(), source.clone(), poster.clone(), cursor.clone());

        let first = poll.run_cycle().await.unwrap();
        assert!(first.skipped);
        assert_eq!(poster.call_count(), 0);
        assert_eq!(cursor.get(), Some(at(1, 0)));

        let second = poll.run_cycle().await.unwrap();
        assert_eq!(second.posted, 1);
        assert_eq!(cursor.get(), Some(at(2, 8)));

        // Both cycles asked for the same window.
        assert_eq!(*source.seen_cursors.lock().unwrap(), vec![at(1, 0), at(1, 0)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_twice_then_success_counts_as_posted() {
        let source = ScriptedSource::new(vec![Ok(vec![record("Bakery", at(2, 7))])]);
        let poster = ScriptedPoster::with_script(vec![
            Err(AppError::RateLimited("429".into())),
            Err(AppError::TransientPublish("503".into())),
            Ok(receipt(1)),
        ]);
        let cursor = MemoryCursor::at(at(1, 0));
        let mut poll = poll_loop(&quick_config(), source, poster.clone(), cursor);

        let report = poll.run_cycle().await.unwrap();

        assert_eq!(poster.call_count(), 3);
        assert_eq!(report.posted, 1);
        assert!(report.failed.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_continue_batch_and_advance_cursor() {
        let failing = record("Unlucky Cafe", at(2, 7));
        let next = record("Lucky Grill", at(3, 7));
        let source = ScriptedSource::new(vec![Ok(vec![failing.clone(), next])]);

        // First record: 1 attempt + 3 retries, all transient failures.
        let poster = ScriptedPoster::with_script(
            (0..4)
                .map(|_| Err(AppError::TransientPublish("timeout".into())))
                .collect(),
        );
        let cursor = MemoryCursor::at(at(1, 0));
        let mut poll = poll_loop(&quick_config(), source, poster.clone(), cursor.clone());

        let report = poll.run_cycle().await.unwrap();

        assert_eq!(poster.call_count(), 5);
        assert!(poster.posted_texts()[4].contains("Lucky Grill"));
        assert_eq!(report.posted, 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, failing.natural_key());
        assert_eq!(cursor.get(), Some(at(3, 7)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_authentication_failure_aborts_without_advancing() {
        let source = ScriptedSource::new(vec![Ok(vec![
            record("First", at(2, 7)),
            record("Second", at(3, 7)),
        ])]);
        let poster =
            ScriptedPoster::with_script(vec![Err(AppError::authentication("401: bad token"))]);
        let cursor = MemoryCursor::at(at(1, 0));
        let mut poll = poll_loop(&quick_config(), source, poster.clone(), cursor.clone());

        let result = poll.run_cycle().await;

        assert!(matches!(result, Err(AppError::Authentication(_))));
        assert_eq!(poll.state(), CycleState::Aborted);
        assert_eq!(poster.call_count(), 1);
        assert_eq!(cursor.get(), Some(at(1, 0)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_corrupt_cursor_is_fatal() {
        let cursor = MemoryCursor {
            corrupt: true,
            ..MemoryCursor::default()
        };
        let mut poll = poll_loop(
            &quick_config(),
            ScriptedSource::default(),
            ScriptedPoster::default(),
            cursor,
        );
        let err = poll.run().await.unwrap_err();
        assert!(matches!(err, AppError::CursorStoreCorrupt { .. }));
        assert_eq!(poll.state(), CycleState::Aborted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicates_in_batch_post_once_in_date_order() {
        let a = record("Alpha", at(3, 9));
        let b = record("Beta", at(2, 9));
        let source = ScriptedSource::new(vec![Ok(vec![a.clone(), b, a])]);
        let poster = ScriptedPoster::default();
        let mut poll = poll_loop(
            &quick_config(),
            source,
            poster.clone(),
            MemoryCursor::at(at(1, 0)),
        );

        let report = poll.run_cycle().await.unwrap();

        assert_eq!(report.duplicates, 1);
        let texts = poster.posted_texts();
        assert_eq!(texts.len(), 2);
        assert!(texts[0].contains("Beta"));
        assert!(texts[1].contains("Alpha"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cursor_never_moves_backwards() {
        // A stale record older than the cursor must not rewind it.
        let source = ScriptedSource::new(vec![Ok(vec![record("Old Timer", at(1, 0))])]);
        let cursor = MemoryCursor::at(at(5, 0));
        let mut poll = poll_loop(
            &quick_config(),
            source,
            ScriptedPoster::default(),
            cursor.clone(),
        );

        poll.run_cycle().await.unwrap();
        assert_eq!(cursor.get(), Some(at(5, 0)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_cursor_bootstraps_one_interval_back() {
        let cursor = MemoryCursor::default();
        let mut poll = poll_loop(
            &quick_config(),
            ScriptedSource::default(),
            ScriptedPoster::default(),
            cursor.clone(),
        );

        let before = Local::now().naive_local() - chrono::Duration::hours(1);
        let report = poll.run_cycle().await.unwrap();
        let after = Local::now().naive_local() - chrono::Duration::hours(1);

        let stored = cursor.get().unwrap();
        assert!(stored >= before && stored <= after);
        assert_eq!(report.cursor_before, stored);
    }

    /// Requests a stop as soon as the first post goes out.
    #[derive(Clone)]
    struct StopAfterFirst {
        inner: ScriptedPoster,
        tx: Arc<watch::Sender<bool>>,
    }

    #[async_trait]
    impl Poster for StopAfterFirst {
        async fn post(&self, post: &crate::pipeline::FormattedPost) -> Result<PostReceipt> {
            let receipt = self.inner.post(post).await;
            let _ = self.tx.send(true);
            receipt
        }
    }

    /// Source backed by a fixed data set, answering `> since` like the portal does.
    #[derive(Clone)]
    struct WindowSource {
        records: Vec<Restaurant>,
    }

    #[async_trait]
    impl LicenseSource for WindowSource {
        async fn fetch_new_records(&self, since: NaiveDateTime) -> Result<Vec<Restaurant>> {
            Ok(self
                .records
                .iter()
                .filter(|r| r.application_date > since)
                .cloned()
                .collect())
        }
    }

    fn stopping_loop<S: LicenseSource>(
        source: S,
        inner: &ScriptedPoster,
        cursor: &MemoryCursor,
    ) -> PollLoop<S, StopAfterFirst, MemoryCursor> {
        let (tx, rx) = watch::channel(false);
        let poster = StopAfterFirst {
            inner: inner.clone(),
            tx: Arc::new(tx),
        };
        PollLoop::new(
            &quick_config(),
            source,
            poster,
            cursor.clone(),
            Duration::from_secs(3600),
            Arc::new(Metrics::default()),
        )
        .with_shutdown(rx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_between_publishes_keeps_unattempted_window() {
        let first = record("First", at(2, 7));
        let second = record("Second", at(3, 7));
        let source = ScriptedSource::new(vec![Ok(vec![first, second])]);

        let inner = ScriptedPoster::default();
        let cursor = MemoryCursor::at(at(1, 0));
        let mut poll = stopping_loop(source, &inner, &cursor);

        poll.run().await.unwrap();

        assert_eq!(inner.call_count(), 1);
        // Cursor covers the first record only; the second is fetched again next run.
        assert_eq!(cursor.get(), Some(at(2, 7)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_waits_for_records_sharing_a_date() {
        let source = WindowSource {
            records: vec![
                record("Alpha", at(2, 0)),
                record("Beta", at(2, 0)),
                record("Gamma", at(3, 0)),
            ],
        };
        let inner = ScriptedPoster::default();
        let cursor = MemoryCursor::at(at(1, 0));

        let mut first_run = stopping_loop(source.clone(), &inner, &cursor);
        let report = first_run.run_cycle().await.unwrap();

        assert!(report.interrupted);
        assert_eq!(report.posted, 2);
        assert_eq!(cursor.get(), Some(at(2, 0)));

        // Restart: only the record after the stop point is posted.
        let mut second_run = stopping_loop(source, &inner, &cursor);
        second_run.run_cycle().await.unwrap();

        let names: Vec<String> = inner
            .posted_texts()
            .iter()
            .filter_map(|text| {
                text.lines()
                    .find(|line| line.starts_with("🍽️"))
                    .map(str::to_string)
            })
            .collect();
        assert_eq!(names, vec!["🍽️ Alpha", "🍽️ Beta", "🍽️ Gamma"]);
        assert_eq!(cursor.get(), Some(at(3, 0)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_metrics_follow_cycle() {
        let metrics = Arc::new(Metrics::default());
        let mut config = quick_config();
        config.filters.included_wards = vec![1];
        config.features.error_handling.auto_retry = false;

        let mut in_ward = record("Ward One Cafe", at(2, 7));
        in_ward.ward = Some(1);
        let mut failing = record("Ward One Deli", at(2, 8));
        failing.ward = Some(1);
        let outside = record("Elsewhere", at(2, 9));

        let source = ScriptedSource::new(vec![Ok(vec![in_ward, failing, outside])]);
        let poster = ScriptedPoster::with_script(vec![
            Ok(receipt(1)),
            Err(AppError::PermanentPublish("400".into())),
        ]);
        let mut poll = PollLoop::new(
            &config,
            source,
            poster,
            MemoryCursor::at(at(1, 0)),
            Duration::from_secs(60),
            Arc::clone(&metrics),
        );

        poll.run_cycle().await.unwrap();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.restaurants_found, 3);
        assert_eq!(snapshot.records_filtered, 1);
        assert_eq!(snapshot.posts_succeeded, 1);
        assert_eq!(snapshot.posts_failed, 1);
        assert_eq!(snapshot.processing_runs, 1);
    }
}
