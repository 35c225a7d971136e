//! Chicago Restaurant Bot CLI
//!
//! Local execution entry point.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Local;
use clap::{Parser, Subcommand};
use restaurant_bot::{
    config::{self, Settings},
    error::{AppError, Result},
    metrics::Metrics,
    models::BotConfig,
    pipeline::{self, PollLoop},
    services::{BlueskyClient, ChicagoDataClient},
    storage::{CursorStore, FileCursorStore, format_cursor},
    utils::{http, log as report},
};
use tokio::sync::watch;

/// Chicago Restaurant Bot - announces new restaurant licenses on Bluesky
#[derive(Parser, Debug)]
#[command(
    name = "restaurant-bot",
    version,
    about = "Announces newly licensed Chicago restaurants on Bluesky"
)]
struct Cli {
    /// Path to the TOML configuration (overrides CONFIG_PATH)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll and post until stopped
    Run,

    /// Run a single poll cycle and exit
    Once,

    /// Show what would be posted for recent licenses, without posting
    Preview {
        /// How many days back to look
        #[arg(long, default_value_t = 7)]
        days: u32,

        /// Maximum number of records to fetch, newest first
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },

    /// Validate configuration and environment
    Validate,

    /// Show current settings and cursor
    Info,
}

/// Writes every log line to stderr and to the log file.
struct TeeWriter {
    file: File,
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()?;
        self.file.flush()
    }
}

/// Initialize logging. Returns whether `RUST_LOG` controls the level.
fn init_logging(log_file: Option<&Path>) -> Result<bool> {
    let from_env = std::env::var_os("RUST_LOG").is_some();

    let mut builder = env_logger::Builder::new();
    builder
        .filter_level(::log::LevelFilter::Trace)
        .filter_module("hyper", ::log::LevelFilter::Info)
        .filter_module("rustls", ::log::LevelFilter::Info)
        .format_timestamp_secs();
    if from_env {
        builder.parse_default_env();
    }
    if let Some(path) = log_file {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        builder.target(env_logger::Target::Pipe(Box::new(TeeWriter { file })));
    }
    builder.init();
    Ok(from_env)
}

/// Resolve a stop flag that flips on Ctrl-C or SIGTERM.
fn stop_signal() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_signal().await;
        log::info!("Stop requested, finishing the current step...");
        let _ = tx.send(true);
    });
    rx
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::warn!("Cannot listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                log::warn!("Cannot listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

/// Start the metrics endpoint when it is enabled.
fn start_metrics(config: &BotConfig, metrics: &Arc<Metrics>) {
    if !config.monitoring.enable_metrics {
        return;
    }

    #[cfg(feature = "metrics")]
    {
        let metrics = Arc::clone(metrics);
        let port = config.monitoring.metrics_port;
        tokio::spawn(async move {
            if let Err(e) = restaurant_bot::metrics::serve(metrics, port).await {
                log::error!("Metrics server stopped: {}", e);
            }
        });
    }

    #[cfg(not(feature = "metrics"))]
    {
        let _ = metrics;
        log::warn!(
            "Metrics are enabled in the configuration but this build lacks the `metrics` feature"
        );
    }
}

/// Wire up the production poll loop.
async fn build_poll_loop(
    settings: &Settings,
    config: &BotConfig,
    metrics: Arc<Metrics>,
) -> Result<PollLoop<ChicagoDataClient, BlueskyClient, FileCursorStore>> {
    let credentials = settings.credentials()?;
    let client = http::create_async_client(&config.source)?;

    let source = ChicagoDataClient::new(
        client.clone(),
        &config.source,
        settings.chicago_data_token.clone(),
    )?;
    let poster = BlueskyClient::login(
        client,
        &settings.bluesky_service,
        &credentials,
        &config.features.formatting.language,
    )
    .await?;
    let cursor_store = FileCursorStore::new(&settings.timestamp_file);

    Ok(PollLoop::new(
        config,
        source,
        poster,
        cursor_store,
        settings.check_interval,
        metrics,
    ))
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let mut settings = Settings::from_env()?;
    if let Some(path) = cli.config.clone() {
        settings.config_path = path;
    }

    let level_from_env = init_logging(settings.log_file.as_deref())?;
    log::info!("Chicago Restaurant Bot starting...");

    let config = match config::load_all(&settings) {
        Ok(config) => config,
        Err(e) => {
            log::error!("{}", e);
            return Err(e);
        }
    };
    if !level_from_env {
        let level = if cli.verbose {
            ::log::LevelFilter::Debug
        } else {
            report::level_filter(&config.monitoring.log_level)
        };
        ::log::set_max_level(level);
    }
    log::info!("Loaded configuration from {}", settings.config_path.display());

    let result = match cli.command {
        Command::Run => run(&settings, &config).await,
        Command::Once => once(&settings, &config).await,
        Command::Preview { days, limit } => preview(&settings, &config, days, limit).await,
        Command::Validate => validate(&settings, &config).await,
        Command::Info => info(&settings, &config).await,
    };

    if let Err(e) = &result {
        log::error!("{}", e);
    }
    result
}

async fn run(settings: &Settings, config: &BotConfig) -> Result<()> {
    let metrics = Arc::new(Metrics::default());
    start_metrics(config, &metrics);

    let shutdown = stop_signal();
    let mut poll_loop = build_poll_loop(settings, config, metrics)
        .await?
        .with_shutdown(shutdown);
    poll_loop.run().await?;

    log::info!("Done!");
    Ok(())
}

async fn once(settings: &Settings, config: &BotConfig) -> Result<()> {
    let metrics = Arc::new(Metrics::default());
    let shutdown = stop_signal();
    let mut poll_loop = build_poll_loop(settings, config, Arc::clone(&metrics))
        .await?
        .with_shutdown(shutdown);
    let cycle = poll_loop.run_cycle().await?;

    report::summary(
        "Cycle",
        &[
            ("Fetched", cycle.fetched.to_string()),
            ("Duplicates", cycle.duplicates.to_string()),
            ("Filtered out", cycle.filtered_out.to_string()),
            ("Posted", cycle.posted.to_string()),
            ("Failed", cycle.failed.len().to_string()),
            ("Cursor", format_cursor(cycle.cursor_after)),
        ],
    );
    for (key, reason) in &cycle.failed {
        report::sub_item(&format!("{key}: {reason}"));
    }
    if cycle.skipped {
        return Err(AppError::source_unavailable(
            "cycle skipped, see log for details",
        ));
    }
    Ok(())
}

async fn preview(settings: &Settings, config: &BotConfig, days: u32, limit: usize) -> Result<()> {
    let client = http::create_async_client(&config.source)?;
    let source = ChicagoDataClient::new(
        client,
        &config.source,
        settings.chicago_data_token.clone(),
    )?
    .newest_first()
    .with_max_records(limit);

    pipeline::run_preview(config, &source, days, Local::now().naive_local()).await?;
    Ok(())
}

async fn validate(settings: &Settings, config: &BotConfig) -> Result<()> {
    report::header("Validating configuration");

    // Loading already ran `BotConfig::validate`.
    report::status(
        true,
        &format!("Config OK ({})", settings.config_path.display()),
    );
    report::sub_item(&format!("{} hashtag(s)", config.all_hashtags().len()));
    report::sub_item(&format!(
        "{} excluded license type(s), {} ward(s), {} zip code(s)",
        config.filters.excluded_license_types.len(),
        config.filters.included_wards.len(),
        config.filters.included_zip_codes.len()
    ));

    let credentials = settings.credentials();
    report::status(credentials.is_ok(), "Bluesky credentials");
    if let Err(e) = &credentials {
        report::sub_item(&e.to_string());
    }

    let cursor = FileCursorStore::new(&settings.timestamp_file).load().await;
    report::status(cursor.is_ok(), "Cursor file");
    if let Err(e) = &cursor {
        report::sub_item(&e.to_string());
    }

    credentials?;
    cursor?;
    log::info!("All validations passed!");
    Ok(())
}

async fn info(settings: &Settings, config: &BotConfig) -> Result<()> {
    report::header("Chicago Restaurant Bot");
    report::field("Config file", settings.config_path.display());
    report::field("Bluesky service", &settings.bluesky_service);
    report::field(
        "Bluesky handle",
        settings.bluesky_handle.as_deref().unwrap_or("(not set)"),
    );
    report::field(
        "Check interval",
        format!("{} minutes", settings.check_interval.as_secs() / 60),
    );
    report::field(
        "Data portal",
        format!("{}{}", config.source.base_url, config.source.dataset),
    );
    report::field("Hashtags", config.all_hashtags().join(" "));
    report::field(
        "Metrics",
        if config.monitoring.enable_metrics {
            format!("enabled on port {}", config.monitoring.metrics_port)
        } else {
            "disabled".to_string()
        },
    );

    report::separator();
    report::field("Cursor file", settings.timestamp_file.display());
    match FileCursorStore::new(&settings.timestamp_file).load().await? {
        Some(cursor) => report::field("Last checked", format_cursor(cursor)),
        None => report::sub_item("No cursor stored yet; the first cycle starts one interval back."),
    }
    Ok(())
}
