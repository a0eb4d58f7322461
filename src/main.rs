use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use hltv_ingest::api::health::HealthState;
use hltv_ingest::api::{router, ApiState, JobDefaults};
use hltv_ingest::config::{Config, StorageKind};
use hltv_ingest::db::{self, SqliteSink};
use hltv_ingest::error::{AppError, Result};
use hltv_ingest::extract::SelectorCatalog;
use hltv_ingest::fetcher::{ReqwestTransport, ResilientFetcher, TokioSleeper};
use hltv_ingest::jobs::{Ingestor, JobRegistry};
use hltv_ingest::parsers::SiteClient;
use hltv_ingest::progress::JsonFileProgressStore;
use hltv_ingest::sink::{CsvSink, Sink};
use hltv_ingest::walker::DateRange;
use hltv_ingest::workers::{HistoricalConfig, IncrementalConfig, RetryPolicy};

#[derive(Parser)]
#[command(name = "ingest", about = "Match-results ingestion service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API (default).
    Serve,
    /// Backfill a date range, resuming from the last checkpoint for that range.
    Historical {
        /// YYYY-MM-DD
        #[arg(long)]
        start_date: Option<String>,
        /// YYYY-MM-DD
        #[arg(long)]
        end_date: Option<String>,
        /// Seconds between requests
        #[arg(long)]
        delay: Option<f64>,
        #[arg(long)]
        batch_size: Option<usize>,
        /// Overrides STORAGE
        #[arg(long, value_enum)]
        storage: Option<StorageKind>,
    },
    /// Fetch matches from the last few days that are not stored yet.
    Incremental {
        #[arg(long)]
        delay: Option<f64>,
        #[arg(long)]
        lookback_days: Option<u32>,
        /// Overrides STORAGE
        #[arg(long, value_enum)]
        storage: Option<StorageKind>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cli.command.unwrap_or(Command::Serve), cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(command: Command, cfg: Config) -> Result<()> {
    let retry = |delay| RetryPolicy { max_retries: cfg.max_retries, delay };

    match command {
        Command::Serve => {
            let ingestor = build_ingestor(&cfg, cfg.storage).await?;
            serve(cfg.clone(), ingestor).await
        }
        Command::Historical { start_date, end_date, delay, batch_size, storage } => {
            let ingestor = build_ingestor(&cfg, storage.unwrap_or(cfg.storage)).await?;
            let range = DateRange::parse(start_date.as_deref(), end_date.as_deref())?;
            let delay = delay_or(delay, cfg.delay)?;
            let config = HistoricalConfig {
                range,
                batch_size: batch_size.unwrap_or(cfg.batch_size).max(1),
                retry: retry(delay),
            };
            let summary = ingestor.historical(config, delay).run().await?;
            print_json(&summary)
        }
        Command::Incremental { delay, lookback_days, storage } => {
            let ingestor = build_ingestor(&cfg, storage.unwrap_or(cfg.storage)).await?;
            let delay = delay_or(delay, cfg.delay)?;
            let config = IncrementalConfig {
                lookback_days: lookback_days.unwrap_or(cfg.lookback_days),
                retry: retry(delay),
            };
            let summary = ingestor.incremental(config, delay).run().await?;
            print_json(&summary)
        }
    }
}

async fn build_ingestor(cfg: &Config, storage: StorageKind) -> Result<Ingestor> {
    let catalog = SelectorCatalog::load(cfg.selector_catalog.as_deref())?;
    let sleeper = Arc::new(TokioSleeper);
    let transport = ReqwestTransport::new(cfg.fetch_timeout)?;
    let fetcher = ResilientFetcher::new(Arc::new(transport), sleeper.clone(), cfg.fetch_max_attempts);
    let client = SiteClient::new(Arc::new(fetcher), Arc::new(catalog), &cfg.base_url);

    let sink: Arc<dyn Sink> = match storage {
        StorageKind::Sqlite => Arc::new(SqliteSink::new(db::connect(&cfg.db_path).await?)),
        StorageKind::Csv => {
            let sink = CsvSink::open(&cfg.csv_output_dir)?;
            for (table, path) in sink.table_paths() {
                info!("CSV table {table}: {}", path.display());
            }
            Arc::new(sink)
        }
    };

    Ok(Ingestor {
        client: Arc::new(client),
        sink,
        progress_store: Arc::new(JsonFileProgressStore::new(&cfg.progress_dir)),
        sleeper,
    })
}

async fn serve(cfg: Config, ingestor: Ingestor) -> Result<()> {
    let state = ApiState {
        registry: JobRegistry::new(Arc::new(HealthState::new())),
        ingestor,
        defaults: JobDefaults {
            delay: cfg.delay,
            batch_size: cfg.batch_size,
            max_retries: cfg.max_retries,
            lookback_days: cfg.lookback_days,
        },
    };
    let app = router(state);
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr} (target {})", cfg.base_url);

    axum::serve(listener, app).await?;
    Ok(())
}

fn delay_or(delay: Option<f64>, default: Duration) -> Result<Duration> {
    match delay {
        None => Ok(default),
        Some(d) if d.is_finite() && d >= 0.0 => Ok(Duration::from_secs_f64(d)),
        Some(d) => Err(AppError::InvalidInput(format!("delay must be non-negative, got {d}"))),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
