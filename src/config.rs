use std::path::PathBuf;
use std::time::Duration;

use crate::error::{AppError, Result};

pub const BASE_URL: &str = "https://www.hltv.org";

/// Results listing advances by this many entries per page.
pub const RESULTS_PAGE_SIZE: u32 = 100;

/// Statuses the site answers with when it rate-limits or challenges a client.
pub const BLOCKING_STATUSES: &[u16] = &[403, 429, 503];

/// Random jitter (seconds) added on top of the exponential fetch backoff.
pub const BACKOFF_JITTER_SECS: (f64, f64) = (2.0, 5.0);

/// Random jitter (seconds) added on top of the fixed politeness delay.
pub const POLITENESS_JITTER_SECS: (f64, f64) = (0.5, 1.5);

/// Upper bound on fetch attempts per URL; also caps the backoff exponent.
pub const MAX_FETCH_ATTEMPTS: u32 = 10;

/// Redirect hops allowed before a request is treated as not found.
pub const MAX_REDIRECTS: usize = 10;

/// Client signatures rotated between attempts.
pub const IDENTITY_POOL: &[(&str, &str)] = &[
    (
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        "en-US,en;q=0.9",
    ),
    (
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
        "en-US,en;q=0.8",
    ),
    (
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/110.0.0.0 Safari/537.36",
        "en-GB,en;q=0.9",
    ),
    (
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Safari/605.1.15",
        "en-US,en;q=0.9",
    ),
];

/// Where ingested matches are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum StorageKind {
    Sqlite,
    Csv,
}

impl std::str::FromStr for StorageKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(StorageKind::Sqlite),
            "csv" => Ok(StorageKind::Csv),
            other => Err(AppError::Config(format!("STORAGE must be sqlite or csv, got {other}"))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub base_url: String,
    pub log_level: String,
    /// Sink backend (STORAGE)
    pub storage: StorageKind,
    pub db_path: String,
    /// Directory of the CSV tables when `storage` is csv (CSV_OUTPUT_DIR)
    pub csv_output_dir: PathBuf,
    pub api_port: u16,
    /// Directory holding historical checkpoints (PROGRESS_DIR)
    pub progress_dir: PathBuf,
    /// Optional replacement for the embedded selector catalog (SELECTOR_CATALOG)
    pub selector_catalog: Option<PathBuf>,
    /// Attempts per page before giving up (FETCH_MAX_ATTEMPTS)
    pub fetch_max_attempts: u32,
    pub fetch_timeout: Duration,
    /// Politeness delay between sequential fetches (SCRAPER_DELAY_SECONDS)
    pub delay: Duration,
    /// Matches per checkpoint (SCRAPER_BATCH_SIZE)
    pub batch_size: usize,
    /// Outer per-match attempts (SCRAPER_MAX_RETRIES)
    pub max_retries: u32,
    pub lookback_days: u32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let delay_secs = std::env::var("SCRAPER_DELAY_SECONDS")
            .unwrap_or_else(|_| "2.0".to_string())
            .parse::<f64>()
            .map_err(|_| AppError::Config("SCRAPER_DELAY_SECONDS must be a number".to_string()))?;
        if !delay_secs.is_finite() || delay_secs < 0.0 {
            return Err(AppError::Config(
                "SCRAPER_DELAY_SECONDS must be non-negative".to_string(),
            ));
        }

        Ok(Self {
            base_url: std::env::var("BASE_URL")
                .unwrap_or_else(|_| BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            storage: std::env::var("STORAGE")
                .unwrap_or_else(|_| "sqlite".to_string())
                .parse()?,
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "ingest.db".to_string()),
            csv_output_dir: std::env::var("CSV_OUTPUT_DIR")
                .unwrap_or_else(|_| "./data/csv".to_string())
                .into(),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            progress_dir: std::env::var("PROGRESS_DIR")
                .unwrap_or_else(|_| "./data".to_string())
                .into(),
            selector_catalog: std::env::var("SELECTOR_CATALOG")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
            fetch_max_attempts: std::env::var("FETCH_MAX_ATTEMPTS")
                .unwrap_or_else(|_| "3".to_string())
                .parse::<u32>()
                .unwrap_or(3)
                .clamp(1, MAX_FETCH_ATTEMPTS),
            fetch_timeout: Duration::from_secs(
                std::env::var("FETCH_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse::<u64>()
                    .unwrap_or(30),
            ),
            delay: Duration::from_secs_f64(delay_secs),
            batch_size: std::env::var("SCRAPER_BATCH_SIZE")
                .unwrap_or_else(|_| "100".to_string())
                .parse::<usize>()
                .unwrap_or(100)
                .max(1),
            max_retries: std::env::var("SCRAPER_MAX_RETRIES")
                .unwrap_or_else(|_| "3".to_string())
                .parse::<u32>()
                .unwrap_or(3)
                .max(1),
            lookback_days: std::env::var("LOOKBACK_DAYS")
                .unwrap_or_else(|_| "7".to_string())
                .parse::<u32>()
                .unwrap_or(7),
        })
    }
}

pub fn join_url(base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_url_handles_relative_and_absolute_paths() {
        assert_eq!(join_url("https://x.org", "/matches/1/_"), "https://x.org/matches/1/_");
        assert_eq!(join_url("https://x.org", "results"), "https://x.org/results");
        assert_eq!(join_url("https://x.org", "https://y.org/a"), "https://y.org/a");
    }

    #[test]
    fn storage_kind_parses_case_insensitively() {
        assert_eq!("CSV".parse::<StorageKind>().unwrap(), StorageKind::Csv);
        assert_eq!(" sqlite ".parse::<StorageKind>().unwrap(), StorageKind::Sqlite);
        assert!(matches!("postgres".parse::<StorageKind>(), Err(AppError::Config(_))));
    }
}
