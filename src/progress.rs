//! Durable checkpoint for historical backfills.
//!
//! One record per date scope. A worker resumes from the stored record when the
//! scope matches and the previous run never completed; otherwise it starts
//! fresh. Writes happen at batch boundaries and on completion only.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::walker::DateRange;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapeProgress {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub current_offset: u32,
    pub total_matches_found: usize,
    pub total_matches_scraped: usize,
    pub failed_matches: Vec<String>,
    pub last_match_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub last_updated: Option<DateTime<Utc>>,
    pub completed: bool,
}

impl ScrapeProgress {
    pub fn fresh(scope: DateRange, now: DateTime<Utc>) -> Self {
        Self {
            start_date: scope.start,
            end_date: scope.end,
            current_offset: 0,
            total_matches_found: 0,
            total_matches_scraped: 0,
            failed_matches: Vec::new(),
            last_match_id: None,
            started_at: Some(now),
            last_updated: None,
            completed: false,
        }
    }

    pub fn scope(&self) -> DateRange {
        DateRange::new(self.start_date, self.end_date)
    }
}

#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Checkpoint stored for `scope`, if any.
    async fn load(&self, scope: &DateRange) -> Result<Option<ScrapeProgress>>;
    async fn save(&self, progress: &ScrapeProgress) -> Result<()>;
}

/// One JSON file per scope under `dir`.
pub struct JsonFileProgressStore {
    dir: PathBuf,
}

impl JsonFileProgressStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, scope: &DateRange) -> PathBuf {
        let bound = |d: Option<NaiveDate>| {
            d.map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| "any".to_string())
        };
        self.dir
            .join(format!("scrape_progress_{}_{}.json", bound(scope.start), bound(scope.end)))
    }
}

#[async_trait]
impl ProgressStore for JsonFileProgressStore {
    async fn load(&self, scope: &DateRange) -> Result<Option<ScrapeProgress>> {
        let path = self.path_for(scope);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_str(&raw) {
            Ok(progress) => Ok(Some(progress)),
            Err(e) => {
                warn!(path = %path.display(), "[PROGRESS] unreadable checkpoint ignored: {e}");
                Ok(None)
            }
        }
    }

    async fn save(&self, progress: &ScrapeProgress) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(&progress.scope());
        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(progress)?;
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!(path = %path.display(), "[PROGRESS] checkpoint written");
        Ok(())
    }
}

/// In-flight checkpoint owned by one historical worker.
pub struct ProgressTracker {
    store: Arc<dyn ProgressStore>,
    progress: ScrapeProgress,
    resumed: bool,
}

impl ProgressTracker {
    pub async fn open(store: Arc<dyn ProgressStore>, scope: DateRange) -> Result<Self> {
        let (progress, resumed) = match store.load(&scope).await? {
            Some(existing) if existing.scope() == scope && !existing.completed => {
                info!(
                    offset = existing.current_offset,
                    scraped = existing.total_matches_scraped,
                    "[PROGRESS] resuming checkpoint"
                );
                (existing, true)
            }
            _ => {
                info!(start = ?scope.start, end = ?scope.end, "[PROGRESS] starting fresh checkpoint");
                (ScrapeProgress::fresh(scope, Utc::now()), false)
            }
        };
        Ok(Self { store, progress, resumed })
    }

    pub fn resumed(&self) -> bool {
        self.resumed
    }

    pub fn progress(&self) -> &ScrapeProgress {
        &self.progress
    }

    pub fn set_total_found(&mut self, total: usize) {
        self.progress.total_matches_found = total;
    }

    pub fn record_success(&mut self, match_id: &str) {
        self.progress.total_matches_scraped += 1;
        self.progress.last_match_id = Some(match_id.to_string());
    }

    pub fn record_failure(&mut self, match_id: &str) {
        self.progress.failed_matches.push(match_id.to_string());
    }

    pub async fn checkpoint(&mut self) -> Result<()> {
        self.progress.last_updated = Some(Utc::now());
        self.store.save(&self.progress).await
    }

    pub async fn complete(&mut self) -> Result<()> {
        self.progress.completed = true;
        self.checkpoint().await
    }
}
