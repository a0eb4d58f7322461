//! Ingestion orchestrators and the pieces they share.

pub mod historical;
pub mod incremental;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{AppError, Result};
use crate::fetcher::{linear_backoff, Sleeper};
use crate::parsers::SiteClient;
use crate::progress::ScrapeProgress;
use crate::sink::Sink;
use crate::types::MatchRecord;

pub use self::historical::{HistoricalConfig, HistoricalSummary, HistoricalWorker};
pub use self::incremental::{IncrementalConfig, IncrementalSummary, IncrementalWorker};

/// Per-match retry on top of the fetcher's own attempts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RetryPolicy {
    pub max_retries: u32,
    #[serde(serialize_with = "as_secs")]
    pub delay: Duration,
}

fn as_secs<S: serde::Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

/// Fetches match details up to `max_retries` times, sleeping `delay * attempt`
/// between attempts. Missing matches are not retried.
pub async fn fetch_details_with_retry(
    client: &SiteClient,
    sleeper: &dyn Sleeper,
    policy: RetryPolicy,
    match_id: &str,
) -> Result<MatchRecord> {
    let attempts = policy.max_retries.max(1);
    let mut attempt = 1;
    loop {
        match client.match_details(match_id).await {
            Ok(record) => return Ok(record),
            Err(AppError::Fetch(e)) if !e.is_retryable() => {
                warn!(match_id, "[MATCH] not available: {e}");
                return Err(AppError::Fetch(e));
            }
            Err(e) if attempt >= attempts => {
                warn!(match_id, attempt, "[MATCH] giving up: {e}");
                return Err(e);
            }
            Err(e) => {
                let wait = linear_backoff(policy.delay, attempt);
                warn!(match_id, attempt, wait_secs = wait.as_secs_f64(), "[MATCH] fetch failed, retrying: {e}");
                sleeper.sleep(wait).await;
                attempt += 1;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Side effects
// ---------------------------------------------------------------------------

/// Per-match and per-batch side effects of a historical run.
#[async_trait]
pub trait MatchHooks: Send + Sync {
    async fn on_match(&self, record: &MatchRecord) -> Result<()>;
    async fn on_batch(&self, batch: &[MatchRecord]) -> Result<()>;
}

/// Saves each match unless the sink already has it.
pub struct SinkHooks {
    sink: Arc<dyn Sink>,
}

impl SinkHooks {
    pub fn new(sink: Arc<dyn Sink>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl MatchHooks for SinkHooks {
    async fn on_match(&self, record: &MatchRecord) -> Result<()> {
        if self.sink.exists(&record.match_id).await? {
            info!(match_id = %record.match_id, "[SINK] already stored, skipping");
            return Ok(());
        }
        if self.sink.save(record).await? {
            info!(match_id = %record.match_id, "[SINK] saved");
        } else {
            info!(match_id = %record.match_id, "[SINK] duplicate reported by sink");
        }
        Ok(())
    }

    async fn on_batch(&self, batch: &[MatchRecord]) -> Result<()> {
        let total = self.sink.count().await?;
        info!(batch = batch.len(), total_in_storage = total, "[SINK] batch complete");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Progress reporting
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    CollectingIds,
    Scraping,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkerProgress {
    pub phase: JobPhase,
    pub total_found: usize,
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub current_match_id: Option<String>,
}

impl WorkerProgress {
    pub fn new(phase: JobPhase) -> Self {
        Self {
            phase,
            total_found: 0,
            processed: 0,
            succeeded: 0,
            failed: 0,
            current_match_id: None,
        }
    }
}

pub trait ProgressObserver: Send + Sync {
    fn update(&self, progress: &WorkerProgress);

    /// Called whenever the historical checkpoint changes in memory.
    fn checkpoint(&self, _progress: &ScrapeProgress) {}
}

pub struct NoopObserver;

impl ProgressObserver for NoopObserver {
    fn update(&self, _progress: &WorkerProgress) {}
}
