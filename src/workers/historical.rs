//! Resumable bulk backfill over a date range.

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::error::Result;
use crate::fetcher::Politeness;
use crate::parsers::SiteClient;
use crate::progress::{ProgressStore, ProgressTracker};
use crate::types::MatchRecord;
use crate::walker::{DateRange, ResultsWalker};
use crate::workers::{
    fetch_details_with_retry, JobPhase, MatchHooks, NoopObserver, ProgressObserver, RetryPolicy,
    WorkerProgress,
};

#[derive(Debug, Clone, Serialize)]
pub struct HistoricalConfig {
    pub range: DateRange,
    pub batch_size: usize,
    pub retry: RetryPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum HistoricalSummary {
    Completed {
        total_found: usize,
        total_scraped: usize,
        failed: usize,
        failed_ids: Vec<String>,
    },
    NoMatches {
        total: usize,
        error: Option<String>,
    },
}

pub struct HistoricalWorker {
    client: Arc<SiteClient>,
    politeness: Politeness,
    store: Arc<dyn ProgressStore>,
    hooks: Arc<dyn MatchHooks>,
    observer: Arc<dyn ProgressObserver>,
    config: HistoricalConfig,
}

impl HistoricalWorker {
    pub fn new(
        client: Arc<SiteClient>,
        politeness: Politeness,
        store: Arc<dyn ProgressStore>,
        hooks: Arc<dyn MatchHooks>,
        config: HistoricalConfig,
    ) -> Self {
        Self {
            client,
            politeness,
            store,
            hooks,
            observer: Arc::new(NoopObserver),
            config,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// collecting ids -> scraping -> completed.
    ///
    /// Only a checkpoint store that cannot be read fails the run; everything
    /// below one match id is logged and counted.
    pub async fn run(&self) -> Result<HistoricalSummary> {
        let range = self.config.range;
        let batch_size = self.config.batch_size.max(1);
        let mut tracker = ProgressTracker::open(self.store.clone(), range).await?;
        self.observer.checkpoint(tracker.progress());

        let mut report = WorkerProgress::new(JobPhase::CollectingIds);
        self.observer.update(&report);

        let offset = tracker.progress().current_offset;
        info!(offset, start = ?range.start, end = ?range.end, "[HISTORICAL] collecting match ids");
        let walk = ResultsWalker::new(&self.client, &self.politeness)
            .walk(offset, &range)
            .await;
        let ids = walk.match_ids();

        if ids.is_empty() {
            warn!(error = ?walk.error, "[HISTORICAL] no matches found");
            return Ok(HistoricalSummary::NoMatches { total: 0, error: walk.error });
        }

        tracker.set_total_found(ids.len());
        self.observer.checkpoint(tracker.progress());
        let skip = tracker.progress().total_matches_scraped;
        info!(found = ids.len(), skip, "[HISTORICAL] scraping matches");

        report.phase = JobPhase::Scraping;
        report.total_found = ids.len();
        report.processed = skip.min(ids.len());
        report.succeeded = skip;
        self.observer.update(&report);

        let mut batch: Vec<MatchRecord> = Vec::with_capacity(batch_size);

        for match_id in ids.iter().skip(skip) {
            report.current_match_id = Some(match_id.clone());
            self.politeness.pause().await;

            let fetched = fetch_details_with_retry(
                &self.client,
                self.politeness.sleeper().as_ref(),
                self.config.retry,
                match_id,
            )
            .await;

            match fetched {
                Ok(record) => {
                    if let Err(e) = self.hooks.on_match(&record).await {
                        error!(match_id = %match_id, "[HISTORICAL] match hook failed: {e}");
                    }
                    tracker.record_success(match_id);
                    report.succeeded += 1;
                    batch.push(record);
                }
                Err(e) => {
                    warn!(match_id = %match_id, "[HISTORICAL] match failed after retries: {e}");
                    tracker.record_failure(match_id);
                    report.failed += 1;
                }
            }
            report.processed += 1;

            if batch.len() >= batch_size {
                if let Err(e) = tracker.checkpoint().await {
                    error!("[HISTORICAL] checkpoint write failed: {e}");
                }
                self.flush(&batch).await;
                batch.clear();
            }
            self.observer.checkpoint(tracker.progress());
            self.observer.update(&report);
        }

        if !batch.is_empty() {
            self.flush(&batch).await;
        }
        if let Err(e) = tracker.complete().await {
            error!("[HISTORICAL] final checkpoint write failed: {e}");
        }
        self.observer.checkpoint(tracker.progress());

        report.phase = JobPhase::Completed;
        report.current_match_id = None;
        self.observer.update(&report);

        let progress = tracker.progress();
        info!(
            found = progress.total_matches_found,
            scraped = progress.total_matches_scraped,
            failed = progress.failed_matches.len(),
            "[HISTORICAL] completed"
        );
        Ok(HistoricalSummary::Completed {
            total_found: progress.total_matches_found,
            total_scraped: progress.total_matches_scraped,
            failed: progress.failed_matches.len(),
            failed_ids: progress.failed_matches.clone(),
        })
    }

    async fn flush(&self, batch: &[MatchRecord]) {
        if let Err(e) = self.hooks.on_batch(batch).await {
            error!(batch = batch.len(), "[HISTORICAL] batch hook failed: {e}");
        }
    }
}
