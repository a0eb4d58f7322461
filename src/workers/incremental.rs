//! Catch-up over a short lookback window. The sink's known-id set is the only state.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::error::Result;
use crate::fetcher::Politeness;
use crate::parsers::SiteClient;
use crate::sink::Sink;
use crate::walker::{DateRange, ResultsWalker};
use crate::workers::{
    fetch_details_with_retry, JobPhase, NoopObserver, ProgressObserver, RetryPolicy, WorkerProgress,
};

#[derive(Debug, Clone, Serialize)]
pub struct IncrementalConfig {
    pub lookback_days: u32,
    pub retry: RetryPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IncrementalSummary {
    NoUpdates {
        new_matches: usize,
        /// Set when the listing itself could not be read.
        error: Option<String>,
    },
    Completed {
        new_matches: usize,
        failed_matches: usize,
        failed_ids: Vec<String>,
        total_in_storage: i64,
    },
}

pub struct IncrementalWorker {
    client: Arc<SiteClient>,
    politeness: Politeness,
    sink: Arc<dyn Sink>,
    observer: Arc<dyn ProgressObserver>,
    config: IncrementalConfig,
}

impl IncrementalWorker {
    pub fn new(
        client: Arc<SiteClient>,
        politeness: Politeness,
        sink: Arc<dyn Sink>,
        config: IncrementalConfig,
    ) -> Self {
        Self {
            client,
            politeness,
            sink,
            observer: Arc::new(NoopObserver),
            config,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub async fn run(&self) -> Result<IncrementalSummary> {
        self.run_at(Utc::now().date_naive()).await
    }

    /// Same as [`run`](Self::run) with an explicit "today".
    pub async fn run_at(&self, today: NaiveDate) -> Result<IncrementalSummary> {
        let range = DateRange::lookback(today, self.config.lookback_days);
        let mut report = WorkerProgress::new(JobPhase::CollectingIds);
        self.observer.update(&report);

        info!(start = ?range.start, end = ?range.end, "[INCREMENTAL] collecting recent match ids");
        let walk = ResultsWalker::new(&self.client, &self.politeness)
            .walk(0, &range)
            .await;

        // Snapshot taken once; matches stored concurrently by someone else are
        // still fetched and then rejected by the sink as duplicates.
        let known: HashSet<String> = self.sink.known_ids().await?;
        let candidates: Vec<String> = walk
            .match_ids()
            .into_iter()
            .filter(|id| !known.contains(id))
            .collect();

        if candidates.is_empty() {
            info!(listed = walk.total_count, "[INCREMENTAL] no new matches");
            report.phase = JobPhase::Completed;
            self.observer.update(&report);
            return Ok(IncrementalSummary::NoUpdates { new_matches: 0, error: walk.error });
        }

        info!(candidates = candidates.len(), "[INCREMENTAL] fetching new matches");
        report.phase = JobPhase::Scraping;
        report.total_found = candidates.len();
        self.observer.update(&report);

        let mut new_matches = 0;
        let mut failed_ids = Vec::new();

        for match_id in &candidates {
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
                Ok(record) => match self.sink.save(&record).await {
                    Ok(true) => {
                        info!(match_id = %match_id, "[INCREMENTAL] saved");
                        new_matches += 1;
                        report.succeeded += 1;
                    }
                    Ok(false) => {
                        info!(match_id = %match_id, "[INCREMENTAL] already stored, skipped");
                    }
                    Err(e) => {
                        error!(match_id = %match_id, "[INCREMENTAL] save failed: {e}");
                        failed_ids.push(match_id.clone());
                        report.failed += 1;
                    }
                },
                Err(e) => {
                    warn!(match_id = %match_id, "[INCREMENTAL] match failed after retries: {e}");
                    failed_ids.push(match_id.clone());
                    report.failed += 1;
                }
            }
            report.processed += 1;
            self.observer.update(&report);
        }

        let total_in_storage = self.sink.count().await?;
        report.phase = JobPhase::Completed;
        report.current_match_id = None;
        self.observer.update(&report);

        info!(new_matches, failed = failed_ids.len(), total_in_storage, "[INCREMENTAL] completed");
        Ok(IncrementalSummary::Completed {
            new_matches,
            failed_matches: failed_ids.len(),
            failed_ids,
            total_in_storage,
        })
    }
}
