//! Background job registry. Triggers return a job id immediately; status is
//! read back as a snapshot of the job's watch channel.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::api::health::HealthState;
use crate::fetcher::{Politeness, Sleeper};
use crate::parsers::SiteClient;
use crate::progress::{ProgressStore, ScrapeProgress};
use crate::sink::Sink;
use crate::workers::{
    HistoricalConfig, HistoricalWorker, IncrementalConfig, IncrementalWorker, ProgressObserver,
    SinkHooks, WorkerProgress,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Historical,
    Incremental,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub job_id: Uuid,
    pub kind: JobKind,
    pub state: JobState,
    pub config: Value,
    pub progress: Option<WorkerProgress>,
    /// Latest historical checkpoint, including failed ids and last match id.
    pub checkpoint: Option<ScrapeProgress>,
    pub summary: Option<Value>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Everything a worker needs, shared by all jobs.
#[derive(Clone)]
pub struct Ingestor {
    pub client: Arc<SiteClient>,
    pub sink: Arc<dyn Sink>,
    pub progress_store: Arc<dyn ProgressStore>,
    pub sleeper: Arc<dyn Sleeper>,
}

impl Ingestor {
    pub fn historical(&self, config: HistoricalConfig, delay: Duration) -> HistoricalWorker {
        HistoricalWorker::new(
            self.client.clone(),
            Politeness::new(delay, self.sleeper.clone()),
            self.progress_store.clone(),
            Arc::new(SinkHooks::new(self.sink.clone())),
            config,
        )
    }

    pub fn incremental(&self, config: IncrementalConfig, delay: Duration) -> IncrementalWorker {
        IncrementalWorker::new(
            self.client.clone(),
            Politeness::new(delay, self.sleeper.clone()),
            self.sink.clone(),
            config,
        )
    }
}

/// Publishes worker progress into the job's status channel.
pub struct JobReporter {
    tx: watch::Sender<JobStatus>,
}

impl JobReporter {
    fn finish(&self, outcome: std::result::Result<Value, String>) {
        self.tx.send_modify(|status| {
            status.finished_at = Some(Utc::now());
            match outcome {
                Ok(summary) => {
                    status.state = JobState::Completed;
                    status.summary = Some(summary);
                }
                Err(e) => {
                    status.state = JobState::Failed;
                    status.error = Some(e);
                }
            }
        });
    }
}

impl ProgressObserver for JobReporter {
    fn update(&self, progress: &WorkerProgress) {
        self.tx.send_modify(|status| status.progress = Some(progress.clone()));
    }

    fn checkpoint(&self, progress: &ScrapeProgress) {
        self.tx.send_modify(|status| status.checkpoint = Some(progress.clone()));
    }
}

/// Finished jobs kept for status queries; older ones are dropped.
pub const FINISHED_JOBS_RETAINED: usize = 100;

pub struct JobRegistry {
    jobs: DashMap<Uuid, watch::Receiver<JobStatus>>,
    /// Job ids in start order.
    order: Mutex<VecDeque<Uuid>>,
    health: Arc<HealthState>,
}

impl JobRegistry {
    pub fn new(health: Arc<HealthState>) -> Arc<Self> {
        Arc::new(Self {
            jobs: DashMap::new(),
            order: Mutex::new(VecDeque::new()),
            health,
        })
    }

    fn register(&self, kind: JobKind, config: Value) -> (Uuid, Arc<JobReporter>) {
        let job_id = Uuid::new_v4();
        let (tx, rx) = watch::channel(JobStatus {
            job_id,
            kind,
            state: JobState::Running,
            config,
            progress: None,
            checkpoint: None,
            summary: None,
            error: None,
            started_at: Utc::now(),
            finished_at: None,
        });
        self.jobs.insert(job_id, rx);
        if let Ok(mut order) = self.order.lock() {
            order.push_back(job_id);
        }
        self.health.job_started();
        info!(%job_id, ?kind, "[JOBS] started");
        (job_id, Arc::new(JobReporter { tx }))
    }

    fn complete(&self, job_id: Uuid, reporter: &JobReporter, outcome: std::result::Result<Value, String>) {
        match &outcome {
            Ok(_) => info!(%job_id, "[JOBS] finished"),
            Err(e) => {
                error!(%job_id, "[JOBS] failed: {e}");
                self.health.job_failed();
            }
        }
        self.health.job_finished();
        reporter.finish(outcome);
        self.prune_finished();
    }

    /// Drops the oldest finished jobs beyond `FINISHED_JOBS_RETAINED`.
    fn prune_finished(&self) {
        let Ok(mut order) = self.order.lock() else {
            return;
        };
        let is_finished = |id: &Uuid| {
            self.jobs
                .get(id)
                .map(|rx| rx.borrow().state != JobState::Running)
                .unwrap_or(true)
        };
        let mut excess = order
            .iter()
            .filter(|id| is_finished(id))
            .count()
            .saturating_sub(FINISHED_JOBS_RETAINED);
        if excess == 0 {
            return;
        }
        order.retain(|id| {
            if excess > 0 && is_finished(id) {
                self.jobs.remove(id);
                excess -= 1;
                false
            } else {
                true
            }
        });
        debug!(retained = order.len(), "[JOBS] pruned finished jobs");
    }

    pub fn spawn_historical(self: &Arc<Self>, ingestor: &Ingestor, config: HistoricalConfig, delay: Duration) -> Uuid {
        let job_config = serde_json::json!({
            "start_date": config.range.start,
            "end_date": config.range.end,
            "delay": delay.as_secs_f64(),
            "batch_size": config.batch_size,
            "max_retries": config.retry.max_retries,
        });
        let (job_id, reporter) = self.register(JobKind::Historical, job_config);
        let worker = ingestor.historical(config, delay).with_observer(reporter.clone());
        let registry = Arc::clone(self);

        tokio::spawn(async move {
            let outcome = match worker.run().await {
                Ok(summary) => serde_json::to_value(summary).map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };
            registry.complete(job_id, &reporter, outcome);
        });
        job_id
    }

    pub fn spawn_incremental(self: &Arc<Self>, ingestor: &Ingestor, config: IncrementalConfig, delay: Duration) -> Uuid {
        let job_config = serde_json::json!({
            "delay": delay.as_secs_f64(),
            "lookback_days": config.lookback_days,
            "max_retries": config.retry.max_retries,
        });
        let (job_id, reporter) = self.register(JobKind::Incremental, job_config);
        let worker = ingestor.incremental(config, delay).with_observer(reporter.clone());
        let registry = Arc::clone(self);

        tokio::spawn(async move {
            let outcome = match worker.run().await {
                Ok(summary) => serde_json::to_value(summary).map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };
            registry.complete(job_id, &reporter, outcome);
        });
        job_id
    }

    pub fn get(&self, job_id: &Uuid) -> Option<JobStatus> {
        self.jobs.get(job_id).map(|rx| rx.borrow().clone())
    }

    /// Most recently started job.
    pub fn latest(&self) -> Option<JobStatus> {
        let id = self.order.lock().ok().and_then(|order| order.back().copied())?;
        self.get(&id)
    }

    /// All jobs, oldest first.
    pub fn list(&self) -> Vec<JobStatus> {
        let ids: Vec<Uuid> = match self.order.lock() {
            Ok(order) => order.iter().copied().collect(),
            Err(_) => return Vec::new(),
        };
        ids.iter().filter_map(|id| self.get(id)).collect()
    }

    pub fn health(&self) -> &Arc<HealthState> {
        &self.health
    }
}
