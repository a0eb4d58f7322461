use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::AppError;
use crate::jobs::{Ingestor, JobRegistry, JobStatus};
use crate::parsers::upcoming::{DEFAULT_UPCOMING_LIMIT, MAX_UPCOMING_LIMIT};
use crate::sink::StorageStats;
use crate::types::{MapResult, MatchLineup, MatchRecord, ResultsPage, TeamMatchStats, UpcomingMatches};
use crate::walker::DateRange;
use crate::workers::{HistoricalConfig, IncrementalConfig, RetryPolicy};

const MIN_DELAY_SECS: f64 = 0.5;
const MIN_BATCH_SIZE: usize = 10;
const MIN_LOOKBACK_DAYS: u32 = 1;

/// Values used when a trigger omits a parameter.
#[derive(Debug, Clone)]
pub struct JobDefaults {
    pub delay: Duration,
    pub batch_size: usize,
    pub max_retries: u32,
    pub lookback_days: u32,
}

#[derive(Clone)]
pub struct ApiState {
    pub registry: Arc<JobRegistry>,
    pub ingestor: Ingestor,
    pub defaults: JobDefaults,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/scrape/historical", post(start_historical))
        .route("/scrape/incremental", post(start_incremental))
        .route("/scrape/status", get(get_scrape_status))
        .route("/scrape/jobs", get(get_jobs))
        .route("/scrape/jobs/:id", get(get_job))
        .route("/storage/stats", get(get_storage_stats))
        .route("/matches/results", get(get_results))
        .route("/matches/upcoming", get(get_upcoming))
        .route("/matches/:id/details", get(get_match_details))
        .route("/matches/:id/maps", get(get_match_maps))
        .route("/matches/:id/stats", get(get_match_stats))
        .route("/matches/:id/lineup", get(get_match_lineup))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Query param structs
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct HistoricalQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub delay: Option<f64>,
    pub batch_size: Option<usize>,
}

#[derive(Deserialize)]
pub struct IncrementalQuery {
    pub delay: Option<f64>,
    pub lookback_days: Option<u32>,
}

#[derive(Deserialize)]
pub struct ResultsQuery {
    pub offset: Option<u32>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Deserialize)]
pub struct UpcomingQuery {
    pub limit: Option<usize>,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct JobAccepted {
    pub status: &'static str,
    pub job_id: Uuid,
    pub config: Value,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub active_jobs: u64,
    pub jobs_started: u64,
    pub jobs_failed: u64,
    pub total_matches: i64,
    pub last_ingested_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Serialize)]
pub struct MapsResponse {
    pub match_id: String,
    pub maps: Vec<MapResult>,
}

#[derive(Serialize)]
pub struct StatsResponse {
    pub match_id: String,
    pub team1_stats: Option<TeamMatchStats>,
    pub team2_stats: Option<TeamMatchStats>,
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate_delay(delay: Option<f64>, default: Duration) -> Result<Duration, AppError> {
    match delay {
        None => Ok(default),
        Some(d) if d.is_finite() && d >= MIN_DELAY_SECS => Ok(Duration::from_secs_f64(d)),
        Some(d) => Err(AppError::InvalidInput(format!(
            "delay must be at least {MIN_DELAY_SECS} seconds, got {d}"
        ))),
    }
}

fn validate_match_id(id: &str) -> Result<(), AppError> {
    if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AppError::InvalidInput(format!("match id must be numeric, got {id:?}")));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_health(State(state): State<ApiState>) -> Result<Json<HealthResponse>, AppError> {
    let health = state.registry.health();
    Ok(Json(HealthResponse {
        status: "ok",
        active_jobs: health.active_jobs(),
        jobs_started: health.jobs_started(),
        jobs_failed: health.jobs_failed(),
        total_matches: state.ingestor.sink.count().await?,
        last_ingested_at: state.ingestor.sink.last_ingested_at().await?,
    }))
}

async fn start_historical(
    State(state): State<ApiState>,
    Query(params): Query<HistoricalQuery>,
) -> Result<(StatusCode, Json<JobAccepted>), AppError> {
    let range = DateRange::parse(params.start_date.as_deref(), params.end_date.as_deref())?;
    let delay = validate_delay(params.delay, state.defaults.delay)?;
    let batch_size = params.batch_size.unwrap_or(state.defaults.batch_size);
    if batch_size < MIN_BATCH_SIZE {
        return Err(AppError::InvalidInput(format!(
            "batch_size must be at least {MIN_BATCH_SIZE}, got {batch_size}"
        )));
    }

    let config = HistoricalConfig {
        range,
        batch_size,
        retry: RetryPolicy { max_retries: state.defaults.max_retries, delay },
    };
    let job_id = state.registry.spawn_historical(&state.ingestor, config, delay);
    let config = state.registry.get(&job_id).map(|s| s.config).unwrap_or(Value::Null);

    Ok((
        StatusCode::ACCEPTED,
        Json(JobAccepted { status: "started", job_id, config }),
    ))
}

async fn start_incremental(
    State(state): State<ApiState>,
    Query(params): Query<IncrementalQuery>,
) -> Result<(StatusCode, Json<JobAccepted>), AppError> {
    let delay = validate_delay(params.delay, state.defaults.delay)?;
    let lookback_days = params.lookback_days.unwrap_or(state.defaults.lookback_days);
    if lookback_days < MIN_LOOKBACK_DAYS {
        return Err(AppError::InvalidInput(format!(
            "lookback_days must be at least {MIN_LOOKBACK_DAYS}"
        )));
    }

    let config = IncrementalConfig {
        lookback_days,
        retry: RetryPolicy { max_retries: state.defaults.max_retries, delay },
    };
    let job_id = state.registry.spawn_incremental(&state.ingestor, config, delay);
    let config = state.registry.get(&job_id).map(|s| s.config).unwrap_or(Value::Null);

    Ok((
        StatusCode::ACCEPTED,
        Json(JobAccepted { status: "started", job_id, config }),
    ))
}

async fn get_scrape_status(State(state): State<ApiState>) -> Json<Value> {
    match state.registry.latest() {
        Some(status) => Json(serde_json::to_value(status).unwrap_or(Value::Null)),
        None => Json(json!({ "status": "idle" })),
    }
}

async fn get_jobs(State(state): State<ApiState>) -> Json<Vec<JobStatus>> {
    Json(state.registry.list())
}

async fn get_job(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<JobStatus>, AppError> {
    let job_id = Uuid::parse_str(&id)
        .map_err(|_| AppError::InvalidInput(format!("not a job id: {id}")))?;
    state
        .registry
        .get(&job_id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("job {job_id}")))
}

async fn get_storage_stats(State(state): State<ApiState>) -> Result<Json<StorageStats>, AppError> {
    Ok(Json(state.ingestor.sink.statistics().await?))
}

async fn get_results(
    State(state): State<ApiState>,
    Query(params): Query<ResultsQuery>,
) -> Result<Json<ResultsPage>, AppError> {
    let range = DateRange::parse(params.start_date.as_deref(), params.end_date.as_deref())?;
    let page = state
        .ingestor
        .client
        .results_page(params.offset.unwrap_or(0), &range)
        .await?;
    Ok(Json(page))
}

async fn get_upcoming(
    State(state): State<ApiState>,
    Query(params): Query<UpcomingQuery>,
) -> Result<Json<UpcomingMatches>, AppError> {
    let limit = params.limit.unwrap_or(DEFAULT_UPCOMING_LIMIT);
    if !(1..=MAX_UPCOMING_LIMIT).contains(&limit) {
        return Err(AppError::InvalidInput(format!(
            "limit must be between 1 and {MAX_UPCOMING_LIMIT}"
        )));
    }
    Ok(Json(state.ingestor.client.upcoming(limit).await?))
}

async fn fetch_match(state: &ApiState, id: &str) -> Result<MatchRecord, AppError> {
    validate_match_id(id)?;
    state.ingestor.client.match_details(id).await
}

async fn get_match_details(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<MatchRecord>, AppError> {
    Ok(Json(fetch_match(&state, &id).await?))
}

async fn get_match_maps(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<MapsResponse>, AppError> {
    let record = fetch_match(&state, &id).await?;
    Ok(Json(MapsResponse { match_id: record.match_id, maps: record.maps }))
}

async fn get_match_stats(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<StatsResponse>, AppError> {
    let record = fetch_match(&state, &id).await?;
    Ok(Json(StatsResponse {
        match_id: record.match_id,
        team1_stats: record.team1_stats,
        team2_stats: record.team2_stats,
    }))
}

async fn get_match_lineup(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<MatchLineup>, AppError> {
    validate_match_id(&id)?;
    Ok(Json(state.ingestor.client.lineup(&id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::health::HealthState;
    use crate::extract::SelectorCatalog;
    use crate::parsers::SiteClient;
    use crate::sink::MemorySink;
    use crate::testutil::{listing_html, match_html, FakeSource, MemoryProgressStore, RecordingSleeper};
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    const BASE: &str = "https://site.test";

    fn app(source: Arc<FakeSource>) -> Router {
        let ingestor = Ingestor {
            client: Arc::new(SiteClient::new(source, Arc::new(SelectorCatalog::embedded().unwrap()), BASE)),
            sink: MemorySink::new(),
            progress_store: MemoryProgressStore::new(),
            sleeper: RecordingSleeper::new(),
        };
        router(ApiState {
            registry: JobRegistry::new(Arc::new(HealthState::new())),
            ingestor,
            defaults: JobDefaults {
                delay: Duration::from_secs(2),
                batch_size: 100,
                max_retries: 3,
                lookback_days: 7,
            },
        })
    }

    async fn call(app: Router, method: &str, uri: &str) -> (StatusCode, Value) {
        let resp = app
            .oneshot(Request::builder().method(method).uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    #[tokio::test]
    async fn status_is_idle_before_any_job() {
        let (status, body) = call(app(FakeSource::new()), "GET", "/scrape/status").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "idle");
    }

    #[tokio::test]
    async fn trigger_parameters_are_validated() {
        for uri in [
            "/scrape/historical?delay=0.1",
            "/scrape/historical?batch_size=5",
            "/scrape/historical?start_date=2025/01/01",
            "/scrape/incremental?lookback_days=0",
        ] {
            let (status, body) = call(app(FakeSource::new()), "POST", uri).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert!(body["detail"].is_string());
        }
    }

    #[tokio::test]
    async fn historical_trigger_returns_job_id_immediately() {
        let (status, body) = call(
            app(FakeSource::new()),
            "POST",
            "/scrape/historical?start_date=2025-01-01&end_date=2025-01-31&batch_size=50",
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["status"], "started");
        assert!(Uuid::parse_str(body["job_id"].as_str().unwrap()).is_ok());
        assert_eq!(body["config"]["start_date"], "2025-01-01");
        assert_eq!(body["config"]["batch_size"], 50);
        assert_eq!(body["config"]["delay"], 2.0);
    }

    #[tokio::test]
    async fn status_reports_latest_checkpoint() {
        let source = FakeSource::new();
        source.page(
            &format!("{BASE}/results"),
            &listing_html(&[("Results for January 9th 2025", &["11", "12"])], false),
        );
        source.page(&format!("{BASE}/matches/11/_"), &match_html(("1", "Alpha", 2), ("2", "Beta", 1)));
        let app = app(source);

        let (status, _) = call(
            app.clone(),
            "POST",
            "/scrape/historical?start_date=2025-01-01&end_date=2025-01-31",
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);

        let mut body = Value::Null;
        for _ in 0..200 {
            let (_, latest) = call(app.clone(), "GET", "/scrape/status").await;
            body = latest;
            if body["state"] != "running" {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(body["state"], "completed");
        assert_eq!(body["checkpoint"]["start_date"], "2025-01-01");
        assert_eq!(body["checkpoint"]["total_matches_scraped"], 1);
        assert_eq!(body["checkpoint"]["failed_matches"][0], "12");
        assert_eq!(body["checkpoint"]["last_match_id"], "11");
        assert_eq!(body["checkpoint"]["completed"], true);
    }

    #[tokio::test]
    async fn unknown_job_is_404() {
        let uri = format!("/scrape/jobs/{}", Uuid::new_v4());
        let (status, _) = call(app(FakeSource::new()), "GET", &uri).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn match_endpoints_fetch_live_pages() {
        let source = FakeSource::new();
        source.page(&format!("{BASE}/matches/42/_"), &match_html(("1", "Alpha", 2), ("2", "Beta", 1)));

        let (status, body) = call(app(source.clone()), "GET", "/matches/42/details").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["match_id"], "42");
        assert_eq!(body["winner"], "team1");
        assert_eq!(body["final_score"], "2-1");

        let (status, body) = call(app(source.clone()), "GET", "/matches/42/maps").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["maps"][0]["map_name"], "Ancient");

        let (status, _) = call(app(source.clone()), "GET", "/matches/43/details").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(app(source), "GET", "/matches/abc/stats").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn results_and_storage_endpoints() {
        let source = FakeSource::new();
        source.page(
            &format!("{BASE}/results"),
            &listing_html(&[("Results for May 3rd 2025", &["501", "502"])], true),
        );
        let (status, body) = call(app(source), "GET", "/matches/results?start_date=2025-05-01").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total_count"], 2);
        assert_eq!(body["next_offset"], 100);

        let (status, body) = call(app(FakeSource::new()), "GET", "/storage/stats").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total_matches"], 0);

        let (status, _) = call(app(FakeSource::new()), "GET", "/matches/upcoming?limit=500").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
