//! Resilient page retrieval.
//!
//! The target site answers automated clients with challenge pages and rate
//! limits, so every fetch goes through [`ResilientFetcher`]: blocking statuses
//! and transport failures are retried with exponential backoff and a fresh
//! client identity, any other 4xx fails fast.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use tracing::{debug, warn};

use crate::config::{
    BACKOFF_JITTER_SECS, BLOCKING_STATUSES, IDENTITY_POOL, MAX_FETCH_ATTEMPTS, MAX_REDIRECTS,
    POLITENESS_JITTER_SECS,
};
use crate::error::{FetchError, Result};

const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8";

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// Client signature presented to the site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_agent: String,
    pub accept_language: String,
}

impl Identity {
    pub fn default_pool() -> Vec<Identity> {
        IDENTITY_POOL
            .iter()
            .map(|(ua, lang)| Identity {
                user_agent: ua.to_string(),
                accept_language: lang.to_string(),
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    /// Final URL after redirects.
    pub url: String,
    pub body: String,
}

#[derive(Debug, Clone)]
pub enum TransportFailure {
    /// Redirect limit exceeded.
    TooManyRedirects(String),
    Other(String),
}

/// Anything able to GET a URL and hand back status + body.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(
        &self,
        url: &str,
        identity: &Identity,
    ) -> std::result::Result<RawResponse, TransportFailure>;
}

pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .gzip(true)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(
        &self,
        url: &str,
        identity: &Identity,
    ) -> std::result::Result<RawResponse, TransportFailure> {
        let resp = self
            .client
            .get(url)
            .header(USER_AGENT, &identity.user_agent)
            .header(ACCEPT_LANGUAGE, &identity.accept_language)
            .header(ACCEPT, ACCEPT_HTML)
            .send()
            .await
            .map_err(|e| {
                if e.is_redirect() {
                    TransportFailure::TooManyRedirects(e.to_string())
                } else {
                    TransportFailure::Other(e.to_string())
                }
            })?;

        let status = resp.status().as_u16();
        let final_url = resp.url().to_string();
        let body = resp
            .text()
            .await
            .map_err(|e| TransportFailure::Other(e.to_string()))?;

        Ok(RawResponse { status, url: final_url, body })
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// Suspension point for backoff and politeness waits.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Backoff before retrying after the (0-based) `attempt` failed: `2^attempt + jitter` seconds.
pub fn backoff_delay(attempt: u32, jitter_secs: f64) -> Duration {
    let base = 2u64.pow(attempt.min(MAX_FETCH_ATTEMPTS)) as f64;
    Duration::from_secs_f64(base + jitter_secs.max(0.0))
}

/// Linear backoff used by the per-match outer retry: `delay * attempt` (1-based).
pub fn linear_backoff(delay: Duration, attempt: u32) -> Duration {
    delay.saturating_mul(attempt)
}

fn sample_jitter(rng: &Mutex<StdRng>, (lo, hi): (f64, f64)) -> f64 {
    match rng.lock() {
        Ok(mut rng) => rng.gen_range(lo..hi),
        Err(_) => lo,
    }
}

/// Fixed delay plus a little jitter, applied before every sequential fetch.
#[derive(Clone)]
pub struct Politeness {
    delay: Duration,
    sleeper: Arc<dyn Sleeper>,
    rng: Arc<Mutex<StdRng>>,
}

impl Politeness {
    pub fn new(delay: Duration, sleeper: Arc<dyn Sleeper>) -> Self {
        Self {
            delay,
            sleeper,
            rng: Arc::new(Mutex::new(StdRng::from_entropy())),
        }
    }

    pub fn sleeper(&self) -> &Arc<dyn Sleeper> {
        &self.sleeper
    }

    pub async fn pause(&self) {
        let jitter = sample_jitter(&self.rng, POLITENESS_JITTER_SECS);
        let wait = self.delay + Duration::from_secs_f64(jitter);
        self.sleeper.sleep(wait).await;
    }
}

// ---------------------------------------------------------------------------
// Fetch contract
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Page {
    pub url: String,
    pub body: String,
}

/// `fetch(url) -> page | FetchError`.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch(&self, url: &str) -> std::result::Result<Page, FetchError>;
}

pub struct ResilientFetcher {
    transport: Arc<dyn Transport>,
    identities: Vec<Identity>,
    max_attempts: u32,
    sleeper: Arc<dyn Sleeper>,
    rng: Mutex<StdRng>,
}

impl ResilientFetcher {
    pub fn new(transport: Arc<dyn Transport>, sleeper: Arc<dyn Sleeper>, max_attempts: u32) -> Self {
        Self {
            transport,
            identities: Identity::default_pool(),
            max_attempts: max_attempts.clamp(1, MAX_FETCH_ATTEMPTS),
            sleeper,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic jitter and identity choice.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    /// Picks an identity, avoiding the previous one when the pool allows.
    fn choose_identity(&self, previous: Option<usize>) -> usize {
        let len = self.identities.len();
        if len <= 1 {
            return 0;
        }
        let idx = match self.rng.lock() {
            Ok(mut rng) => rng.gen_range(0..len),
            Err(_) => 0,
        };
        match previous {
            Some(prev) if prev == idx => (idx + 1) % len,
            _ => idx,
        }
    }
}

#[async_trait]
impl PageSource for ResilientFetcher {
    async fn fetch(&self, url: &str) -> std::result::Result<Page, FetchError> {
        let mut last: Option<FetchError> = None;
        let mut previous_identity = None;

        for attempt in 0..self.max_attempts {
            let idx = self.choose_identity(previous_identity);
            previous_identity = Some(idx);
            let identity = &self.identities[idx];

            debug!(url, attempt, "[FETCH] GET");
            let failure = match self.transport.get(url, identity).await {
                Ok(resp) if BLOCKING_STATUSES.contains(&resp.status) => {
                    warn!(url, attempt, status = resp.status, "[FETCH] blocked");
                    FetchError::Blocked { status: resp.status }
                }
                Ok(resp) if (400..500).contains(&resp.status) => {
                    return Err(FetchError::ClientError {
                        status: resp.status,
                        url: url.to_string(),
                    });
                }
                Ok(resp) if resp.status >= 500 => {
                    warn!(url, attempt, status = resp.status, "[FETCH] server error");
                    FetchError::Transport(format!("server error {}", resp.status))
                }
                Ok(resp) => {
                    return Ok(Page { url: resp.url, body: resp.body });
                }
                Err(TransportFailure::TooManyRedirects(msg)) => {
                    debug!(url, "[FETCH] redirect loop: {msg}");
                    return Err(FetchError::NotFound { url: url.to_string() });
                }
                Err(TransportFailure::Other(msg)) => {
                    warn!(url, attempt, "[FETCH] transport failure: {msg}");
                    FetchError::Transport(msg)
                }
            };
            last = Some(failure);

            if attempt + 1 < self.max_attempts {
                let jitter = sample_jitter(&self.rng, BACKOFF_JITTER_SECS);
                let wait = backoff_delay(attempt, jitter);
                debug!(url, attempt, wait_secs = wait.as_secs_f64(), "[FETCH] backing off");
                self.sleeper.sleep(wait).await;
            }
        }

        Err(FetchError::Exhausted {
            url: url.to_string(),
            attempts: self.max_attempts,
            last: Box::new(last.unwrap_or(FetchError::Transport("no attempt made".to_string()))),
        })
    }
}
