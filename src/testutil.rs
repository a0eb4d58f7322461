//! Shared fakes for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{FetchError, Result};
use crate::fetcher::{Page, PageSource, Sleeper};
use crate::progress::{ProgressStore, ScrapeProgress};
use crate::walker::DateRange;

/// Canned pages keyed by URL. Unknown URLs fail with `NotFound`.
#[derive(Default)]
pub struct FakeSource {
    pages: Mutex<HashMap<String, std::result::Result<String, FetchError>>>,
    transient: Mutex<HashMap<String, usize>>,
    requests: Mutex<Vec<String>>,
}

impl FakeSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn page(&self, url: &str, body: &str) {
        self.pages.lock().unwrap().insert(url.to_string(), Ok(body.to_string()));
    }

    pub fn fail(&self, url: &str, err: FetchError) {
        self.pages.lock().unwrap().insert(url.to_string(), Err(err));
    }

    /// The next `times` fetches of `url` fail with a transport error.
    pub fn flaky(&self, url: &str, times: usize) {
        self.transient.lock().unwrap().insert(url.to_string(), times);
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self, url: &str) -> usize {
        self.requests.lock().unwrap().iter().filter(|u| *u == url).count()
    }
}

#[async_trait]
impl PageSource for FakeSource {
    async fn fetch(&self, url: &str) -> std::result::Result<Page, FetchError> {
        self.requests.lock().unwrap().push(url.to_string());

        if let Some(left) = self.transient.lock().unwrap().get_mut(url) {
            if *left > 0 {
                *left -= 1;
                return Err(FetchError::Transport("connection reset".to_string()));
            }
        }

        match self.pages.lock().unwrap().get(url) {
            Some(Ok(body)) => Ok(Page { url: url.to_string(), body: body.clone() }),
            Some(Err(e)) => Err(e.clone()),
            None => Err(FetchError::NotFound { url: url.to_string() }),
        }
    }
}

/// Records requested sleeps without waiting.
#[derive(Default)]
pub struct RecordingSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn recorded(&self) -> Vec<Duration> {
        self.slept.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.slept.lock().unwrap().push(duration);
    }
}

/// Single-slot checkpoint store that counts writes.
#[derive(Default)]
pub struct MemoryProgressStore {
    slot: Mutex<Option<ScrapeProgress>>,
    writes: AtomicUsize,
}

impl MemoryProgressStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with(progress: ScrapeProgress) -> Arc<Self> {
        let store = Self::default();
        *store.slot.lock().unwrap() = Some(progress);
        Arc::new(store)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn current(&self) -> Option<ScrapeProgress> {
        self.slot.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProgressStore for MemoryProgressStore {
    async fn load(&self, scope: &DateRange) -> Result<Option<ScrapeProgress>> {
        let slot = self.slot.lock().unwrap();
        Ok(slot.clone().filter(|p| p.scope() == *scope))
    }

    async fn save(&self, progress: &ScrapeProgress) -> Result<()> {
        *self.slot.lock().unwrap() = Some(progress.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Results listing with one `results-sublist` per `(headline, ids)` pair.
pub fn listing_html(sections: &[(&str, &[&str])], has_next: bool) -> String {
    let mut out = String::from("<html><body><div class=\"results-all\">");
    for (headline, ids) in sections {
        out.push_str("<div class=\"results-sublist\">");
        out.push_str(&format!("<span class=\"standard-headline\">{headline}</span>"));
        for id in *ids {
            out.push_str(&format!(
                "<div class=\"result-con\"><a class=\"a-reset\" href=\"/matches/{id}/a-vs-b\">\
                 <table><tr><td><div class=\"team\">Team A</div></td>\
                 <td class=\"result-score\"><span>2</span> - <span>0</span></td>\
                 <td><div class=\"team\">Team B</div></td><td><span class=\"event-name\">Cup</span></td>\
                 <td><div class=\"map-text\">bo3</div></td></tr></table></a></div>"
            ));
        }
        out.push_str("</div>");
    }
    out.push_str("</div>");
    if has_next {
        out.push_str("<a class=\"pagination-next\" href=\"/results?offset=next\">Next</a>");
    }
    out.push_str("</body></html>");
    out
}

/// Minimal match page with two team headers and a final score.
pub fn match_html(team1: (&str, &str, u32), team2: (&str, &str, u32)) -> String {
    let header = |side: u8, (id, name, score): (&str, &str, u32), won: bool| {
        format!(
            "<div class=\"team{side}-gradient\"><a href=\"/team/{id}/{slug}\"><div class=\"teamName\">{name}</div></a>\
             <div class=\"{class}\">{score}</div></div>",
            slug = name.to_lowercase(),
            class = if won { "won" } else { "lost" },
        )
    };
    format!(
        "<html><body>{}{}<div class=\"mapholder\"><div class=\"mapname\">Ancient</div></div></body></html>",
        header(1, team1, team1.2 > team2.2),
        header(2, team2, team2.2 > team1.2),
    )
}
