//! Pagination over the results listing with date-bounded early termination.

use std::collections::HashSet;

use chrono::{Duration as ChronoDuration, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::config::RESULTS_PAGE_SIZE;
use crate::error::{AppError, Result};
use crate::fetcher::Politeness;
use crate::parsers::results::DateSection;
use crate::parsers::SiteClient;
use crate::types::ResultsListingEntry;

/// Inclusive date scope. Either bound may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self { start, end }
    }

    /// Parses optional `YYYY-MM-DD` bounds.
    pub fn parse(start: Option<&str>, end: Option<&str>) -> Result<Self> {
        Ok(Self {
            start: start.map(parse_iso_date).transpose()?,
            end: end.map(parse_iso_date).transpose()?,
        })
    }

    /// `[today - days, today]`.
    pub fn lookback(today: NaiveDate, days: u32) -> Self {
        Self {
            start: Some(today - ChronoDuration::days(i64::from(days))),
            end: Some(today),
        }
    }
}

pub fn parse_iso_date(raw: &str) -> Result<NaiveDate> {
    let valid_shape = raw.len() == 10
        && raw.char_indices().all(|(i, c)| if i == 4 || i == 7 { c == '-' } else { c.is_ascii_digit() });
    if !valid_shape {
        return Err(AppError::InvalidInput(format!("date must be YYYY-MM-DD, got {raw:?}")));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| AppError::InvalidInput(format!("not a calendar date: {raw}")))
}

#[derive(Debug, Clone, PartialEq)]
pub struct SectionScan {
    pub entries: Vec<ResultsListingEntry>,
    pub reached_before_start: bool,
}

/// Takes sections in page order and stops at the first one dated strictly
/// before `range.start`. Undated sections and sections past `range.end` are kept.
pub fn scan_sections(sections: Vec<DateSection>, range: &DateRange) -> SectionScan {
    let mut entries = Vec::new();
    let mut reached_before_start = false;

    for section in sections {
        if let (Some(date), Some(start)) = (section.date, range.start) {
            if date < start {
                reached_before_start = true;
                break;
            }
        }
        entries.extend(section.entries);
    }

    SectionScan { entries, reached_before_start }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WalkOutcome {
    pub entries: Vec<ResultsListingEntry>,
    pub total_count: usize,
    /// A next page was advertised but not followed.
    pub has_more: bool,
    pub reached_before_start: bool,
    pub next_offset: Option<u32>,
    pub pages_fetched: u32,
    /// Set when not even the first page could be fetched.
    pub error: Option<String>,
}

impl WalkOutcome {
    /// Match ids in listing order, first occurrence only.
    pub fn match_ids(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.entries
            .iter()
            .filter(|e| seen.insert(e.match_id.as_str()))
            .map(|e| e.match_id.clone())
            .collect()
    }
}

pub struct ResultsWalker<'a> {
    client: &'a SiteClient,
    politeness: &'a Politeness,
}

impl<'a> ResultsWalker<'a> {
    pub fn new(client: &'a SiteClient, politeness: &'a Politeness) -> Self {
        Self { client, politeness }
    }

    /// Follows "next page" from `start_offset` until the listing ends, a section
    /// predates `range.start`, or a page fails to load.
    pub async fn walk(&self, start_offset: u32, range: &DateRange) -> WalkOutcome {
        let mut out = WalkOutcome::default();
        let mut offset = start_offset;

        loop {
            self.politeness.pause().await;

            let doc = match self.client.listing(offset).await {
                Ok(doc) => doc,
                Err(e) if out.pages_fetched == 0 => {
                    error!(offset, "[WALK] first listing page failed: {e}");
                    out.error = Some(e.to_string());
                    break;
                }
                Err(e) => {
                    warn!(offset, "[WALK] listing page failed, stopping pagination: {e}");
                    out.has_more = true;
                    out.next_offset = Some(offset);
                    break;
                }
            };
            out.pages_fetched += 1;

            let scan = scan_sections(doc.sections, range);
            out.entries.extend(scan.entries);
            info!(
                offset,
                collected = out.entries.len(),
                "[WALK] page {} processed",
                out.pages_fetched
            );

            if scan.reached_before_start {
                info!(offset, "[WALK] reached results before start date, stopping");
                out.reached_before_start = true;
                break;
            }
            if !doc.has_next {
                break;
            }
            offset += RESULTS_PAGE_SIZE;
        }

        out.total_count = out.entries.len();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::extract::SelectorCatalog;
    use crate::testutil::{listing_html, FakeSource, RecordingSleeper};
    use std::sync::Arc;
    use std::time::Duration;

    const BASE: &str = "https://site.test";

    fn setup() -> (Arc<FakeSource>, SiteClient, Politeness) {
        let source = FakeSource::new();
        let catalog = Arc::new(SelectorCatalog::embedded().unwrap());
        let client = SiteClient::new(source.clone(), catalog, BASE);
        let politeness = Politeness::new(Duration::from_secs(2), RecordingSleeper::new());
        (source, client, politeness)
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn iso_dates_are_validated() {
        assert_eq!(parse_iso_date("2025-01-31").unwrap(), date(2025, 1, 31));
        assert!(parse_iso_date("2025-1-31").is_err());
        assert!(parse_iso_date("2025-02-30").is_err());
        assert!(DateRange::parse(Some("31/01/2025"), None).is_err());

        let range = DateRange::lookback(date(2025, 12, 12), 7);
        assert_eq!(range.start, Some(date(2025, 12, 5)));
        assert_eq!(range.end, Some(date(2025, 12, 12)));
    }

    #[tokio::test]
    async fn stops_at_first_section_before_start() {
        let (source, client, politeness) = setup();
        source.page(
            &format!("{BASE}/results"),
            &listing_html(
                &[
                    ("Results for December 12th 2025", &["1"]),
                    ("Results for December 10th 2025", &["2"]),
                    ("Results for December 1st 2025", &["3"]),
                ],
                true,
            ),
        );

        let range = DateRange::new(Some(date(2025, 12, 11)), None);
        let out = ResultsWalker::new(&client, &politeness).walk(0, &range).await;

        assert_eq!(out.match_ids(), vec!["1"]);
        assert!(out.reached_before_start);
        assert!(!out.has_more);
        assert_eq!(out.pages_fetched, 1);
        // the advertised next page is never requested
        assert_eq!(source.requests(), vec![format!("{BASE}/results")]);
    }

    #[tokio::test]
    async fn follows_next_links_and_includes_undated_and_future_sections() {
        let (source, client, politeness) = setup();
        source.page(
            &format!("{BASE}/results?offset=100"),
            &listing_html(
                &[("Featured results", &["10"]), ("Results for June 9th 2025", &["11", "10"])],
                true,
            ),
        );
        source.page(
            &format!("{BASE}/results?offset=200"),
            &listing_html(&[("Results for June 2nd 2025", &["12"])], false),
        );

        let range = DateRange::new(Some(date(2025, 6, 1)), Some(date(2025, 6, 5)));
        let out = ResultsWalker::new(&client, &politeness).walk(100, &range).await;

        assert_eq!(out.pages_fetched, 2);
        assert_eq!(out.total_count, 4);
        assert_eq!(out.match_ids(), vec!["10", "11", "12"]);
        assert!(!out.reached_before_start);
    }

    #[tokio::test]
    async fn first_page_failure_is_reported_later_failures_truncate() {
        let (source, client, politeness) = setup();
        source.fail(&format!("{BASE}/results"), FetchError::Blocked { status: 403 });
        let out = ResultsWalker::new(&client, &politeness).walk(0, &DateRange::default()).await;
        assert!(out.error.is_some());
        assert!(out.entries.is_empty());

        let (source, client, politeness) = setup();
        source.page(
            &format!("{BASE}/results"),
            &listing_html(&[("Results for June 9th 2025", &["11"])], true),
        );
        source.fail(&format!("{BASE}/results?offset=100"), FetchError::Transport("reset".into()));
        let out = ResultsWalker::new(&client, &politeness).walk(0, &DateRange::default()).await;
        assert_eq!(out.error, None);
        assert_eq!(out.match_ids(), vec!["11"]);
        assert!(out.has_more);
        assert_eq!(out.next_offset, Some(100));
    }
}
