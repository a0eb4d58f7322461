pub mod details;
pub mod normalize;
pub mod results;
pub mod upcoming;

use std::sync::Arc;

use tracing::debug;

use crate::error::Result;
use crate::extract::SelectorCatalog;
use crate::fetcher::PageSource;
use crate::types::{MatchLineup, MatchRecord, ResultsPage, UpcomingMatches};
use crate::walker::{scan_sections, DateRange};

use self::results::ListingDocument;

/// Fetch + parse entry points for each page kind.
///
/// Every method fetches first and then parses synchronously, so no parsed
/// document is held across an await point.
pub struct SiteClient {
    source: Arc<dyn PageSource>,
    catalog: Arc<SelectorCatalog>,
    base_url: String,
}

impl SiteClient {
    pub fn new(source: Arc<dyn PageSource>, catalog: Arc<SelectorCatalog>, base_url: &str) -> Self {
        Self {
            source,
            catalog,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn match_details(&self, match_id: &str) -> Result<MatchRecord> {
        let url = details::match_url(&self.base_url, match_id);
        let page = self.source.fetch(&url).await?;
        let record =
            details::parse_match_details(&page.body, match_id, &url, &self.catalog, &self.base_url);
        debug!(match_id, maps = record.maps.len(), "parsed match details");
        Ok(record)
    }

    /// Raw listing page at `offset`, all date sections included.
    pub async fn listing(&self, offset: u32) -> Result<ListingDocument> {
        let url = results::results_url(&self.base_url, offset);
        let page = self.source.fetch(&url).await?;
        Ok(results::parse_listing(&page.body, &self.catalog.results, &self.base_url))
    }

    /// One listing page filtered to `range`.
    pub async fn results_page(&self, offset: u32, range: &DateRange) -> Result<ResultsPage> {
        let doc = self.listing(offset).await?;
        let scan = scan_sections(doc.sections, range);
        let has_more = doc.has_next && !scan.reached_before_start;
        Ok(ResultsPage {
            total_count: scan.entries.len(),
            matches: scan.entries,
            offset,
            has_more,
            next_offset: has_more.then(|| offset + crate::config::RESULTS_PAGE_SIZE),
            reached_before_start: scan.reached_before_start,
        })
    }

    pub async fn upcoming(&self, limit: usize) -> Result<UpcomingMatches> {
        let url = upcoming::upcoming_url(&self.base_url);
        let page = self.source.fetch(&url).await?;
        Ok(upcoming::parse_upcoming(&page.body, &self.catalog, &self.base_url, limit))
    }

    pub async fn lineup(&self, match_id: &str) -> Result<MatchLineup> {
        let url = details::match_url(&self.base_url, match_id);
        let page = self.source.fetch(&url).await?;
        Ok(upcoming::parse_lineup(&page.body, match_id, &url, &self.catalog, &self.base_url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AppError, FetchError};
    use crate::testutil::{listing_html, FakeSource};
    use chrono::NaiveDate;

    const BASE: &str = "https://site.test";

    fn client(source: Arc<FakeSource>) -> SiteClient {
        SiteClient::new(source, Arc::new(SelectorCatalog::embedded().unwrap()), BASE)
    }

    #[tokio::test]
    async fn results_page_reports_pagination() {
        let source = FakeSource::new();
        source.page(
            &format!("{BASE}/results?offset=100"),
            &listing_html(&[("Results for May 3rd 2025", &["501", "502"])], true),
        );

        let page = client(source.clone()).results_page(100, &DateRange::default()).await.unwrap();
        assert_eq!(page.total_count, 2);
        assert_eq!(page.offset, 100);
        assert!(page.has_more);
        assert_eq!(page.next_offset, Some(200));
        assert!(!page.reached_before_start);
    }

    #[tokio::test]
    async fn results_page_stops_before_start() {
        let source = FakeSource::new();
        source.page(
            &format!("{BASE}/results"),
            &listing_html(
                &[("Results for May 3rd 2025", &["501"]), ("Results for April 1st 2025", &["400"])],
                true,
            ),
        );

        let range = DateRange::new(NaiveDate::from_ymd_opt(2025, 5, 1), None);
        let page = client(source).results_page(0, &range).await.unwrap();
        assert_eq!(page.matches.len(), 1);
        assert!(page.reached_before_start);
        assert!(!page.has_more);
        assert_eq!(page.next_offset, None);
    }

    #[tokio::test]
    async fn missing_match_surfaces_fetch_error() {
        let source = FakeSource::new();
        source.fail(
            &format!("{BASE}/matches/9/_"),
            FetchError::NotFound { url: "x".into() },
        );
        let err = client(source).match_details("9").await.unwrap_err();
        assert!(matches!(err, AppError::Fetch(FetchError::NotFound { .. })));
    }
}
