//! Results listing page: date sections of completed matches.

use chrono::NaiveDate;
use scraper::{ElementRef, Html};

use crate::config::join_url;
use crate::extract::catalog::ResultsSelectors;
use crate::parsers::normalize::{extract_id, parse_headline_date, parse_score, IdKind};
use crate::types::ResultsListingEntry;

const UNKNOWN_TEAM: &str = "Unknown";

/// Entries listed under one date headline.
#[derive(Debug, Clone, PartialEq)]
pub struct DateSection {
    pub headline: Option<String>,
    pub date: Option<NaiveDate>,
    pub entries: Vec<ResultsListingEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListingDocument {
    pub sections: Vec<DateSection>,
    /// Page offers a "next page" link.
    pub has_next: bool,
}

/// Only `offset` goes on the wire; date filtering happens client side.
pub fn results_url(base_url: &str, offset: u32) -> String {
    if offset > 0 {
        format!("{base_url}/results?offset={offset}")
    } else {
        format!("{base_url}/results")
    }
}

pub fn parse_listing(body: &str, sel: &ResultsSelectors, base_url: &str) -> ListingDocument {
    let html = Html::parse_document(body);
    let root = html.root_element();

    // A section without its own headline stays under the previous date.
    let mut current_headline: Option<String> = None;
    let mut sections = Vec::new();

    for section in sel.sections.select(root) {
        if let Some(headline) = sel.headline.get(section) {
            current_headline = Some(headline);
        }
        let date = current_headline.as_deref().and_then(parse_headline_date);

        let entries = sel
            .containers
            .select(section)
            .into_iter()
            .filter_map(|c| parse_entry(c, sel, base_url, current_headline.as_deref(), date))
            .collect();

        sections.push(DateSection {
            headline: current_headline.clone(),
            date,
            entries,
        });
    }

    ListingDocument {
        sections,
        has_next: sel.next_page.get(root).is_some(),
    }
}

fn parse_entry(
    container: ElementRef<'_>,
    sel: &ResultsSelectors,
    base_url: &str,
    headline: Option<&str>,
    date: Option<NaiveDate>,
) -> Option<ResultsListingEntry> {
    let href = sel.match_link.get(container)?;
    let match_id = extract_id(IdKind::Match, Some(&href))?;

    Some(ResultsListingEntry {
        match_id,
        match_url: join_url(base_url, &href),
        team1_name: sel.team1_name.get(container).unwrap_or_else(|| UNKNOWN_TEAM.to_string()),
        team2_name: sel.team2_name.get(container).unwrap_or_else(|| UNKNOWN_TEAM.to_string()),
        team1_score: parse_score(sel.team1_score.get(container).as_deref()),
        team2_score: parse_score(sel.team2_score.get(container).as_deref()),
        event_name: sel.event_name.get(container),
        raw_format: sel.format.get(container).map(|f| f.to_lowercase()),
        date: headline.map(str::to_string),
        date_parsed: date.map(|d| d.format("%Y-%m-%d").to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::SelectorCatalog;

    const PAGE: &str = include_str!("../../tests/fixtures/results_page.html");

    #[test]
    fn url_carries_offset_only_when_paging() {
        assert_eq!(results_url("https://x.org", 0), "https://x.org/results");
        assert_eq!(results_url("https://x.org", 200), "https://x.org/results?offset=200");
    }

    #[test]
    fn sections_group_entries_under_headlines() {
        let catalog = SelectorCatalog::embedded().unwrap();
        let doc = parse_listing(PAGE, &catalog.results, "https://www.hltv.org");

        assert!(doc.has_next);
        assert_eq!(doc.sections.len(), 3);

        let first = &doc.sections[0];
        assert_eq!(first.headline.as_deref(), Some("Results for December 12th 2025"));
        assert_eq!(first.date, NaiveDate::from_ymd_opt(2025, 12, 12));
        assert_eq!(first.entries.len(), 2);

        let entry = &first.entries[0];
        assert_eq!(entry.match_id, "2388127");
        assert_eq!(entry.match_url, "https://www.hltv.org/matches/2388127/furia-vs-mouz-iem");
        assert_eq!(entry.team1_name, "FURIA");
        assert_eq!(entry.team2_name, "MOUZ");
        assert_eq!(entry.team1_score, Some(2));
        assert_eq!(entry.team2_score, Some(1));
        assert_eq!(entry.event_name.as_deref(), Some("IEM Chengdu 2025"));
        assert_eq!(entry.raw_format.as_deref(), Some("bo3"));
        assert_eq!(entry.date_parsed.as_deref(), Some("2025-12-12"));

        // container without a match link is dropped
        assert_eq!(doc.sections[1].entries.len(), 1);
        assert_eq!(doc.sections[2].date, NaiveDate::from_ymd_opt(2025, 12, 1));
    }
}
