//! Text-to-value normalisation shared by every page parser.
//!
//! Nothing here fails: malformed input degrades to `None`.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

use crate::types::{FormatType, Side};

fn pattern(re: &str) -> Regex {
    Regex::new(re).unwrap_or_else(|e| unreachable!("static pattern {re}: {e}"))
}

static TEAM_ID: LazyLock<Regex> = LazyLock::new(|| pattern(r"/team/(\d+)/"));
static EVENT_ID: LazyLock<Regex> = LazyLock::new(|| pattern(r"/events?/(\d+)/"));
static PLAYER_ID: LazyLock<Regex> = LazyLock::new(|| pattern(r"/player/(\d+)/"));
static MATCH_ID: LazyLock<Regex> = LazyLock::new(|| pattern(r"/matches/(\d+)/"));
static ORDINAL: LazyLock<Regex> = LazyLock::new(|| pattern(r"(\d+)(st|nd|rd|th)\b"));
static DIGITS: LazyLock<Regex> = LazyLock::new(|| pattern(r"\d+"));

const DATE_PREFIX: &str = "Results for ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdKind {
    Team,
    Event,
    Player,
    Match,
}

/// Numeric id embedded in a site path such as `/team/8297/furia`.
pub fn extract_id(kind: IdKind, href: Option<&str>) -> Option<String> {
    let re = match kind {
        IdKind::Team => &*TEAM_ID,
        IdKind::Event => &*EVENT_ID,
        IdKind::Player => &*PLAYER_ID,
        IdKind::Match => &*MATCH_ID,
    };
    re.captures(href?)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Whole-string integer parse.
pub fn parse_score(text: Option<&str>) -> Option<i32> {
    text?.trim().parse().ok()
}

/// First run of digits anywhere in the text.
pub fn first_int(text: Option<&str>) -> Option<i32> {
    DIGITS.find(text?).and_then(|m| m.as_str().parse().ok())
}

/// `"47-50"` to `(47, 50)`.
pub fn parse_kd(text: Option<&str>) -> (Option<i32>, Option<i32>) {
    let Some(text) = text else {
        return (None, None);
    };
    let parts: Vec<&str> = text.split('-').collect();
    if parts.len() != 2 {
        return (None, None);
    }
    match (parts[0].trim().parse(), parts[1].trim().parse()) {
        (Ok(k), Ok(d)) => (Some(k), Some(d)),
        _ => (None, None),
    }
}

pub fn kd_diff(kills: Option<i32>, deaths: Option<i32>) -> Option<i32> {
    Some(kills? - deaths?)
}

pub fn parse_float(text: Option<&str>) -> Option<f64> {
    text?.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Strips a trailing `%` and an optional leading `+`.
pub fn parse_percentage(text: Option<&str>) -> Option<f64> {
    let text = text?.trim();
    let text = text.strip_suffix('%').unwrap_or(text).trim();
    let text = text.strip_prefix('+').unwrap_or(text);
    parse_float(Some(text))
}

pub fn canonicalize_format(text: Option<&str>) -> Option<FormatType> {
    let lower = text?.to_lowercase();
    if lower.contains("best of 1") {
        Some(FormatType::Bo1)
    } else if lower.contains("best of 3") {
        Some(FormatType::Bo3)
    } else if lower.contains("best of 5") {
        Some(FormatType::Bo5)
    } else {
        None
    }
}

/// `"Results for December 12th 2025"` to 2025-12-12.
pub fn parse_headline_date(text: &str) -> Option<NaiveDate> {
    let stripped = ORDINAL.replace_all(text, "$1");
    let stripped = stripped.replace(DATE_PREFIX, "");
    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    NaiveDate::parse_from_str(&collapsed, "%B %d %Y").ok()
}

/// ISO `YYYY-MM-DD` form of [`parse_headline_date`].
pub fn canonicalize_date(text: Option<&str>) -> Option<String> {
    parse_headline_date(text?).map(|d| d.format("%Y-%m-%d").to_string())
}

/// Winner and `"t1-t2"` final score, only when both scores are known.
pub fn derive_outcome(team1: Option<i32>, team2: Option<i32>) -> (Option<Side>, Option<String>) {
    let (Some(a), Some(b)) = (team1, team2) else {
        return (None, None);
    };
    let winner = match a.cmp(&b) {
        std::cmp::Ordering::Greater => Some(Side::Team1),
        std::cmp::Ordering::Less => Some(Side::Team2),
        std::cmp::Ordering::Equal => None,
    };
    (winner, Some(format!("{a}-{b}")))
}

pub fn parse_unix(text: Option<&str>) -> Option<i64> {
    text?.trim().parse().ok()
}

/// `"s1mple-x"` to `"S1mple X"`.
pub fn title_case_slug(slug: &str) -> String {
    slug.split(['-', '_'])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(|c| c.to_lowercase())).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_come_from_fixed_path_segments() {
        assert_eq!(extract_id(IdKind::Team, Some("/team/8297/furia")).as_deref(), Some("8297"));
        assert_eq!(extract_id(IdKind::Event, Some("/events/8045/iem")).as_deref(), Some("8045"));
        assert_eq!(extract_id(IdKind::Event, Some("/event/12/x")).as_deref(), Some("12"));
        assert_eq!(extract_id(IdKind::Player, Some("/player/15631/kscerato")).as_deref(), Some("15631"));
        assert_eq!(
            extract_id(IdKind::Match, Some("/matches/2388127/furia-vs-mouz")).as_deref(),
            Some("2388127")
        );
        assert_eq!(extract_id(IdKind::Team, Some("/player/1/x")), None);
        assert_eq!(extract_id(IdKind::Team, None), None);
    }

    #[test]
    fn kd_splits_and_diffs() {
        let (k, d) = parse_kd(Some("47-50"));
        assert_eq!((k, d), (Some(47), Some(50)));
        assert_eq!(kd_diff(k, d), Some(-3));
        assert_eq!(parse_kd(Some("47")), (None, None));
        assert_eq!(parse_kd(Some("a-b")), (None, None));
        assert_eq!(parse_kd(None), (None, None));
        assert_eq!(kd_diff(Some(3), None), None);
    }

    #[test]
    fn percentages_strip_sign_and_suffix() {
        assert_eq!(parse_percentage(Some("+4.12%")), Some(4.12));
        assert_eq!(parse_percentage(Some("-2.32%")), Some(-2.32));
        assert_eq!(parse_percentage(Some("71.4%")), Some(71.4));
        assert_eq!(parse_percentage(Some("")), None);
        assert_eq!(parse_percentage(Some("-")), None);
        assert_eq!(parse_percentage(None), None);
    }

    #[test]
    fn scores_parse_or_degrade() {
        assert_eq!(parse_score(Some(" 16 ")), Some(16));
        assert_eq!(parse_score(Some("-")), None);
        assert_eq!(first_int(Some("13 (7:5)")), Some(13));
        assert_eq!(first_int(Some("none")), None);
    }

    #[test]
    fn dates_canonicalise() {
        assert_eq!(canonicalize_date(Some("December 12th 2025")).as_deref(), Some("2025-12-12"));
        assert_eq!(
            canonicalize_date(Some("Results for December 12 2025")).as_deref(),
            Some("2025-12-12")
        );
        assert_eq!(canonicalize_date(Some("Results for March 1st 2024")).as_deref(), Some("2024-03-01"));
        assert_eq!(canonicalize_date(Some("Featured results")), None);
        assert_eq!(canonicalize_date(None), None);
    }

    #[test]
    fn formats_canonicalise() {
        assert_eq!(canonicalize_format(Some("Best of 3 (LAN)")), Some(FormatType::Bo3));
        assert_eq!(canonicalize_format(Some("best of 1 (Online)")), Some(FormatType::Bo1));
        assert_eq!(canonicalize_format(Some("BEST OF 5")), Some(FormatType::Bo5));
        assert_eq!(canonicalize_format(Some("bo3")), None);
    }

    #[test]
    fn outcome_needs_both_scores() {
        assert_eq!(derive_outcome(Some(2), Some(1)), (Some(Side::Team1), Some("2-1".into())));
        assert_eq!(derive_outcome(Some(0), Some(2)), (Some(Side::Team2), Some("0-2".into())));
        assert_eq!(derive_outcome(Some(1), Some(1)), (None, Some("1-1".into())));
        assert_eq!(derive_outcome(Some(1), None), (None, None));
    }

    #[test]
    fn slugs_title_case() {
        assert_eq!(title_case_slug("kscerato"), "Kscerato");
        assert_eq!(title_case_slug("hallzerk-x"), "Hallzerk X");
    }
}
