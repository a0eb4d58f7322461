//! Upcoming matches overview and per-match lineups.

use std::collections::HashSet;

use scraper::{ElementRef, Html};

use crate::config::join_url;
use crate::extract::catalog::{LineupSelectors, SelectorCatalog, TeamHeaderSelectors};
use crate::parsers::details::canonical_url;
use crate::parsers::normalize::{extract_id, parse_unix, title_case_slug, IdKind};
use crate::types::{
    LineupPlayer, LineupSource, MatchLineup, Side, TeamLineup, UpcomingMatch, UpcomingMatches,
};

pub const DEFAULT_UPCOMING_LIMIT: usize = 50;
pub const MAX_UPCOMING_LIMIT: usize = 200;

pub fn upcoming_url(base_url: &str) -> String {
    format!("{base_url}/matches")
}

/// Match links in page order, de-duplicated by id, capped at `limit`.
pub fn parse_upcoming(body: &str, catalog: &SelectorCatalog, base_url: &str, limit: usize) -> UpcomingMatches {
    let html = Html::parse_document(body);
    let mut seen = HashSet::new();
    let mut matches = Vec::new();

    for href in catalog.upcoming.match_links.values(html.root_element()) {
        if matches.len() >= limit {
            break;
        }
        let Some(match_id) = extract_id(IdKind::Match, Some(&href)) else {
            continue;
        };
        if !seen.insert(match_id.clone()) {
            continue;
        }
        matches.push(UpcomingMatch {
            match_id,
            match_url: join_url(base_url, &href),
        });
    }

    let total_count = matches.len();
    UpcomingMatches { matches, total_count }
}

// ---------------------------------------------------------------------------
// Lineups
// ---------------------------------------------------------------------------

type Strategy = for<'a, 'b> fn(ElementRef<'a>, &'b LineupSelectors, Side) -> Vec<LineupPlayer>;

/// Tried in order; the first non-empty result wins. The page shows a roster
/// box before the match, a stats table after it and a comparison panel while live.
const LINEUP_STRATEGIES: &[(LineupSource, Strategy)] = &[
    (LineupSource::Roster, roster_players),
    (LineupSource::StatsTable, stats_table_players),
    (LineupSource::LiveCompare, live_compare_players),
];

fn side_index(side: Side) -> usize {
    match side {
        Side::Team1 => 0,
        Side::Team2 => 1,
    }
}

fn roster_players(root: ElementRef<'_>, sel: &LineupSelectors, side: Side) -> Vec<LineupPlayer> {
    let Some(roster) = sel.roster_boxes.select(root).into_iter().nth(side_index(side)) else {
        return Vec::new();
    };
    let links = sel.roster_links.values(roster);
    let flags = sel.roster_flags.values(roster);

    sel.roster_names
        .values(roster)
        .into_iter()
        .enumerate()
        .map(|(i, name)| LineupPlayer {
            player_id: extract_id(IdKind::Player, links.get(i).map(String::as_str)),
            player_name: name,
            country: flags.get(i).cloned(),
        })
        .collect()
}

fn stats_table_players(root: ElementRef<'_>, sel: &LineupSelectors, side: Side) -> Vec<LineupPlayer> {
    let Some(table) = sel.stats_tables.select(root).into_iter().nth(side_index(side)) else {
        return Vec::new();
    };
    sel.stats_rows
        .select(table)
        .into_iter()
        .filter_map(|row| {
            let name = sel.stats_name.get(row)?;
            Some(LineupPlayer {
                player_id: extract_id(IdKind::Player, sel.stats_link.get(row).as_deref()),
                player_name: name,
                country: sel.stats_flag.get(row),
            })
        })
        .collect()
}

fn live_compare_players(root: ElementRef<'_>, sel: &LineupSelectors, side: Side) -> Vec<LineupPlayer> {
    let panel = match side {
        Side::Team1 => &sel.compare_left,
        Side::Team2 => &sel.compare_right,
    };
    let Some(container) = panel.first(root) else {
        return Vec::new();
    };
    sel.compare_players
        .select(container)
        .into_iter()
        .filter_map(|link| {
            let href = link.value().attr("href").unwrap_or_default();
            let name = sel.compare_name.get(link).or_else(|| {
                href.rsplit('/')
                    .next()
                    .map(title_case_slug)
                    .filter(|n| !n.is_empty())
            })?;
            Some(LineupPlayer {
                player_id: extract_id(IdKind::Player, Some(href)),
                player_name: name,
                country: sel.compare_flag.get(link),
            })
        })
        .collect()
}

fn team_lineup(root: ElementRef<'_>, header: &TeamHeaderSelectors, sel: &LineupSelectors, side: Side) -> TeamLineup {
    let (source, players) = LINEUP_STRATEGIES
        .iter()
        .map(|(source, strategy)| (*source, strategy(root, sel, side)))
        .find(|(_, players)| !players.is_empty())
        .map(|(source, players)| (Some(source), players))
        .unwrap_or((None, Vec::new()));

    TeamLineup {
        team_id: extract_id(IdKind::Team, header.link.get(root).as_deref()),
        team_name: header.name.get(root).unwrap_or_else(|| "Unknown".to_string()),
        team_logo: header.logo.get(root),
        players,
        source,
    }
}

pub fn parse_lineup(
    body: &str,
    match_id: &str,
    requested_url: &str,
    catalog: &SelectorCatalog,
    base_url: &str,
) -> MatchLineup {
    let html = Html::parse_document(body);
    let root = html.root_element();
    let page = &catalog.match_page;
    let sel = &catalog.lineup;

    let is_live = !sel.countdown.exists(root) || sel.live_indicator.exists(root);

    MatchLineup {
        match_id: match_id.to_string(),
        match_url: canonical_url(&html, catalog, base_url, requested_url),
        event_name: page.event_name.get(root),
        time_unix: parse_unix(page.time_unix.get(root).as_deref()),
        date: page.date.get(root),
        raw_format: page.format.get(root),
        is_live,
        team1: team_lineup(root, &page.team1, sel, Side::Team1),
        team2: team_lineup(root, &page.team2, sel, Side::Team2),
    }
}
