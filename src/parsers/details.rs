//! Match page: teams, event, maps and per-player statistics.

use scraper::{ElementRef, Html};

use crate::config::join_url;
use crate::extract::catalog::{MapSelectors, SelectorCatalog, StatsSelectors, TeamHeaderSelectors};
use crate::parsers::normalize::{
    canonicalize_format, derive_outcome, extract_id, first_int, kd_diff, parse_float, parse_kd,
    parse_percentage, parse_score, parse_unix, IdKind,
};
use crate::types::{
    EventRef, MapResult, MatchRecord, PlayerMatchStat, Side, TeamMatchStats, TeamRef,
};

const UNKNOWN_TEAM: &str = "Unknown";

/// URL that resolves to the match regardless of its current slug.
pub fn match_url(base_url: &str, match_id: &str) -> String {
    format!("{base_url}/matches/{match_id}/_")
}

/// Page-declared canonical link, else the URL the page was requested with.
pub fn canonical_url(html: &Html, catalog: &SelectorCatalog, base_url: &str, requested: &str) -> String {
    catalog
        .match_page
        .canonical
        .get(html.root_element())
        .map(|href| join_url(base_url, &href))
        .unwrap_or_else(|| requested.to_string())
}

pub fn parse_match_details(
    body: &str,
    match_id: &str,
    requested_url: &str,
    catalog: &SelectorCatalog,
    base_url: &str,
) -> MatchRecord {
    let html = Html::parse_document(body);
    let root = html.root_element();
    let page = &catalog.match_page;

    let team1 = parse_team(root, &page.team1);
    let team2 = parse_team(root, &page.team2);

    let event_href = page.event_link.get(root);
    let event = EventRef {
        event_id: extract_id(IdKind::Event, event_href.as_deref()),
        name: page.event_name.get(root),
        url: event_href.map(|href| join_url(base_url, &href)),
    };

    let raw_format = page.format.get(root);
    let format = canonicalize_format(raw_format.as_deref());
    let (winner, final_score) = derive_outcome(team1.score, team2.score);

    let maps = page
        .map_holders
        .select(root)
        .into_iter()
        .filter_map(|holder| parse_map(holder, &catalog.maps))
        .enumerate()
        .map(|(i, mut map)| {
            map.map_number = i as u32 + 1;
            map
        })
        .collect();

    let mut team_stats = catalog
        .stats
        .tables
        .select(root)
        .into_iter()
        .take(2)
        .filter_map(|table| parse_stats_table(table, &catalog.stats));
    let team1_stats = team_stats.next();
    let team2_stats = team_stats.next();

    MatchRecord {
        match_id: match_id.to_string(),
        match_url: canonical_url(&html, catalog, base_url, requested_url),
        team1,
        team2,
        event,
        date: page.date.get(root),
        time_unix: parse_unix(page.time_unix.get(root).as_deref()),
        raw_format,
        format,
        winner,
        final_score,
        maps,
        team1_stats,
        team2_stats,
    }
}

fn parse_team(root: ElementRef<'_>, sel: &TeamHeaderSelectors) -> TeamRef {
    let link = sel.link.get(root);
    let score = sel.score_won.get(root).or_else(|| sel.score_lost.get(root));
    TeamRef {
        team_id: extract_id(IdKind::Team, link.as_deref()),
        name: sel.name.get(root).unwrap_or_else(|| UNKNOWN_TEAM.to_string()),
        logo_url: sel.logo.get(root),
        score: parse_score(score.as_deref()),
    }
}

/// `None` for maps not yet decided ("TBA") or without a name.
fn parse_map(holder: ElementRef<'_>, sel: &MapSelectors) -> Option<MapResult> {
    let name = sel.name.get(holder)?;
    if name.eq_ignore_ascii_case("tba") {
        return None;
    }

    let winner = if sel.team1_won.exists(holder) {
        Some(Side::Team1)
    } else if sel.team2_won.exists(holder) {
        Some(Side::Team2)
    } else {
        None
    };

    Some(MapResult {
        map_number: 0,
        map_name: name,
        team1_score: first_int(sel.team1_score.get(holder).as_deref()),
        team2_score: first_int(sel.team2_score.get(holder).as_deref()),
        team1_ct_score: parse_score(sel.team1_ct.get(holder).as_deref()),
        team1_t_score: parse_score(sel.team1_t.get(holder).as_deref()),
        team2_ct_score: parse_score(sel.team2_ct.get(holder).as_deref()),
        team2_t_score: parse_score(sel.team2_t.get(holder).as_deref()),
        winner,
    })
}

fn parse_stats_table(table: ElementRef<'_>, sel: &StatsSelectors) -> Option<TeamMatchStats> {
    let header = sel.header_row.first(table)?;
    let team_link = sel.team_link.get(header);
    let team_id = extract_id(IdKind::Team, team_link.as_deref());

    let players = sel
        .player_rows
        .select(table)
        .into_iter()
        .filter_map(|row| parse_player_row(row, sel, team_id.as_deref()))
        .collect();

    Some(TeamMatchStats {
        team_id,
        team_name: sel.team_name.get(header).unwrap_or_else(|| UNKNOWN_TEAM.to_string()),
        team_logo_url: sel.team_logo.get(header),
        players,
    })
}

fn parse_player_row(row: ElementRef<'_>, sel: &StatsSelectors, team_id: Option<&str>) -> Option<PlayerMatchStat> {
    let nick = sel.player_nick.get(row)?;
    let (kills, deaths) = parse_kd(sel.kd.get(row).as_deref());

    Some(PlayerMatchStat {
        player_id: extract_id(IdKind::Player, sel.player_link.get(row).as_deref()),
        player_name: Some(sel.player_full_name.get(row).unwrap_or_else(|| nick.clone())),
        player_nick: nick,
        country: sel.player_flag.get(row),
        team_id: team_id.map(str::to_string),
        kills,
        deaths,
        kd_diff: kd_diff(kills, deaths),
        adr: parse_float(sel.adr.get(row).as_deref()),
        kast: parse_percentage(sel.kast.get(row).as_deref()),
        rating: parse_float(sel.rating.get(row).as_deref()),
        swing: parse_percentage(sel.swing.get(row).as_deref()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FormatType;

    const PAGE: &str = include_str!("../../tests/fixtures/match_page.html");
    const BASE: &str = "https://www.hltv.org";

    fn parse() -> MatchRecord {
        let catalog = SelectorCatalog::embedded().unwrap();
        parse_match_details(PAGE, "2388127", &match_url(BASE, "2388127"), &catalog, BASE)
    }

    #[test]
    fn header_fields() {
        let m = parse();
        assert_eq!(m.match_url, "https://www.hltv.org/matches/2388127/furia-vs-mouz-iem-chengdu-2025");
        assert_eq!(m.team1.team_id.as_deref(), Some("8297"));
        assert_eq!(m.team1.name, "FURIA");
        assert_eq!(m.team1.score, Some(2));
        assert_eq!(m.team2.team_id.as_deref(), Some("4494"));
        assert_eq!(m.team2.score, Some(1));
        assert_eq!(m.event.event_id.as_deref(), Some("8045"));
        assert_eq!(m.event.name.as_deref(), Some("IEM Chengdu 2025"));
        assert_eq!(m.event.url.as_deref(), Some("https://www.hltv.org/events/8045/iem-chengdu-2025"));
        assert_eq!(m.date.as_deref(), Some("12th of December 2025"));
        assert_eq!(m.time_unix, Some(1765540800000));
        assert_eq!(m.raw_format.as_deref(), Some("Best of 3 (LAN)"));
        assert_eq!(m.format, Some(FormatType::Bo3));
        assert_eq!(m.winner, Some(Side::Team1));
        assert_eq!(m.final_score.as_deref(), Some("2-1"));
    }

    #[test]
    fn tba_maps_are_dropped_without_gaps() {
        let m = parse();
        let names: Vec<_> = m.maps.iter().map(|x| x.map_name.as_str()).collect();
        assert_eq!(names, vec!["Mirage", "Inferno", "Nuke"]);
        let numbers: Vec<_> = m.maps.iter().map(|x| x.map_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);

        let mirage = &m.maps[0];
        assert_eq!((mirage.team1_score, mirage.team2_score), (Some(10), Some(13)));
        assert_eq!(mirage.team1_ct_score, Some(6));
        assert_eq!(mirage.team1_t_score, Some(4));
        assert_eq!(mirage.team2_ct_score, Some(8));
        assert_eq!(mirage.team2_t_score, Some(5));
        assert_eq!(mirage.winner, Some(Side::Team2));
        assert_eq!(m.maps[1].winner, Some(Side::Team1));
    }

    #[test]
    fn player_stats_tables() {
        let m = parse();
        let t1 = m.team1_stats.expect("team1 stats");
        assert_eq!(t1.team_id.as_deref(), Some("8297"));
        assert_eq!(t1.team_name, "FURIA");
        assert_eq!(t1.players.len(), 2);

        let ksc = &t1.players[0];
        assert_eq!(ksc.player_id.as_deref(), Some("15631"));
        assert_eq!(ksc.player_nick, "KSCERATO");
        assert_eq!(ksc.player_name.as_deref(), Some("Kaike Cerato"));
        assert_eq!(ksc.country.as_deref(), Some("Brazil"));
        assert_eq!(ksc.team_id.as_deref(), Some("8297"));
        assert_eq!((ksc.kills, ksc.deaths, ksc.kd_diff), (Some(47), Some(50), Some(-3)));
        assert_eq!(ksc.adr, Some(78.4));
        assert_eq!(ksc.kast, Some(71.4));
        assert_eq!(ksc.rating, Some(1.02));
        assert_eq!(ksc.swing, Some(4.12));

        let yuurih = &t1.players[1];
        assert_eq!(yuurih.player_name.as_deref(), Some("yuurih"));
        assert_eq!(yuurih.swing, Some(-2.32));
        assert_eq!(yuurih.kast, None);

        // row without a nick is skipped
        let t2 = m.team2_stats.expect("team2 stats");
        assert_eq!(t2.players.len(), 1);
        assert_eq!(t2.players[0].player_nick, "torzsi");
    }

    #[test]
    fn sparse_page_degrades_to_nulls() {
        let catalog = SelectorCatalog::embedded().unwrap();
        let url = match_url(BASE, "1");
        let m = parse_match_details("<html><body></body></html>", "1", &url, &catalog, BASE);
        assert_eq!(m.match_url, url);
        assert_eq!(m.team1.name, "Unknown");
        assert_eq!(m.team1.score, None);
        assert_eq!(m.winner, None);
        assert_eq!(m.final_score, None);
        assert!(m.maps.is_empty());
        assert!(m.team1_stats.is_none());
    }
}
