//! Versioned selector catalog.
//!
//! Every location query the parsers use lives in `config/selectors.json`.
//! The file is compiled into the binary and can be replaced at startup
//! (`SELECTOR_CATALOG`) when the site's markup moves.

use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::error::{AppError, Result};
use crate::extract::field::{FieldQuery, NodeQuery};

const EMBEDDED_CATALOG: &str = include_str!("../../config/selectors.json");

#[derive(Debug, Clone, Deserialize)]
pub struct SelectorCatalog {
    pub version: String,
    pub results: ResultsSelectors,
    pub match_page: MatchPageSelectors,
    pub maps: MapSelectors,
    pub stats: StatsSelectors,
    pub lineup: LineupSelectors,
    pub upcoming: UpcomingSelectors,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResultsSelectors {
    pub sections: NodeQuery,
    pub headline: FieldQuery,
    pub containers: NodeQuery,
    pub match_link: FieldQuery,
    pub team1_name: FieldQuery,
    pub team2_name: FieldQuery,
    pub team1_score: FieldQuery,
    pub team2_score: FieldQuery,
    pub event_name: FieldQuery,
    pub format: FieldQuery,
    pub next_page: FieldQuery,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TeamHeaderSelectors {
    pub name: FieldQuery,
    pub link: FieldQuery,
    pub logo: FieldQuery,
    pub score_won: FieldQuery,
    pub score_lost: FieldQuery,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MatchPageSelectors {
    pub canonical: FieldQuery,
    pub team1: TeamHeaderSelectors,
    pub team2: TeamHeaderSelectors,
    pub event_link: FieldQuery,
    pub event_name: FieldQuery,
    pub date: FieldQuery,
    pub time_unix: FieldQuery,
    pub format: FieldQuery,
    pub map_holders: NodeQuery,
}

/// Evaluated relative to one map holder.
#[derive(Debug, Clone, Deserialize)]
pub struct MapSelectors {
    pub name: FieldQuery,
    pub team1_score: FieldQuery,
    pub team2_score: FieldQuery,
    pub team1_ct: FieldQuery,
    pub team1_t: FieldQuery,
    pub team2_ct: FieldQuery,
    pub team2_t: FieldQuery,
    pub team1_won: NodeQuery,
    pub team2_won: NodeQuery,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatsSelectors {
    pub tables: NodeQuery,
    pub header_row: NodeQuery,
    pub team_name: FieldQuery,
    pub team_link: FieldQuery,
    pub team_logo: FieldQuery,
    pub player_rows: NodeQuery,
    pub player_link: FieldQuery,
    pub player_nick: FieldQuery,
    pub player_full_name: FieldQuery,
    pub player_flag: FieldQuery,
    pub kd: FieldQuery,
    pub swing: FieldQuery,
    pub adr: FieldQuery,
    pub kast: FieldQuery,
    pub rating: FieldQuery,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LineupSelectors {
    pub roster_boxes: NodeQuery,
    pub roster_names: FieldQuery,
    pub roster_links: FieldQuery,
    pub roster_flags: FieldQuery,
    pub stats_tables: NodeQuery,
    pub stats_rows: NodeQuery,
    pub stats_link: FieldQuery,
    pub stats_name: FieldQuery,
    pub stats_flag: FieldQuery,
    pub compare_left: NodeQuery,
    pub compare_right: NodeQuery,
    pub compare_players: NodeQuery,
    pub compare_name: FieldQuery,
    pub compare_flag: FieldQuery,
    pub countdown: NodeQuery,
    pub live_indicator: NodeQuery,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpcomingSelectors {
    pub match_links: FieldQuery,
}

impl SelectorCatalog {
    /// Catalog compiled into the binary.
    pub fn embedded() -> Result<Self> {
        Self::from_json(EMBEDDED_CATALOG)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|e| AppError::Selector(format!("invalid selector catalog: {e}")))
    }

    /// File override when given, embedded catalog otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let catalog = match path {
            Some(p) => {
                let raw = std::fs::read_to_string(p)?;
                Self::from_json(&raw)?
            }
            None => Self::embedded()?,
        };
        info!(
            version = %catalog.version,
            source = %path.map(|p| p.display().to_string()).unwrap_or_else(|| "embedded".into()),
            "Selector catalog loaded"
        );
        Ok(catalog)
    }
}
