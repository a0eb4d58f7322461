use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Team1,
    Team2,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Team1 => write!(f, "team1"),
            Side::Team2 => write!(f, "team2"),
        }
    }
}

/// Canonical best-of token. Anything unrecognised is carried as `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatType {
    Bo1,
    Bo3,
    Bo5,
}

impl std::fmt::Display for FormatType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FormatType::Bo1 => "bo1",
            FormatType::Bo3 => "bo3",
            FormatType::Bo5 => "bo5",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Match details
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamRef {
    pub team_id: Option<String>,
    pub name: String,
    pub logo_url: Option<String>,
    pub score: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRef {
    pub event_id: Option<String>,
    pub name: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapResult {
    /// 1-based, contiguous over played maps.
    pub map_number: u32,
    pub map_name: String,
    pub team1_score: Option<i32>,
    pub team2_score: Option<i32>,
    pub team1_ct_score: Option<i32>,
    pub team1_t_score: Option<i32>,
    pub team2_ct_score: Option<i32>,
    pub team2_t_score: Option<i32>,
    pub winner: Option<Side>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerMatchStat {
    pub player_id: Option<String>,
    pub player_nick: String,
    pub player_name: Option<String>,
    pub country: Option<String>,
    pub team_id: Option<String>,
    pub kills: Option<i32>,
    pub deaths: Option<i32>,
    pub kd_diff: Option<i32>,
    pub adr: Option<f64>,
    pub kast: Option<f64>,
    pub rating: Option<f64>,
    /// Signed round-swing percentage.
    pub swing: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamMatchStats {
    pub team_id: Option<String>,
    pub team_name: String,
    pub team_logo_url: Option<String>,
    pub players: Vec<PlayerMatchStat>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub match_id: String,
    pub match_url: String,
    pub team1: TeamRef,
    pub team2: TeamRef,
    pub event: EventRef,
    pub date: Option<String>,
    pub time_unix: Option<i64>,
    /// Format text as shown on the page, e.g. "Best of 3 (LAN)".
    pub raw_format: Option<String>,
    pub format: Option<FormatType>,
    pub winner: Option<Side>,
    pub final_score: Option<String>,
    pub maps: Vec<MapResult>,
    pub team1_stats: Option<TeamMatchStats>,
    pub team2_stats: Option<TeamMatchStats>,
}

// ---------------------------------------------------------------------------
// Results listing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultsListingEntry {
    pub match_id: String,
    pub match_url: String,
    pub team1_name: String,
    pub team2_name: String,
    pub team1_score: Option<i32>,
    pub team2_score: Option<i32>,
    pub event_name: Option<String>,
    pub raw_format: Option<String>,
    /// Date section headline the entry was listed under.
    pub date: Option<String>,
    /// `date` canonicalised to YYYY-MM-DD when parseable.
    pub date_parsed: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultsPage {
    pub matches: Vec<ResultsListingEntry>,
    pub total_count: usize,
    pub offset: u32,
    pub has_more: bool,
    pub next_offset: Option<u32>,
    pub reached_before_start: bool,
}

// ---------------------------------------------------------------------------
// Upcoming / lineup
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpcomingMatch {
    pub match_id: String,
    pub match_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpcomingMatches {
    pub matches: Vec<UpcomingMatch>,
    pub total_count: usize,
}

/// Which document shape a lineup was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineupSource {
    /// Pre-match roster box.
    Roster,
    /// Post-match statistics table.
    StatsTable,
    /// Live comparison panel.
    LiveCompare,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineupPlayer {
    pub player_id: Option<String>,
    pub player_name: String,
    pub country: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamLineup {
    pub team_id: Option<String>,
    pub team_name: String,
    pub team_logo: Option<String>,
    pub players: Vec<LineupPlayer>,
    pub source: Option<LineupSource>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchLineup {
    pub match_id: String,
    pub match_url: String,
    pub event_name: Option<String>,
    pub time_unix: Option<i64>,
    pub date: Option<String>,
    pub raw_format: Option<String>,
    pub is_live: bool,
    pub team1: TeamLineup,
    pub team2: TeamLineup,
}
