/// Database row types matching `migrations/0001_init.sql`.

#[derive(Debug, sqlx::FromRow)]
pub struct MatchRow {
    pub match_id: String,
    pub match_url: String,
    pub team1_score: Option<i64>,
    pub team2_score: Option<i64>,
    pub event_name: Option<String>,
    pub format: Option<String>,
    pub winner: Option<String>,
    pub final_score: Option<String>,
    pub ingested_at: i64,
}

#[derive(Debug, sqlx::FromRow)]
pub struct StatsRow {
    pub total_matches: i64,
    pub total_maps: i64,
    pub total_player_stats: i64,
    pub total_teams: i64,
    pub total_players: i64,
    pub last_ingested_at: Option<i64>,
}
