//! Flat-file sink: six CSV tables under one directory, appended one match at a time.
//!
//! Team and player tables are append-only logs keyed by id; statistics count
//! distinct ids rather than rows.

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::Result;
use crate::sink::{Sink, StorageStats};
use crate::types::{FormatType, MatchRecord, Side, TeamMatchStats};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Matches,
    Maps,
    PlayerStats,
    MatchPlayers,
    Teams,
    Players,
}

impl Table {
    pub const ALL: [Table; 6] = [
        Table::Matches,
        Table::Maps,
        Table::PlayerStats,
        Table::MatchPlayers,
        Table::Teams,
        Table::Players,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Table::Matches => "matches",
            Table::Maps => "maps",
            Table::PlayerStats => "player_stats",
            Table::MatchPlayers => "match_players",
            Table::Teams => "teams",
            Table::Players => "players",
        }
    }

    /// Column order of the row structs below.
    fn headers(self) -> &'static [&'static str] {
        match self {
            Table::Matches => &[
                "match_id", "match_url", "team1_id", "team1_name", "team1_score", "team2_id",
                "team2_name", "team2_score", "event_id", "event_name", "event_url", "date",
                "time_unix", "match_format", "format_type", "winner", "final_score", "scraped_at",
            ],
            Table::Maps => &[
                "match_id", "map_number", "map_name", "team1_score", "team2_score",
                "team1_ct_score", "team1_t_score", "team2_ct_score", "team2_t_score", "winner",
            ],
            Table::PlayerStats => &[
                "match_id", "team_id", "player_id", "player_name", "player_nick", "country",
                "kills", "deaths", "kd_diff", "adr", "kast", "rating", "swing",
            ],
            Table::MatchPlayers => &[
                "match_id", "team_id", "team_name", "player_id", "player_nick", "country",
            ],
            Table::Teams => &["team_id", "team_name", "team_logo_url", "last_updated"],
            Table::Players => &["player_id", "player_name", "player_nick", "country", "last_updated"],
        }
    }
}

#[derive(Serialize)]
struct MatchRow<'a> {
    match_id: &'a str,
    match_url: &'a str,
    team1_id: Option<&'a str>,
    team1_name: &'a str,
    team1_score: Option<i32>,
    team2_id: Option<&'a str>,
    team2_name: &'a str,
    team2_score: Option<i32>,
    event_id: Option<&'a str>,
    event_name: Option<&'a str>,
    event_url: Option<&'a str>,
    date: Option<&'a str>,
    time_unix: Option<i64>,
    match_format: Option<&'a str>,
    format_type: Option<FormatType>,
    winner: Option<Side>,
    final_score: Option<&'a str>,
    scraped_at: &'a str,
}

#[derive(Serialize)]
struct MapRow<'a> {
    match_id: &'a str,
    map_number: u32,
    map_name: &'a str,
    team1_score: Option<i32>,
    team2_score: Option<i32>,
    team1_ct_score: Option<i32>,
    team1_t_score: Option<i32>,
    team2_ct_score: Option<i32>,
    team2_t_score: Option<i32>,
    winner: Option<Side>,
}

#[derive(Serialize)]
struct PlayerStatRow<'a> {
    match_id: &'a str,
    team_id: Option<&'a str>,
    player_id: Option<&'a str>,
    player_name: Option<&'a str>,
    player_nick: &'a str,
    country: Option<&'a str>,
    kills: Option<i32>,
    deaths: Option<i32>,
    kd_diff: Option<i32>,
    adr: Option<f64>,
    kast: Option<f64>,
    rating: Option<f64>,
    swing: Option<f64>,
}

#[derive(Serialize)]
struct MatchPlayerRow<'a> {
    match_id: &'a str,
    team_id: Option<&'a str>,
    team_name: &'a str,
    player_id: Option<&'a str>,
    player_nick: &'a str,
    country: Option<&'a str>,
}

#[derive(Serialize)]
struct TeamRow<'a> {
    team_id: &'a str,
    team_name: &'a str,
    team_logo_url: Option<&'a str>,
    last_updated: &'a str,
}

#[derive(Serialize)]
struct PlayerRow<'a> {
    player_id: &'a str,
    player_name: Option<&'a str>,
    player_nick: &'a str,
    country: Option<&'a str>,
    last_updated: &'a str,
}

pub struct CsvSink {
    dir: PathBuf,
    /// Ids present in matches.csv. The lock also serialises appends.
    known: Mutex<HashSet<String>>,
}

impl CsvSink {
    /// Creates missing tables with their header row and loads stored match ids.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        for table in Table::ALL {
            let path = table_path(&dir, table);
            if !path.exists() {
                let mut writer = csv::Writer::from_path(&path)?;
                writer.write_record(table.headers())?;
                writer.flush()?;
                debug!(path = %path.display(), "[SINK] created csv table");
            }
        }

        let known: HashSet<String> = read_column(&table_path(&dir, Table::Matches), "match_id")?
            .into_iter()
            .filter(|id| !id.is_empty())
            .collect();
        info!(dir = %dir.display(), known = known.len(), "[SINK] csv store opened");
        Ok(Self { dir, known: Mutex::new(known) })
    }

    /// Location of every table, keyed by table name.
    pub fn table_paths(&self) -> Vec<(&'static str, PathBuf)> {
        Table::ALL
            .iter()
            .map(|&t| (t.name(), table_path(&self.dir, t)))
            .collect()
    }

    fn appender(&self, table: Table) -> Result<csv::Writer<File>> {
        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(table_path(&self.dir, table))?;
        Ok(csv::WriterBuilder::new().has_headers(false).from_writer(file))
    }

    fn append<T: Serialize>(&self, table: Table, rows: impl IntoIterator<Item = T>) -> Result<()> {
        let mut writer = self.appender(table)?;
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        Ok(())
    }

    fn write_match(&self, m: &MatchRecord) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let id = m.match_id.as_str();

        self.append(
            Table::Matches,
            [MatchRow {
                match_id: id,
                match_url: &m.match_url,
                team1_id: m.team1.team_id.as_deref(),
                team1_name: &m.team1.name,
                team1_score: m.team1.score,
                team2_id: m.team2.team_id.as_deref(),
                team2_name: &m.team2.name,
                team2_score: m.team2.score,
                event_id: m.event.event_id.as_deref(),
                event_name: m.event.name.as_deref(),
                event_url: m.event.url.as_deref(),
                date: m.date.as_deref(),
                time_unix: m.time_unix,
                match_format: m.raw_format.as_deref(),
                format_type: m.format,
                winner: m.winner,
                final_score: m.final_score.as_deref(),
                scraped_at: &now,
            }],
        )?;

        self.append(
            Table::Maps,
            m.maps.iter().map(|map| MapRow {
                match_id: id,
                map_number: map.map_number,
                map_name: &map.map_name,
                team1_score: map.team1_score,
                team2_score: map.team2_score,
                team1_ct_score: map.team1_ct_score,
                team1_t_score: map.team1_t_score,
                team2_ct_score: map.team2_ct_score,
                team2_t_score: map.team2_t_score,
                winner: map.winner,
            }),
        )?;

        let sides: Vec<&TeamMatchStats> = [&m.team1_stats, &m.team2_stats]
            .into_iter()
            .flatten()
            .collect();

        self.append(
            Table::PlayerStats,
            sides.iter().flat_map(|team| {
                team.players.iter().map(move |p| PlayerStatRow {
                    match_id: id,
                    team_id: team.team_id.as_deref(),
                    player_id: p.player_id.as_deref(),
                    player_name: p.player_name.as_deref(),
                    player_nick: &p.player_nick,
                    country: p.country.as_deref(),
                    kills: p.kills,
                    deaths: p.deaths,
                    kd_diff: p.kd_diff,
                    adr: p.adr,
                    kast: p.kast,
                    rating: p.rating,
                    swing: p.swing,
                })
            }),
        )?;

        self.append(
            Table::MatchPlayers,
            sides.iter().flat_map(|team| {
                team.players.iter().map(move |p| MatchPlayerRow {
                    match_id: id,
                    team_id: team.team_id.as_deref(),
                    team_name: &team.team_name,
                    player_id: p.player_id.as_deref(),
                    player_nick: &p.player_nick,
                    country: p.country.as_deref(),
                })
            }),
        )?;

        self.append(
            Table::Teams,
            [&m.team1, &m.team2].into_iter().filter_map(|team| {
                Some(TeamRow {
                    team_id: team.team_id.as_deref()?,
                    team_name: &team.name,
                    team_logo_url: team.logo_url.as_deref(),
                    last_updated: &now,
                })
            }),
        )?;

        self.append(
            Table::Players,
            sides.iter().flat_map(|team| team.players.iter()).filter_map(|p| {
                Some(PlayerRow {
                    player_id: p.player_id.as_deref()?,
                    player_name: p.player_name.as_deref(),
                    player_nick: &p.player_nick,
                    country: p.country.as_deref(),
                    last_updated: &now,
                })
            }),
        )?;

        Ok(())
    }

    fn column(&self, table: Table, column: &str) -> Result<Vec<String>> {
        read_column(&table_path(&self.dir, table), column)
    }

    fn distinct(&self, table: Table, column: &str) -> Result<i64> {
        let values: HashSet<String> = self
            .column(table, column)?
            .into_iter()
            .filter(|v| !v.is_empty())
            .collect();
        Ok(values.len() as i64)
    }
}

fn table_path(dir: &Path, table: Table) -> PathBuf {
    dir.join(format!("{}.csv", table.name()))
}

/// Values of one named column; empty when the file or column is missing.
fn read_column(path: &Path, column: &str) -> Result<Vec<String>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let mut reader = csv::Reader::from_path(path)?;
    let Some(idx) = reader.headers()?.iter().position(|h| h == column) else {
        return Ok(Vec::new());
    };
    let mut values = Vec::new();
    for record in reader.records() {
        values.push(record?.get(idx).unwrap_or_default().to_string());
    }
    Ok(values)
}

#[async_trait]
impl Sink for CsvSink {
    async fn exists(&self, match_id: &str) -> Result<bool> {
        let known = self.known.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(known.contains(match_id))
    }

    async fn save(&self, record: &MatchRecord) -> Result<bool> {
        let mut known = self.known.lock().unwrap_or_else(PoisonError::into_inner);
        if known.contains(&record.match_id) {
            return Ok(false);
        }
        self.write_match(record)?;
        known.insert(record.match_id.clone());
        Ok(true)
    }

    async fn known_ids(&self) -> Result<HashSet<String>> {
        Ok(self.known.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }

    async fn count(&self) -> Result<i64> {
        Ok(self.known.lock().unwrap_or_else(PoisonError::into_inner).len() as i64)
    }

    async fn last_ingested_at(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(self
            .column(Table::Matches, "scraped_at")?
            .iter()
            .filter_map(|v| DateTime::parse_from_rfc3339(v).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .max())
    }

    async fn statistics(&self) -> Result<StorageStats> {
        Ok(StorageStats {
            total_matches: self.count().await?,
            total_maps: self.column(Table::Maps, "match_id")?.len() as i64,
            total_player_stats: self.column(Table::PlayerStats, "match_id")?.len() as i64,
            total_teams: self.distinct(Table::Teams, "team_id")?,
            total_players: self.distinct(Table::Players, "player_id")?,
            last_ingested_at: self.last_ingested_at().await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::SelectorCatalog;
    use crate::parsers::details::{match_url, parse_match_details};

    const PAGE: &str = include_str!("../../tests/fixtures/match_page.html");

    fn record(id: &str) -> MatchRecord {
        let catalog = SelectorCatalog::embedded().unwrap();
        let base = "https://www.hltv.org";
        parse_match_details(PAGE, id, &match_url(base, id), &catalog, base)
    }

    fn lines(path: &Path) -> usize {
        fs::read_to_string(path).unwrap().lines().count()
    }

    #[tokio::test]
    async fn open_creates_every_table_with_headers() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CsvSink::open(dir.path()).unwrap();

        for (name, path) in sink.table_paths() {
            assert_eq!(lines(&path), 1, "{name}");
        }
        let header = fs::read_to_string(dir.path().join("maps.csv")).unwrap();
        assert!(header.starts_with("match_id,map_number,map_name,"));
        assert_eq!(sink.statistics().await.unwrap(), StorageStats::default());
    }

    #[tokio::test]
    async fn duplicate_match_is_rejected_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CsvSink::open(dir.path()).unwrap();

        assert!(sink.save(&record("2388127")).await.unwrap());
        assert!(sink.exists("2388127").await.unwrap());
        assert!(!sink.save(&record("2388127")).await.unwrap());

        assert_eq!(lines(&dir.path().join("matches.csv")), 2);
        assert_eq!(lines(&dir.path().join("maps.csv")), 4);
        assert_eq!(lines(&dir.path().join("player_stats.csv")), 4);
        assert_eq!(sink.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn reopening_keeps_known_ids_and_existing_rows() {
        let dir = tempfile::tempdir().unwrap();
        {
            let sink = CsvSink::open(dir.path()).unwrap();
            sink.save(&record("1")).await.unwrap();
            sink.save(&record("2")).await.unwrap();
        }

        let reopened = CsvSink::open(dir.path()).unwrap();
        assert_eq!(
            reopened.known_ids().await.unwrap(),
            ["1", "2"].into_iter().map(String::from).collect()
        );
        assert!(!reopened.save(&record("1")).await.unwrap());
        assert!(reopened.save(&record("3")).await.unwrap());
        assert_eq!(lines(&dir.path().join("matches.csv")), 4);

        let stats = reopened.statistics().await.unwrap();
        assert_eq!(stats.total_matches, 3);
        assert_eq!(stats.total_maps, 9);
        assert_eq!(stats.total_player_stats, 9);
        assert_eq!(stats.total_teams, 2);
        assert_eq!(stats.total_players, 3);
        assert!(stats.last_ingested_at.is_some());
    }

    #[tokio::test]
    async fn match_row_carries_outcome_columns() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CsvSink::open(dir.path()).unwrap();
        sink.save(&record("7")).await.unwrap();

        assert_eq!(sink.column(Table::Matches, "winner").unwrap(), vec!["team1"]);
        assert_eq!(sink.column(Table::Matches, "format_type").unwrap(), vec!["bo3"]);
        assert_eq!(sink.column(Table::Matches, "final_score").unwrap(), vec!["2-1"]);
        assert_eq!(sink.column(Table::Teams, "team_id").unwrap(), vec!["8297", "4494"]);
    }
}
