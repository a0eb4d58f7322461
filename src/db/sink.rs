use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::db::models::{MatchRow, StatsRow};
use crate::error::Result;
use crate::sink::{from_ns, now_ns, Sink, StorageStats};
use crate::types::{MatchRecord, PlayerMatchStat, Side, TeamMatchStats, TeamRef};

/// SQLite-backed sink. Each save is one transaction; the `matches` primary
/// key is the dedup point.
#[derive(Clone)]
pub struct SqliteSink {
    pool: SqlitePool,
}

impl SqliteSink {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, match_id: &str) -> Result<Option<MatchRow>> {
        let row = sqlx::query_as::<_, MatchRow>(
            r#"
            SELECT match_id, match_url, team1_score, team2_score, event_name,
                   format, winner, final_score, ingested_at
            FROM matches
            WHERE match_id = ?
            "#,
        )
        .bind(match_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }
}

fn team_key(team_id: Option<&str>, name: &str) -> String {
    match team_id {
        Some(id) => id.to_string(),
        None => format!("name:{name}"),
    }
}

fn player_key(p: &PlayerMatchStat) -> String {
    match &p.player_id {
        Some(id) => id.clone(),
        None => format!("nick:{}", p.player_nick),
    }
}

async fn upsert_team(
    conn: &mut SqliteConnection,
    team_id: Option<&str>,
    name: &str,
    logo_url: Option<&str>,
    now: i64,
) -> Result<String> {
    let key = team_key(team_id, name);
    sqlx::query(
        r#"
        INSERT INTO teams (team_key, team_id, name, logo_url, updated_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(team_key) DO UPDATE SET
            name = excluded.name,
            logo_url = COALESCE(excluded.logo_url, teams.logo_url),
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&key)
    .bind(team_id)
    .bind(name)
    .bind(logo_url)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(key)
}

async fn upsert_header_team(conn: &mut SqliteConnection, team: &TeamRef, now: i64) -> Result<String> {
    upsert_team(conn, team.team_id.as_deref(), &team.name, team.logo_url.as_deref(), now).await
}

async fn insert_team_stats(
    conn: &mut SqliteConnection,
    match_id: &str,
    stats: &TeamMatchStats,
    side: Side,
    now: i64,
) -> Result<()> {
    upsert_team(
        conn,
        stats.team_id.as_deref(),
        &stats.team_name,
        stats.team_logo_url.as_deref(),
        now,
    )
    .await?;

    for p in &stats.players {
        let key = player_key(p);
        sqlx::query(
            r#"
            INSERT INTO players (player_key, player_id, nick, name, country, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(player_key) DO UPDATE SET
                nick = excluded.nick,
                name = COALESCE(excluded.name, players.name),
                country = COALESCE(excluded.country, players.country),
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&key)
        .bind(&p.player_id)
        .bind(&p.player_nick)
        .bind(&p.player_name)
        .bind(&p.country)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO player_stats (
                match_id, player_key, team_id, kills, deaths, kd_diff, adr, kast, rating, swing
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(match_id)
        .bind(&key)
        .bind(&p.team_id)
        .bind(p.kills)
        .bind(p.deaths)
        .bind(p.kd_diff)
        .bind(p.adr)
        .bind(p.kast)
        .bind(p.rating)
        .bind(p.swing)
        .execute(&mut *conn)
        .await?;

        sqlx::query("INSERT OR IGNORE INTO match_players (match_id, player_key, side) VALUES (?, ?, ?)")
            .bind(match_id)
            .bind(&key)
            .bind(side.to_string())
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

#[async_trait]
impl Sink for SqliteSink {
    async fn exists(&self, match_id: &str) -> Result<bool> {
        let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM matches WHERE match_id = ?")
            .bind(match_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }

    async fn save(&self, record: &MatchRecord) -> Result<bool> {
        let now = now_ns() as i64;
        let mut tx = self.pool.begin().await?;

        let team1_key = upsert_header_team(&mut tx, &record.team1, now).await?;
        let team2_key = upsert_header_team(&mut tx, &record.team2, now).await?;

        let inserted = sqlx::query(
            r#"
            INSERT OR IGNORE INTO matches (
                match_id, match_url, team1_key, team2_key, team1_score, team2_score,
                event_id, event_name, event_url, date, time_unix,
                raw_format, format, winner, final_score, ingested_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.match_id)
        .bind(&record.match_url)
        .bind(&team1_key)
        .bind(&team2_key)
        .bind(record.team1.score)
        .bind(record.team2.score)
        .bind(&record.event.event_id)
        .bind(&record.event.name)
        .bind(&record.event.url)
        .bind(&record.date)
        .bind(record.time_unix)
        .bind(&record.raw_format)
        .bind(record.format.map(|f| f.to_string()))
        .bind(record.winner.map(|w| w.to_string()))
        .bind(&record.final_score)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted == 0 {
            tx.rollback().await?;
            debug!(match_id = %record.match_id, "[SINK] duplicate match ignored");
            return Ok(false);
        }

        for map in &record.maps {
            sqlx::query(
                r#"
                INSERT INTO maps (
                    match_id, map_number, map_name, team1_score, team2_score,
                    team1_ct_score, team1_t_score, team2_ct_score, team2_t_score, winner
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&record.match_id)
            .bind(i64::from(map.map_number))
            .bind(&map.map_name)
            .bind(map.team1_score)
            .bind(map.team2_score)
            .bind(map.team1_ct_score)
            .bind(map.team1_t_score)
            .bind(map.team2_ct_score)
            .bind(map.team2_t_score)
            .bind(map.winner.map(|w| w.to_string()))
            .execute(&mut *tx)
            .await?;
        }

        if let Some(stats) = &record.team1_stats {
            insert_team_stats(&mut tx, &record.match_id, stats, Side::Team1, now).await?;
        }
        if let Some(stats) = &record.team2_stats {
            insert_team_stats(&mut tx, &record.match_id, stats, Side::Team2, now).await?;
        }

        tx.commit().await?;
        debug!(match_id = %record.match_id, maps = record.maps.len(), "[SINK] match stored");
        Ok(true)
    }

    async fn known_ids(&self) -> Result<HashSet<String>> {
        let ids: Vec<String> = sqlx::query_scalar("SELECT match_id FROM matches")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids.into_iter().collect())
    }

    async fn count(&self) -> Result<i64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM matches")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    async fn last_ingested_at(&self) -> Result<Option<DateTime<Utc>>> {
        let ns: Option<i64> = sqlx::query_scalar("SELECT MAX(ingested_at) FROM matches")
            .fetch_one(&self.pool)
            .await?;
        Ok(ns.map(from_ns))
    }

    async fn statistics(&self) -> Result<StorageStats> {
        let row = sqlx::query_as::<_, StatsRow>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM matches)      AS total_matches,
                (SELECT COUNT(*) FROM maps)         AS total_maps,
                (SELECT COUNT(*) FROM player_stats) AS total_player_stats,
                (SELECT COUNT(*) FROM teams)        AS total_teams,
                (SELECT COUNT(*) FROM players)      AS total_players,
                (SELECT MAX(ingested_at) FROM matches) AS last_ingested_at
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(StorageStats {
            total_matches: row.total_matches,
            total_maps: row.total_maps,
            total_player_stats: row.total_player_stats,
            total_teams: row.total_teams,
            total_players: row.total_players,
            last_ingested_at: row.last_ingested_at.map(from_ns),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_pool;
    use crate::extract::SelectorCatalog;
    use crate::parsers::details::{match_url, parse_match_details};

    const PAGE: &str = include_str!("../../tests/fixtures/match_page.html");

    fn record(id: &str) -> MatchRecord {
        let catalog = SelectorCatalog::embedded().unwrap();
        let base = "https://www.hltv.org";
        parse_match_details(PAGE, id, &match_url(base, id), &catalog, base)
    }

    #[tokio::test]
    async fn duplicate_save_returns_false_and_leaves_one_copy() {
        let sink = SqliteSink::new(memory_pool().await);
        assert!(!sink.exists("2388127").await.unwrap());
        assert!(sink.save(&record("2388127")).await.unwrap());
        assert!(sink.exists("2388127").await.unwrap());
        assert!(!sink.save(&record("2388127")).await.unwrap());

        let stats = sink.statistics().await.unwrap();
        assert_eq!(stats.total_matches, 1);
        assert_eq!(stats.total_maps, 3);
        assert_eq!(stats.total_player_stats, 3);
    }

    #[tokio::test]
    async fn teams_and_players_are_upserted_across_matches() {
        let sink = SqliteSink::new(memory_pool().await);
        sink.save(&record("1")).await.unwrap();
        sink.save(&record("2")).await.unwrap();

        let stats = sink.statistics().await.unwrap();
        assert_eq!(stats.total_matches, 2);
        assert_eq!(stats.total_teams, 2);
        assert_eq!(stats.total_players, 3);
        assert_eq!(stats.total_player_stats, 6);
        assert!(stats.last_ingested_at.is_some());

        assert_eq!(sink.count().await.unwrap(), 2);
        assert_eq!(sink.known_ids().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn stored_row_keeps_outcome_fields() {
        let sink = SqliteSink::new(memory_pool().await);
        sink.save(&record("7")).await.unwrap();
        let row = sink.get("7").await.unwrap().expect("row");
        assert_eq!(row.winner.as_deref(), Some("team1"));
        assert_eq!(row.format.as_deref(), Some("bo3"));
        assert_eq!(row.final_score.as_deref(), Some("2-1"));
        assert_eq!((row.team1_score, row.team2_score), (Some(2), Some(1)));
        assert!(sink.get("8").await.unwrap().is_none());
    }
}
