//! Persistence collaborator: the single writer of match records and the
//! source of truth for "already ingested".

pub mod csv_files;
pub mod memory;

use std::collections::HashSet;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;

use crate::error::Result;
use crate::types::MatchRecord;

pub use self::csv_files::CsvSink;
pub use self::memory::MemorySink;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StorageStats {
    pub total_matches: i64,
    pub total_maps: i64,
    pub total_player_stats: i64,
    pub total_teams: i64,
    pub total_players: i64,
    pub last_ingested_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait Sink: Send + Sync {
    async fn exists(&self, match_id: &str) -> Result<bool>;

    /// `false` when a record with the same `match_id` is already stored.
    async fn save(&self, record: &MatchRecord) -> Result<bool>;

    /// Number of records newly stored.
    async fn save_batch(&self, records: &[MatchRecord]) -> Result<usize> {
        let mut saved = 0;
        for record in records {
            if self.save(record).await? {
                saved += 1;
            }
        }
        Ok(saved)
    }

    async fn known_ids(&self) -> Result<HashSet<String>>;

    async fn count(&self) -> Result<i64>;

    async fn last_ingested_at(&self) -> Result<Option<DateTime<Utc>>>;

    async fn statistics(&self) -> Result<StorageStats>;
}

pub fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}

pub fn from_ns(ns: i64) -> DateTime<Utc> {
    Utc.timestamp_nanos(ns)
}
