use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::error::Result;
use crate::sink::{from_ns, now_ns, Sink, StorageStats};
use crate::types::MatchRecord;

struct Stored {
    record: MatchRecord,
    ingested_at_ns: i64,
}

/// Process-local sink for tests and dry runs.
#[derive(Default)]
pub struct MemorySink {
    matches: DashMap<String, Stored>,
}

impl MemorySink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn get(&self, match_id: &str) -> Option<MatchRecord> {
        self.matches.get(match_id).map(|s| s.record.clone())
    }
}

#[async_trait]
impl Sink for MemorySink {
    async fn exists(&self, match_id: &str) -> Result<bool> {
        Ok(self.matches.contains_key(match_id))
    }

    async fn save(&self, record: &MatchRecord) -> Result<bool> {
        match self.matches.entry(record.match_id.clone()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(Stored {
                    record: record.clone(),
                    ingested_at_ns: now_ns() as i64,
                });
                Ok(true)
            }
        }
    }

    async fn known_ids(&self) -> Result<HashSet<String>> {
        Ok(self.matches.iter().map(|e| e.key().clone()).collect())
    }

    async fn count(&self) -> Result<i64> {
        Ok(self.matches.len() as i64)
    }

    async fn last_ingested_at(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(self.matches.iter().map(|e| e.ingested_at_ns).max().map(from_ns))
    }

    async fn statistics(&self) -> Result<StorageStats> {
        let mut teams = HashSet::new();
        let mut players = HashSet::new();
        let mut total_maps = 0;
        let mut total_player_stats = 0;

        for entry in self.matches.iter() {
            let m = &entry.record;
            total_maps += m.maps.len() as i64;
            for team in [&m.team1, &m.team2] {
                teams.insert(team.team_id.clone().unwrap_or_else(|| team.name.clone()));
            }
            for stats in [&m.team1_stats, &m.team2_stats].into_iter().flatten() {
                total_player_stats += stats.players.len() as i64;
                for p in &stats.players {
                    players.insert(p.player_id.clone().unwrap_or_else(|| p.player_nick.clone()));
                }
            }
        }

        Ok(StorageStats {
            total_matches: self.matches.len() as i64,
            total_maps,
            total_player_stats,
            total_teams: teams.len() as i64,
            total_players: players.len() as i64,
            last_ingested_at: self.last_ingested_at().await?,
        })
    }
}
