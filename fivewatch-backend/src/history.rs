//! Cumulative per-player online time.
//!
//! Every observation credits the time elapsed since the player's previous
//! observation, however long ago that was. There is no notion of a session.

use fivewatch_db::{Database, DbError, HistoryEntry, PlayerRecord};
use std::collections::HashMap;

/// In-memory history table in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayerHistory {
    entries: Vec<HistoryEntry>,
    index: HashMap<String, usize>,
}

impl PlayerHistory {
    pub fn from_entries(entries: Vec<HistoryEntry>) -> Self {
        let index = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.name.clone(), i))
            .collect();
        Self { entries, index }
    }

    /// A copy of this table with every name in `players` observed at `now`.
    ///
    /// A name repeated within one observation is credited once.
    pub fn observe<'a>(&self, players: impl IntoIterator<Item = &'a str>, now: i64) -> Self {
        let mut next = self.clone();
        for name in players {
            match next.index.get(name) {
                Some(&i) => {
                    let entry = &mut next.entries[i];
                    entry.record = entry.record.observed(now);
                }
                None => {
                    next.index.insert(name.to_string(), next.entries.len());
                    next.entries.push(HistoryEntry {
                        name: name.to_string(),
                        record: PlayerRecord::first_seen(now),
                    });
                }
            }
        }
        next
    }

    /// Players with the most online time, most first. Ties keep first-seen order.
    pub fn top_n(&self, n: usize) -> Vec<(&str, i64)> {
        let mut ranked: Vec<&HistoryEntry> = self.entries.iter().collect();
        ranked.sort_by(|a, b| b.record.total_online_ms.cmp(&a.record.total_online_ms));
        ranked
            .into_iter()
            .take(n)
            .map(|e| (e.name.as_str(), e.record.total_online_ms))
            .collect()
    }

    pub fn lookup(&self, name: &str) -> Option<PlayerRecord> {
        self.index.get(name).map(|&i| self.entries[i].record)
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// History table backed by the database.
///
/// The in-memory table only advances once the full table has been written.
pub struct HistoryStore {
    db: Database,
    table: PlayerHistory,
}

impl HistoryStore {
    pub async fn load(db: Database) -> Result<Self, DbError> {
        let table = PlayerHistory::from_entries(db.load_player_history().await?);
        tracing::debug!(players = table.len(), "loaded player history");
        Ok(Self { db, table })
    }

    pub async fn record_observation<'a>(
        &mut self,
        players: impl IntoIterator<Item = &'a str>,
        now: i64,
    ) -> Result<(), DbError> {
        let next = self.table.observe(players, now);
        self.db.save_player_history(next.entries().to_vec()).await?;
        self.table = next;
        Ok(())
    }

    pub fn top_n(&self, n: usize) -> Vec<(&str, i64)> {
        self.table.top_n(n)
    }

    pub fn lookup(&self, name: &str) -> Option<PlayerRecord> {
        self.table.lookup(name)
    }

    pub fn table(&self) -> &PlayerHistory {
        &self.table
    }
}
