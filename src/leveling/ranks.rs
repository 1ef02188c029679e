//! Level ranks stored as an array at `<guildId>.ranks`

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::record::ranks_path;
use crate::error::StoreResult;
use crate::storage::{DataStore, Mutation};

/// Role granted once a user reaches `level`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rank {
    pub level: u64,
    pub role_id: String,
}

#[derive(Clone)]
pub struct RanksManager {
    store: Arc<DataStore>,
}

impl RanksManager {
    pub fn new(store: Arc<DataStore>) -> Self {
        Self { store }
    }

    /// Ranks in stored order; entries that do not decode are skipped
    pub fn list(&self, guild_id: &str) -> StoreResult<Vec<Rank>> {
        let stored = self.store.get(&ranks_path(guild_id)?);
        let items = match stored {
            serde_json::Value::Array(items) => items,
            _ => return Ok(Vec::new()),
        };
        Ok(items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect())
    }

    pub async fn add(&self, guild_id: &str, rank: Rank) -> StoreResult<Mutation> {
        self.store.push(&ranks_path(guild_id)?, rank).await
    }

    /// Replace the rank at `index`
    pub async fn edit(&self, guild_id: &str, index: usize, rank: Rank) -> StoreResult<Mutation> {
        self.store.pull(&ranks_path(guild_id)?, index, rank).await
    }

    pub async fn remove(&self, guild_id: &str, index: usize) -> StoreResult<Mutation> {
        self.store.pop(&ranks_path(guild_id)?, index).await
    }

    /// Highest rank whose level is at most `level`
    pub fn rank_for_level(&self, guild_id: &str, level: u64) -> StoreResult<Option<Rank>> {
        Ok(self
            .list(guild_id)?
            .into_iter()
            .filter(|rank| rank.level <= level)
            .max_by_key(|rank| rank.level))
    }

    /// Ranks crossed when moving from `previous_level` up to `level`
    pub fn reached_between(&self, guild_id: &str, previous_level: u64, level: u64) -> StoreResult<Vec<Rank>> {
        let mut reached: Vec<Rank> = self
            .list(guild_id)?
            .into_iter()
            .filter(|rank| rank.level > previous_level && rank.level <= level)
            .collect();
        reached.sort_by_key(|rank| rank.level);
        Ok(reached)
    }
}
