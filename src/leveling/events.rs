//! Leveling events
//!
//! Managers never emit events themselves. They return a [`Progress`]
//! (record before and after) and the [`super::Leveling`] façade turns it
//! into events and broadcasts them.

use serde::Serialize;

use super::ranks::Rank;
use super::record::UserRecord;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum LevelingEvent {
    #[serde(rename_all = "camelCase")]
    XpGained {
        guild_id: String,
        user_id: String,
        amount: u64,
        xp: u64,
        total_xp: u64,
    },
    #[serde(rename_all = "camelCase")]
    XpLost {
        guild_id: String,
        user_id: String,
        amount: u64,
        xp: u64,
        total_xp: u64,
    },
    #[serde(rename_all = "camelCase")]
    LevelUp {
        guild_id: String,
        user_id: String,
        previous_level: u64,
        level: u64,
    },
    #[serde(rename_all = "camelCase")]
    LevelDown {
        guild_id: String,
        user_id: String,
        previous_level: u64,
        level: u64,
    },
    #[serde(rename_all = "camelCase")]
    RankReached {
        guild_id: String,
        user_id: String,
        rank: Rank,
    },
}

/// A user's record before and after one manager call
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    pub guild_id: String,
    pub user_id: String,
    pub previous: UserRecord,
    pub current: UserRecord,
}

impl Progress {
    pub fn leveled_up(&self) -> bool {
        self.current.level > self.previous.level
    }

    /// XP and level events implied by this change
    pub fn events(&self) -> Vec<LevelingEvent> {
        let mut events = Vec::new();
        let (before, after) = (&self.previous, &self.current);

        if after.total_xp > before.total_xp {
            events.push(LevelingEvent::XpGained {
                guild_id: self.guild_id.clone(),
                user_id: self.user_id.clone(),
                amount: after.total_xp - before.total_xp,
                xp: after.xp,
                total_xp: after.total_xp,
            });
        } else if after.total_xp < before.total_xp {
            events.push(LevelingEvent::XpLost {
                guild_id: self.guild_id.clone(),
                user_id: self.user_id.clone(),
                amount: before.total_xp - after.total_xp,
                xp: after.xp,
                total_xp: after.total_xp,
            });
        }

        if after.level > before.level {
            events.push(LevelingEvent::LevelUp {
                guild_id: self.guild_id.clone(),
                user_id: self.user_id.clone(),
                previous_level: before.level,
                level: after.level,
            });
        } else if after.level < before.level {
            events.push(LevelingEvent::LevelDown {
                guild_id: self.guild_id.clone(),
                user_id: self.user_id.clone(),
                previous_level: before.level,
                level: after.level,
            });
        }

        events
    }
}
