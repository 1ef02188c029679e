//! Level changes
//!
//! Setting a level moves the user to the start of that level: `xp` resets
//! to 0 and `totalXP` becomes the lifetime XP the level requires.

use super::events::Progress;
use super::record::UserRecord;
use super::users::UserManager;
use super::xp::progress;
use crate::error::StoreResult;

#[derive(Clone)]
pub struct LevelManager {
    users: UserManager,
}

impl LevelManager {
    pub fn new(users: UserManager) -> Self {
        Self { users }
    }

    pub fn get(&self, guild_id: &str, user_id: &str) -> StoreResult<Option<u64>> {
        Ok(self.users.get(guild_id, user_id)?.map(|record| record.level))
    }

    /// Levels below 1 are clamped to 1
    pub async fn set(&self, guild_id: &str, user_id: &str, level: u64) -> StoreResult<Progress> {
        let (previous, settings) = self.users.get_or_create(guild_id, user_id).await?;
        let current = UserRecord::at_level(level, settings.max_xp, previous.multiplier);
        self.users.save(guild_id, user_id, &current).await?;
        Ok(progress(guild_id, user_id, previous, current))
    }

    pub async fn add(&self, guild_id: &str, user_id: &str, levels: u64) -> StoreResult<Progress> {
        let current = self.level_or_first(guild_id, user_id)?;
        self.set(guild_id, user_id, current.saturating_add(levels)).await
    }

    pub async fn subtract(&self, guild_id: &str, user_id: &str, levels: u64) -> StoreResult<Progress> {
        let current = self.level_or_first(guild_id, user_id)?;
        self.set(guild_id, user_id, current.saturating_sub(levels).max(1)).await
    }

    fn level_or_first(&self, guild_id: &str, user_id: &str) -> StoreResult<u64> {
        Ok(self.get(guild_id, user_id)?.unwrap_or(1))
    }
}
