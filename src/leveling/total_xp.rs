//! Lifetime XP; level and in-level XP are derived from it

use super::events::Progress;
use super::record::UserRecord;
use super::users::UserManager;
use super::xp::progress;
use crate::error::StoreResult;

#[derive(Clone)]
pub struct TotalXpManager {
    users: UserManager,
}

impl TotalXpManager {
    pub fn new(users: UserManager) -> Self {
        Self { users }
    }

    pub fn get(&self, guild_id: &str, user_id: &str) -> StoreResult<Option<u64>> {
        Ok(self.users.get(guild_id, user_id)?.map(|record| record.total_xp))
    }

    pub async fn set(&self, guild_id: &str, user_id: &str, total_xp: u64) -> StoreResult<Progress> {
        let (previous, settings) = self.users.get_or_create(guild_id, user_id).await?;
        let current = UserRecord::from_total(total_xp, settings.max_xp, previous.multiplier);
        self.users.save(guild_id, user_id, &current).await?;
        Ok(progress(guild_id, user_id, previous, current))
    }

    pub async fn add(&self, guild_id: &str, user_id: &str, amount: u64) -> StoreResult<Progress> {
        let total = self.get(guild_id, user_id)?.unwrap_or(0);
        self.set(guild_id, user_id, total.saturating_add(amount)).await
    }

    pub async fn subtract(&self, guild_id: &str, user_id: &str, amount: u64) -> StoreResult<Progress> {
        let total = self.get(guild_id, user_id)?.unwrap_or(0);
        self.set(guild_id, user_id, total.saturating_sub(amount)).await
    }
}
