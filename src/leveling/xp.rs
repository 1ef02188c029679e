//! XP inside the current level

use std::sync::Arc;

use super::events::Progress;
use super::record::{user_field_path, UserRecord};
use super::users::UserManager;
use crate::error::{StoreError, StoreResult};
use crate::storage::DataStore;

#[derive(Clone)]
pub struct XpManager {
    store: Arc<DataStore>,
    users: UserManager,
}

impl XpManager {
    pub fn new(store: Arc<DataStore>, users: UserManager) -> Self {
        Self { store, users }
    }

    /// XP inside the current level; `None` when the user has no record
    pub fn get(&self, guild_id: &str, user_id: &str) -> StoreResult<Option<u64>> {
        Ok(self.users.get(guild_id, user_id)?.map(|record| record.xp))
    }

    /// Give `amount` XP, rolling surplus over into new levels
    ///
    /// `xp` and `totalXP` are bumped with numeric adds; the full record is
    /// only rewritten when the level changes.
    pub async fn add(&self, guild_id: &str, user_id: &str, amount: u64) -> StoreResult<Progress> {
        let (mut record, settings) = self.users.get_or_create(guild_id, user_id).await?;
        let previous = record.clone();

        self.store
            .add(&user_field_path(guild_id, user_id, "xp")?, amount as f64)
            .await?;
        self.store
            .add(&user_field_path(guild_id, user_id, "totalXP")?, amount as f64)
            .await?;

        record.xp = record.xp.saturating_add(amount);
        record.total_xp = record.total_xp.saturating_add(amount);
        if record.normalize(settings.max_xp) > 0 {
            self.users.save(guild_id, user_id, &record).await?;
        } else {
            self.store
                .set(&user_field_path(guild_id, user_id, "difference")?, record.difference)
                .await?;
        }

        Ok(progress(guild_id, user_id, previous, record))
    }

    /// Take `amount` XP away, dropping levels once the current level is
    /// exhausted; never goes below zero lifetime XP
    pub async fn subtract(&self, guild_id: &str, user_id: &str, amount: u64) -> StoreResult<Progress> {
        let (record, settings) = self.users.get_or_create(guild_id, user_id).await?;
        let previous = record.clone();

        let current = if amount <= record.xp {
            let mut next = record;
            next.xp -= amount;
            next.total_xp = next.total_xp.saturating_sub(amount);
            next.difference = next.max_xp.saturating_sub(next.xp);
            next
        } else {
            UserRecord::from_total(
                record.total_xp.saturating_sub(amount),
                settings.max_xp,
                record.multiplier,
            )
        };
        self.users.save(guild_id, user_id, &current).await?;

        Ok(progress(guild_id, user_id, previous, current))
    }

    /// Set XP inside the current level; a value past `maxXP` levels up
    pub async fn set(&self, guild_id: &str, user_id: &str, xp: u64) -> StoreResult<Progress> {
        let (record, settings) = self.users.get_or_create(guild_id, user_id).await?;
        let previous = record.clone();

        let mut current = UserRecord::at_level(record.level, settings.max_xp, record.multiplier);
        current.xp = xp;
        current.total_xp = current.total_xp.saturating_add(xp);
        current.normalize(settings.max_xp);
        self.users.save(guild_id, user_id, &current).await?;

        Ok(progress(guild_id, user_id, previous, current))
    }

    /// Per-user XP multiplier applied on top of the guild's
    pub async fn set_multiplier(&self, guild_id: &str, user_id: &str, multiplier: f64) -> StoreResult<()> {
        let path = user_field_path(guild_id, user_id, "multiplier")?;
        if !multiplier.is_finite() || multiplier < 0.0 {
            return Err(StoreError::InvalidTargetType {
                operation: "set",
                path,
                expected: "non-negative number",
                found: "number",
            });
        }
        self.users.get_or_create(guild_id, user_id).await?;
        self.store.set(&path, multiplier).await?;
        Ok(())
    }
}

pub(crate) fn progress(guild_id: &str, user_id: &str, previous: UserRecord, current: UserRecord) -> Progress {
    Progress {
        guild_id: guild_id.to_string(),
        user_id: user_id.to_string(),
        previous,
        current,
    }
}
