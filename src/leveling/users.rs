//! User records at `<guildId>.<userId>`

use serde_json::Value;
use std::sync::Arc;

use super::record::{is_reserved, user_path, validate_id, UserRecord};
use super::settings::{GuildSettings, SettingsManager};
use crate::error::StoreResult;
use crate::storage::{DataStore, Mutation};

#[derive(Clone)]
pub struct UserManager {
    store: Arc<DataStore>,
    settings: SettingsManager,
}

impl UserManager {
    pub fn new(store: Arc<DataStore>, settings: SettingsManager) -> Self {
        Self { store, settings }
    }

    pub fn get(&self, guild_id: &str, user_id: &str) -> StoreResult<Option<UserRecord>> {
        self.store.get_as(&user_path(guild_id, user_id)?)
    }

    pub fn exists(&self, guild_id: &str, user_id: &str) -> StoreResult<bool> {
        Ok(self.store.has(&user_path(guild_id, user_id)?))
    }

    /// Existing record, or a fresh level-1 record written to the store
    ///
    /// Also returns the guild's effective settings, which every caller
    /// needs for the level policy.
    pub async fn get_or_create(&self, guild_id: &str, user_id: &str) -> StoreResult<(UserRecord, GuildSettings)> {
        let settings = self.settings.get(guild_id)?;
        if let Some(record) = self.get(guild_id, user_id)? {
            return Ok((record, settings));
        }
        let record = UserRecord::new(settings.max_xp, 1.0);
        self.save(guild_id, user_id, &record).await?;
        Ok((record, settings))
    }

    pub async fn save(&self, guild_id: &str, user_id: &str, record: &UserRecord) -> StoreResult<Mutation> {
        self.store.set(&user_path(guild_id, user_id)?, record).await
    }

    /// Remove the user's record entirely
    pub async fn reset(&self, guild_id: &str, user_id: &str) -> StoreResult<Mutation> {
        self.store.delete(&user_path(guild_id, user_id)?).await
    }

    /// Every user record of a guild, skipping reserved keys and entries
    /// that are not user records
    pub fn list(&self, guild_id: &str) -> StoreResult<Vec<(String, UserRecord)>> {
        validate_id("guild", guild_id)?;
        let Value::Object(entries) = self.store.get(guild_id) else {
            return Ok(Vec::new());
        };
        Ok(entries
            .into_iter()
            .filter(|(key, value)| !is_reserved(key) && value.is_object())
            .filter_map(|(key, value)| {
                serde_json::from_value::<UserRecord>(value)
                    .ok()
                    .map(|record| (key, record))
            })
            .collect())
    }
}
