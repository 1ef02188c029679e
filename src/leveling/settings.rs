//! Guild settings stored at `<guildId>.settings.<field>`
//!
//! Fields that were never set fall back to the configured
//! [`LevelingOptions`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use super::record::{settings_field_path, settings_path};
use crate::config::LevelingOptions;
use crate::error::{StoreError, StoreResult};
use crate::storage::{DataStore, Mutation};

/// Effective settings of one guild
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuildSettings {
    pub xp: u64,
    #[serde(rename = "maxXP")]
    pub max_xp: u64,
    pub multiplier: f64,
    /// Leveling enabled for the guild
    pub status: bool,
    pub ignored_users: Vec<String>,
    pub ignored_channels: Vec<String>,
}

impl GuildSettings {
    pub fn from_options(options: &LevelingOptions) -> Self {
        Self {
            xp: options.xp,
            max_xp: options.max_xp,
            multiplier: options.multiplier,
            status: true,
            ignored_users: Vec::new(),
            ignored_channels: Vec::new(),
        }
    }
}

/// Settable fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKey {
    Xp,
    MaxXp,
    Multiplier,
    Status,
    IgnoredUsers,
    IgnoredChannels,
}

impl SettingKey {
    pub const ALL: [SettingKey; 6] = [
        SettingKey::Xp,
        SettingKey::MaxXp,
        SettingKey::Multiplier,
        SettingKey::Status,
        SettingKey::IgnoredUsers,
        SettingKey::IgnoredChannels,
    ];

    /// Field name inside the settings object
    pub fn as_str(&self) -> &'static str {
        match self {
            SettingKey::Xp => "xp",
            SettingKey::MaxXp => "maxXP",
            SettingKey::Multiplier => "multiplier",
            SettingKey::Status => "status",
            SettingKey::IgnoredUsers => "ignoredUsers",
            SettingKey::IgnoredChannels => "ignoredChannels",
        }
    }

    /// Whether `value` has the JSON shape this field stores
    fn accepts(&self, value: &Value) -> bool {
        match self {
            SettingKey::Xp | SettingKey::MaxXp => value.as_u64().is_some(),
            SettingKey::Multiplier => value.as_f64().is_some_and(|m| m.is_finite() && m >= 0.0),
            SettingKey::Status => value.is_boolean(),
            SettingKey::IgnoredUsers | SettingKey::IgnoredChannels => value
                .as_array()
                .is_some_and(|items| items.iter().all(Value::is_string)),
        }
    }

    fn expected(&self) -> &'static str {
        match self {
            SettingKey::Xp | SettingKey::MaxXp => "non-negative integer",
            SettingKey::Multiplier => "non-negative number",
            SettingKey::Status => "boolean",
            SettingKey::IgnoredUsers | SettingKey::IgnoredChannels => "array of strings",
        }
    }
}

impl std::str::FromStr for SettingKey {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SettingKey::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| StoreError::InvalidPath(format!("unknown setting '{}'", s)))
    }
}

/// Reads and writes guild settings
#[derive(Clone)]
pub struct SettingsManager {
    store: Arc<DataStore>,
    defaults: LevelingOptions,
}

impl SettingsManager {
    pub fn new(store: Arc<DataStore>, defaults: LevelingOptions) -> Self {
        Self { store, defaults }
    }

    /// Effective settings: stored fields over configured defaults
    ///
    /// Stored fields with the wrong shape are ignored.
    pub fn get(&self, guild_id: &str) -> StoreResult<GuildSettings> {
        let stored = self.store.get(&settings_path(guild_id)?);
        let mut merged = serde_json::to_value(GuildSettings::from_options(&self.defaults))?;

        if let (Value::Object(stored), Value::Object(target)) = (stored, &mut merged) {
            for key in SettingKey::ALL {
                if let Some(value) = stored.get(key.as_str()).filter(|v| key.accepts(v)) {
                    target.insert(key.as_str().to_string(), value.clone());
                }
            }
        }
        Ok(serde_json::from_value(merged)?)
    }

    /// Raw stored settings object (`Null` when nothing was ever set)
    pub fn all(&self, guild_id: &str) -> StoreResult<Value> {
        Ok(self.store.get(&settings_path(guild_id)?))
    }

    /// Raw stored value of one field (`Null` when unset)
    pub fn get_field(&self, guild_id: &str, key: SettingKey) -> StoreResult<Value> {
        Ok(self.store.get(&settings_field_path(guild_id, key.as_str())?))
    }

    pub async fn set<T: Serialize>(&self, guild_id: &str, key: SettingKey, value: T) -> StoreResult<Mutation> {
        let path = settings_field_path(guild_id, key.as_str())?;
        let value = serde_json::to_value(value)?;
        if !key.accepts(&value) {
            return Err(StoreError::InvalidTargetType {
                operation: "set",
                path,
                expected: key.expected(),
                found: crate::storage::path::type_name(Some(&value)),
            });
        }
        self.store.set(&path, value).await
    }

    /// Drop one stored field so the default applies again
    pub async fn reset(&self, guild_id: &str, key: SettingKey) -> StoreResult<Mutation> {
        self.store.delete(&settings_field_path(guild_id, key.as_str())?).await
    }

    /// Drop every stored field of the guild
    pub async fn reset_all(&self, guild_id: &str) -> StoreResult<Mutation> {
        self.store.delete(&settings_path(guild_id)?).await
    }

    pub async fn ignore_user(&self, guild_id: &str, user_id: &str) -> StoreResult<bool> {
        self.add_to_list(guild_id, SettingKey::IgnoredUsers, user_id).await
    }

    pub async fn unignore_user(&self, guild_id: &str, user_id: &str) -> StoreResult<bool> {
        self.remove_from_list(guild_id, SettingKey::IgnoredUsers, user_id).await
    }

    pub async fn ignore_channel(&self, guild_id: &str, channel_id: &str) -> StoreResult<bool> {
        self.add_to_list(guild_id, SettingKey::IgnoredChannels, channel_id).await
    }

    pub async fn unignore_channel(&self, guild_id: &str, channel_id: &str) -> StoreResult<bool> {
        self.remove_from_list(guild_id, SettingKey::IgnoredChannels, channel_id).await
    }

    /// Returns false when the id was already listed
    async fn add_to_list(&self, guild_id: &str, key: SettingKey, id: &str) -> StoreResult<bool> {
        if self.list(guild_id, key)?.iter().any(|existing| existing == id) {
            return Ok(false);
        }
        self.store
            .push(&settings_field_path(guild_id, key.as_str())?, id)
            .await?;
        Ok(true)
    }

    /// Returns false when the id was not listed
    async fn remove_from_list(&self, guild_id: &str, key: SettingKey, id: &str) -> StoreResult<bool> {
        let Some(index) = self.list(guild_id, key)?.iter().position(|existing| existing == id) else {
            return Ok(false);
        };
        self.store
            .pop(&settings_field_path(guild_id, key.as_str())?, index)
            .await?;
        Ok(true)
    }

    fn list(&self, guild_id: &str, key: SettingKey) -> StoreResult<Vec<String>> {
        Ok(self
            .store
            .get_as::<Vec<String>>(&settings_field_path(guild_id, key.as_str())?)
            .unwrap_or_default()
            .unwrap_or_default())
    }
}
