//! User records and key paths
//!
//! Layout inside the document:
//! ```text
//! <guildId>.<userId>          → UserRecord
//! <guildId>.settings.<field>  → guild settings
//! <guildId>.ranks             → [Rank, ...]
//! ```
//!
//! Level policy is linear: level `n` needs `n * base` XP to complete,
//! where `base` is the guild's `maxXP` setting.

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

pub const SETTINGS_KEY: &str = "settings";
pub const RANKS_KEY: &str = "ranks";

/// Per-user leveling state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    #[serde(default)]
    pub xp: u64,
    #[serde(rename = "totalXP", default)]
    pub total_xp: u64,
    #[serde(default = "first_level")]
    pub level: u64,
    #[serde(rename = "maxXP", default)]
    pub max_xp: u64,
    #[serde(default)]
    pub difference: u64,
    #[serde(default = "unit_multiplier")]
    pub multiplier: f64,
}

fn first_level() -> u64 {
    1
}

fn unit_multiplier() -> f64 {
    1.0
}

impl UserRecord {
    /// Fresh level-1 record
    pub fn new(base: u64, multiplier: f64) -> Self {
        Self::at_level(1, base, multiplier)
    }

    /// Record sitting at the start of `level`
    pub fn at_level(level: u64, base: u64, multiplier: f64) -> Self {
        let level = level.max(1);
        let max_xp = max_xp_for(level, base);
        Self {
            xp: 0,
            total_xp: total_for_level(level, base),
            level,
            max_xp,
            difference: max_xp,
            multiplier,
        }
    }

    /// Record derived from a lifetime XP total
    pub fn from_total(total_xp: u64, base: u64, multiplier: f64) -> Self {
        let mut record = Self::new(base, multiplier);
        record.xp = total_xp;
        record.normalize(base);
        record.total_xp = total_xp;
        record
    }

    /// Roll surplus XP into levels and refresh `maxXP`/`difference`
    ///
    /// Returns the number of levels gained.
    pub fn normalize(&mut self, base: u64) -> u64 {
        let start = self.level.max(1);
        self.level = start;
        self.max_xp = max_xp_for(self.level, base);
        while self.xp >= self.max_xp {
            self.xp -= self.max_xp;
            self.level += 1;
            self.max_xp = max_xp_for(self.level, base);
        }
        self.difference = self.max_xp - self.xp;
        self.level - start
    }
}

/// XP needed to complete `level`
pub fn max_xp_for(level: u64, base: u64) -> u64 {
    level.max(1).saturating_mul(base.max(1))
}

/// Lifetime XP at the start of `level`
pub fn total_for_level(level: u64, base: u64) -> u64 {
    let level = level.max(1);
    base.max(1)
        .saturating_mul(level - 1)
        .saturating_mul(level)
        / 2
}

// ============================================================================
// Key paths
// ============================================================================

/// Reject ids that would break or collide with the key layout
pub fn validate_id(kind: &'static str, id: &str) -> StoreResult<()> {
    if id.is_empty() || id.contains('.') {
        return Err(StoreError::InvalidPath(format!("{} id '{}'", kind, id)));
    }
    Ok(())
}

fn validate_user(guild_id: &str, user_id: &str) -> StoreResult<()> {
    validate_id("guild", guild_id)?;
    validate_id("user", user_id)?;
    if is_reserved(user_id) {
        return Err(StoreError::InvalidPath(format!("user id '{}' is reserved", user_id)));
    }
    Ok(())
}

pub fn is_reserved(key: &str) -> bool {
    key == SETTINGS_KEY || key == RANKS_KEY
}

pub fn user_path(guild_id: &str, user_id: &str) -> StoreResult<String> {
    validate_user(guild_id, user_id)?;
    Ok(format!("{}.{}", guild_id, user_id))
}

pub fn user_field_path(guild_id: &str, user_id: &str, field: &str) -> StoreResult<String> {
    validate_user(guild_id, user_id)?;
    Ok(format!("{}.{}.{}", guild_id, user_id, field))
}

pub fn settings_path(guild_id: &str) -> StoreResult<String> {
    validate_id("guild", guild_id)?;
    Ok(format!("{}.{}", guild_id, SETTINGS_KEY))
}

pub fn settings_field_path(guild_id: &str, field: &str) -> StoreResult<String> {
    validate_id("guild", guild_id)?;
    Ok(format!("{}.{}.{}", guild_id, SETTINGS_KEY, field))
}

pub fn ranks_path(guild_id: &str) -> StoreResult<String> {
    validate_id("guild", guild_id)?;
    Ok(format!("{}.{}", guild_id, RANKS_KEY))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_linear_policy() {
        assert_eq!(max_xp_for(1, 300), 300);
        assert_eq!(max_xp_for(4, 300), 1200);
        assert_eq!(total_for_level(1, 300), 0);
        assert_eq!(total_for_level(3, 300), 900);
    }

    #[test]
    fn test_normalize_rolls_over_levels() {
        let mut record = UserRecord::new(100, 1.0);
        record.xp = 350;
        let gained = record.normalize(100);
        // 100 for level 1, 200 for level 2, 50 left in level 3
        assert_eq!(gained, 2);
        assert_eq!(record.level, 3);
        assert_eq!(record.xp, 50);
        assert_eq!(record.max_xp, 300);
        assert_eq!(record.difference, 250);
    }

    #[test]
    fn test_from_total_matches_at_level() {
        let record = UserRecord::from_total(total_for_level(5, 300), 300, 1.0);
        assert_eq!(record, UserRecord::at_level(5, 300, 1.0));
    }

    #[test]
    fn test_serialized_field_names() {
        let record = UserRecord::new(300, 1.0);
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(
            value,
            json!({"xp": 0, "totalXP": 0, "level": 1, "maxXP": 300, "difference": 300, "multiplier": 1.0})
        );

        let partial: UserRecord = serde_json::from_value(json!({"xp": 3})).unwrap();
        assert_eq!(partial.level, 1);
        assert_eq!(partial.multiplier, 1.0);
    }

    #[test]
    fn test_paths_reject_bad_ids() {
        assert_eq!(user_path("g1", "u1").unwrap(), "g1.u1");
        assert_eq!(user_field_path("g1", "u1", "xp").unwrap(), "g1.u1.xp");
        assert_eq!(settings_field_path("g1", "xp").unwrap(), "g1.settings.xp");
        assert!(user_path("g.1", "u1").is_err());
        assert!(user_path("g1", "").is_err());
        assert!(user_path("g1", "settings").is_err());
        assert!(ranks_path("").is_err());
    }
}
