//! Configuration - resolved once at startup
//!
//! Values come from environment variables with the same
//! default-then-parse pattern everywhere. Everything is validated before
//! any store operation is attempted.
//!
//! | Variable | Default |
//! |---|---|
//! | `LEVELING_DEBUG` | `false` |
//! | `LEVELING_DATABASE` | `json` (`json`, `lmdb`, `postgres`) |
//! | `LEVELING_JSON_PATH` | `data/leveling.json` |
//! | `LEVELING_JSON_MINIFY` | `false` |
//! | `LEVELING_CHECK_INTERVAL_SECS` | `0` (disabled) |
//! | `LMDB_PATH` | `data/leveling` |
//! | `LMDB_MAX_SIZE` | `100000000` (rounded up to 4096) |
//! | `DATABASE_URL` | required for `postgres` |
//! | `PG_MAX_CONNECTIONS` | `10` |
//! | `LEVELING_PG_TABLE` | `leveling_documents` |
//! | `LEVELING_XP` | `5` |
//! | `LEVELING_MAX_XP` | `300` |
//! | `LEVELING_MULTIPLIER` | `1` |

use serde::Deserialize;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::storage::postgres::DEFAULT_TABLE;

/// LMDB requires map size to be a multiple of the OS page size
const PAGE_SIZE: usize = 4096;

/// Fully resolved configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Log every store operation
    #[serde(default)]
    pub debug: bool,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub leveling: LevelingOptions,
}

/// Which backend to use and how to reach it
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DatabaseConfig {
    #[serde(rename = "json")]
    JsonFile {
        path: PathBuf,
        #[serde(default)]
        minify: bool,
        /// Interval of the file integrity check; `None` disables it
        #[serde(default, with = "optional_secs")]
        check_interval: Option<Duration>,
    },
    Lmdb {
        path: PathBuf,
        max_size: usize,
    },
    Postgres {
        url: String,
        max_connections: u32,
        #[serde(default = "default_table")]
        table: String,
    },
}

/// Defaults for guilds that have no settings stored
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LevelingOptions {
    /// XP granted per message before the multiplier
    pub xp: u64,
    /// XP needed to leave level 1; level `n` needs `n * max_xp`
    pub max_xp: u64,
    pub multiplier: f64,
}

impl Default for LevelingOptions {
    fn default() -> Self {
        Self {
            xp: 5,
            max_xp: 300,
            multiplier: 1.0,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig::JsonFile {
            path: PathBuf::from("data/leveling.json"),
            minify: false,
            check_interval: None,
        }
    }
}

fn default_table() -> String {
    DEFAULT_TABLE.to_string()
}

impl Config {
    /// Resolve configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolve configuration from any variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let debug = parse_or(&lookup, "LEVELING_DEBUG", false)?;

        let backend = lookup("LEVELING_DATABASE").unwrap_or_else(|| "json".to_string());
        let database = match backend.trim().to_ascii_lowercase().as_str() {
            "json" => {
                let secs: u64 = parse_or(&lookup, "LEVELING_CHECK_INTERVAL_SECS", 0)?;
                DatabaseConfig::JsonFile {
                    path: lookup("LEVELING_JSON_PATH")
                        .map(PathBuf::from)
                        .unwrap_or_else(|| PathBuf::from("data/leveling.json")),
                    minify: parse_or(&lookup, "LEVELING_JSON_MINIFY", false)?,
                    check_interval: (secs > 0).then(|| Duration::from_secs(secs)),
                }
            }
            "lmdb" => {
                let raw: usize = parse_or(&lookup, "LMDB_MAX_SIZE", 100_000_000)?;
                DatabaseConfig::Lmdb {
                    path: lookup("LMDB_PATH")
                        .map(PathBuf::from)
                        .unwrap_or_else(|| PathBuf::from("data/leveling")),
                    max_size: round_to_page(raw),
                }
            }
            "postgres" | "postgresql" => DatabaseConfig::Postgres {
                url: lookup("DATABASE_URL")
                    .filter(|url| !url.trim().is_empty())
                    .ok_or(ConfigError::RequiredConfigOptionMissing("DATABASE_URL"))?,
                max_connections: parse_or(&lookup, "PG_MAX_CONNECTIONS", 10)?,
                table: lookup("LEVELING_PG_TABLE").unwrap_or_else(default_table),
            },
            _ => return Err(ConfigError::UnknownDatabase(backend)),
        };

        let defaults = LevelingOptions::default();
        let leveling = LevelingOptions {
            xp: parse_or(&lookup, "LEVELING_XP", defaults.xp)?,
            max_xp: parse_or(&lookup, "LEVELING_MAX_XP", defaults.max_xp)?,
            multiplier: parse_or(&lookup, "LEVELING_MULTIPLIER", defaults.multiplier)?,
        };

        let config = Self {
            debug,
            database,
            leveling,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check values that parse but make no sense
    pub fn validate(&self) -> Result<(), ConfigError> {
        match &self.database {
            DatabaseConfig::JsonFile { path, .. } | DatabaseConfig::Lmdb { path, .. }
                if path.as_os_str().is_empty() =>
            {
                return Err(ConfigError::RequiredConfigOptionMissing("path"));
            }
            DatabaseConfig::Lmdb { max_size, .. } if *max_size == 0 => {
                return Err(ConfigError::InvalidValue {
                    option: "LMDB_MAX_SIZE",
                    value: "0".to_string(),
                });
            }
            DatabaseConfig::Postgres { url, .. } if url.trim().is_empty() => {
                return Err(ConfigError::RequiredConfigOptionMissing("DATABASE_URL"));
            }
            DatabaseConfig::Postgres { max_connections, .. } if *max_connections == 0 => {
                return Err(ConfigError::InvalidValue {
                    option: "PG_MAX_CONNECTIONS",
                    value: "0".to_string(),
                });
            }
            _ => {}
        }

        if self.leveling.max_xp == 0 {
            return Err(ConfigError::InvalidValue {
                option: "LEVELING_MAX_XP",
                value: "0".to_string(),
            });
        }
        if !self.leveling.multiplier.is_finite() || self.leveling.multiplier < 0.0 {
            return Err(ConfigError::InvalidValue {
                option: "LEVELING_MULTIPLIER",
                value: self.leveling.multiplier.to_string(),
            });
        }
        Ok(())
    }
}

fn parse_or<F, T>(lookup: &F, option: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(option) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue { option, value: raw }),
    }
}

fn round_to_page(raw: usize) -> usize {
    raw.div_ceil(PAGE_SIZE) * PAGE_SIZE
}

mod optional_secs {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<u64>::deserialize(deserializer)?;
        Ok(secs.filter(|s| *s > 0).map(Duration::from_secs))
    }
}
