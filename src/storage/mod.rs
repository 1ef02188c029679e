//! Storage Layer - cache-backed, path-addressed document store
//!
//! ## Architecture
//! ```text
//! [Domain managers]
//!       ↓  "<guild>.<user>.<field>"
//! [DataStore] ── reads ──▶ [CacheStore]  (one entry per top-level key)
//!       ↓ writes (cache first, then backend)
//! [StorageBackend]
//! ┌──────────────┬──────────────┬────────────────┐
//! │ JsonFile     │ Lmdb         │ Postgres       │
//! │ (one file)   │ (embedded)   │ (JSONB rows)   │
//! └──────────────┴──────────────┴────────────────┘
//! ```
//!
//! ## Usage
//! ```rust,ignore
//! let config = Config::from_env()?;
//! let store = DataStore::open(&config).await?;
//!
//! store.set("guildA.user1.xp", 10).await?;
//! store.add("guildA.user1.xp", 5.0).await?;
//! assert_eq!(store.get("guildA.user1.xp"), json!(15));
//! ```

pub mod backend;
pub mod cache;
pub mod data_store;
pub mod json_file;
pub mod lmdb;
pub mod migrations;
pub mod path;
pub mod postgres;

use std::sync::Arc;
use tracing::info;

use self::backend::StorageBackend;
use self::json_file::JsonFileBackend;
use self::lmdb::LmdbBackend;
use self::postgres::PostgresBackend;
use crate::config::DatabaseConfig;
use crate::error::StoreResult;

pub use self::data_store::{DataStore, Mutation, StoreState, StoreStats};

/// Open the backend selected by `config`
///
/// Called once per process per medium. For the JSON file backend with a
/// check interval, the integrity-check task is started here.
pub async fn open_backend(config: &DatabaseConfig) -> StoreResult<Arc<dyn StorageBackend>> {
    let backend: Arc<dyn StorageBackend> = match config {
        DatabaseConfig::JsonFile {
            path,
            minify,
            check_interval,
        } => {
            let backend = Arc::new(JsonFileBackend::open(path, *minify).await?);
            if let Some(interval) = check_interval {
                backend.spawn_integrity_check(*interval);
                info!("JSON store integrity check every {:?}", interval);
            }
            backend
        }
        DatabaseConfig::Lmdb { path, max_size } => Arc::new(LmdbBackend::open(path, *max_size)?),
        DatabaseConfig::Postgres {
            url,
            max_connections,
            table,
        } => Arc::new(PostgresBackend::connect(url, *max_connections, table).await?),
    };

    info!("Storage backend ready: {}", backend.name());
    Ok(backend)
}
