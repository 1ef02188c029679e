//! LMDB Document Store - embedded key-value backend
//!
//! One LMDB entry per top-level key (guild id); the value is that key's
//! whole subtree encoded as JSON bytes. Nested paths are resolved inside
//! the decoded subtree, so a write touches exactly one entry.
//!
//! `fetch_everything` folds every stored key back into one nested
//! document, splitting keys on `.` the same way a path `set` would. Keys
//! that already contain dots (written by older layouts) fold into the
//! same shape.
//!
//! ## Notes
//! - LMDB must not be opened twice in one process for the same directory;
//!   open the backend once and share it
//! - Map size must be a multiple of the OS page size (4096)

use async_trait::async_trait;
use heed::types::{Bytes, Str};
use heed::{Database, Env, EnvOpenOptions, RoTxn};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use super::backend::{Mutator, StorageBackend};
use super::path;
use crate::error::{DatabaseError, StoreError, StoreResult};

const DATABASE_NAME: &str = "documents";

/// LMDB-backed document store
pub struct LmdbBackend {
    env: Arc<Env>,
    /// Top-level key → JSON-encoded subtree
    db: Database<Str, Bytes>,
    path: PathBuf,
}

impl LmdbBackend {
    /// Open or create the store
    ///
    /// # Arguments
    /// * `path` - Directory for LMDB data files
    /// * `max_size` - Maximum database size in bytes
    pub fn open<P: AsRef<Path>>(path: P, max_size: usize) -> StoreResult<Self> {
        std::fs::create_dir_all(&path)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size)
                .max_dbs(1)
                .open(&path)?
        };

        let mut wtxn = env.write_txn()?;
        let db = env.create_database::<Str, Bytes>(&mut wtxn, Some(DATABASE_NAME))?;
        wtxn.commit()?;

        info!(
            "LMDB document store opened at {:?} ({}MB)",
            path.as_ref(),
            max_size / (1024 * 1024)
        );

        Ok(Self {
            env: Arc::new(env),
            db,
            path: path.as_ref().to_path_buf(),
        })
    }

    /// Number of stored top-level entries
    pub fn count(&self) -> StoreResult<usize> {
        let rtxn = self.env.read_txn()?;
        Ok(self.db.len(&rtxn)? as usize)
    }

    /// Sync database to disk (explicit fsync)
    pub fn sync(&self) -> StoreResult<()> {
        self.env.force_sync()?;
        debug!("LMDB synced to disk");
        Ok(())
    }

    fn read_entry(&self, txn: &RoTxn, key: &str) -> StoreResult<Option<Value>> {
        match self.db.get(txn, key)? {
            Some(bytes) => Ok(Some(self.decode(key, bytes)?)),
            None => Ok(None),
        }
    }

    fn decode(&self, key: &str, bytes: &[u8]) -> StoreResult<Value> {
        serde_json::from_slice::<Value>(bytes).map_err(|e| {
            StoreError::from(DatabaseError::Malformed {
                medium: format!("{}#{}", self.path.display(), key),
                reason: e.to_string(),
            })
        })
    }
}

#[async_trait]
impl StorageBackend for LmdbBackend {
    fn name(&self) -> &'static str {
        "lmdb"
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        let top = path::top_level(key)?;
        let rest = path::remainder(key)?;
        let rtxn = self.env.read_txn()?;
        let entry = self.read_entry(&rtxn, top)?;
        Ok(match rest {
            None => entry,
            Some(rest) => entry.and_then(|e| path::get(&e, rest).cloned()),
        })
    }

    async fn modify(&self, key: &str, mutate: Mutator) -> StoreResult<Value> {
        let top = path::top_level(key)?;
        let rest = path::remainder(key)?;

        let mut wtxn = self.env.write_txn()?;
        let existing = self.read_entry(&wtxn, top)?;

        let (entry, next) = match rest {
            None => {
                let next = mutate(existing.as_ref())?;
                (next.clone(), next)
            }
            Some(rest) => {
                let mut entry = existing.unwrap_or_else(|| Value::Object(Map::new()));
                let next = mutate(path::get(&entry, rest))?;
                path::set(&mut entry, rest, next.clone())?;
                (entry, next)
            }
        };

        let bytes = serde_json::to_vec(&entry)?;
        self.db.put(&mut wtxn, top, &bytes)?;
        wtxn.commit()?;
        debug!("LMDB SET {}", key);
        Ok(next)
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let top = path::top_level(key)?;
        let rest = path::remainder(key)?;

        let mut wtxn = self.env.write_txn()?;
        match rest {
            None => {
                self.db.delete(&mut wtxn, top)?;
            }
            Some(rest) => {
                let mut entry = self
                    .read_entry(&wtxn, top)?
                    .unwrap_or_else(|| Value::Object(Map::new()));
                path::delete(&mut entry, rest)?;
                let bytes = serde_json::to_vec(&entry)?;
                self.db.put(&mut wtxn, top, &bytes)?;
            }
        }
        wtxn.commit()?;
        debug!("LMDB DELETE {}", key);
        Ok(true)
    }

    async fn clear_all(&self) -> StoreResult<bool> {
        let mut wtxn = self.env.write_txn()?;
        self.db.clear(&mut wtxn)?;
        wtxn.commit()?;
        info!("LMDB document store cleared");
        Ok(true)
    }

    async fn fetch_everything(&self) -> StoreResult<Value> {
        let rtxn = self.env.read_txn()?;
        let mut entries = Vec::new();
        for item in self.db.iter(&rtxn)? {
            let (key, bytes) = item?;
            entries.push((key.to_string(), self.decode(key, bytes)?));
        }
        debug!("LMDB fetched {} entries", entries.len());
        Ok(path::fold(entries))
    }
}
