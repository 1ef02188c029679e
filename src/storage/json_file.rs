//! Flat JSON file backend
//!
//! The whole document lives in one text file. Every operation reads the
//! file, decodes it, mutates, re-encodes and writes the whole file back.
//! There is no partial I/O.
//!
//! The file is pretty-printed with tab indentation unless `minify` is set.
//! A missing file is created holding `{}` before it is first read.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::backend::{Mutator, StorageBackend};
use super::path;
use crate::error::{DatabaseError, StoreResult};

/// JSON file storage medium
pub struct JsonFileBackend {
    path: PathBuf,
    minify: bool,
    /// Serialises read-modify-write cycles on the file
    lock: Mutex<()>,
}

impl JsonFileBackend {
    /// Open the file at `path`, creating it with `{}` when missing
    ///
    /// Fails with `DatabaseError::Malformed` if an existing file does not
    /// hold a JSON object.
    pub async fn open<P: AsRef<Path>>(path: P, minify: bool) -> StoreResult<Self> {
        let backend = Self {
            path: path.as_ref().to_path_buf(),
            minify,
            lock: Mutex::new(()),
        };

        backend.ensure_file().await?;
        backend.read_document().await?;

        info!("JSON file store opened at {:?} (minify={})", backend.path, minify);
        Ok(backend)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the file (and its parent directories) holding `{}` if missing
    ///
    /// Returns whether the file had to be created.
    pub async fn ensure_file(&self) -> StoreResult<bool> {
        if tokio::fs::try_exists(&self.path).await? {
            return Ok(false);
        }
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        self.write_document(&Value::Object(Map::new())).await?;
        debug!("Created empty JSON store at {:?}", self.path);
        Ok(true)
    }

    /// Read and decode the whole file
    async fn read_document(&self) -> StoreResult<Value> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(DatabaseError::NotFound {
                    medium: self.medium(),
                }
                .into())
            }
            Err(e) => return Err(e.into()),
        };

        if text.trim().is_empty() {
            return Ok(Value::Object(Map::new()));
        }

        let document: Value = serde_json::from_str(&text).map_err(|e| DatabaseError::Malformed {
            medium: self.medium(),
            reason: e.to_string(),
        })?;

        if !path::is_plain_object(&document) {
            return Err(DatabaseError::Malformed {
                medium: self.medium(),
                reason: format!("top level is {}, expected object", path::type_name(Some(&document))),
            }
            .into());
        }
        Ok(document)
    }

    /// Encode and write the whole file
    async fn write_document(&self, document: &Value) -> StoreResult<()> {
        let bytes = encode(document, self.minify)?;
        tokio::fs::write(&self.path, bytes).await?;
        Ok(())
    }

    /// Ensure the file exists, then read it
    async fn load(&self) -> StoreResult<Value> {
        self.ensure_file().await?;
        self.read_document().await
    }

    fn medium(&self) -> String {
        self.path.display().to_string()
    }

    /// Periodically recreate the file if it disappeared
    ///
    /// The task holds only a weak reference and stops once the backend is
    /// dropped. The file lock is taken per tick, never across the sleep.
    pub fn spawn_integrity_check(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(backend) = weak.upgrade() else {
                    break;
                };
                let _guard = backend.lock.lock().await;
                match backend.ensure_file().await {
                    Ok(true) => warn!("JSON store {:?} was missing and has been recreated", backend.path),
                    Ok(false) => {}
                    Err(e) => warn!("JSON store integrity check failed for {:?}: {}", backend.path, e),
                }
            }
        })
    }
}

/// Serialise a document, tab-indented unless minified
fn encode(document: &Value, minify: bool) -> StoreResult<Vec<u8>> {
    if minify {
        return Ok(serde_json::to_vec(document)?);
    }
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"\t");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    document.serialize(&mut serializer)?;
    Ok(buf)
}

#[async_trait]
impl StorageBackend for JsonFileBackend {
    fn name(&self) -> &'static str {
        "json"
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        path::split_key(key)?;
        let document = self.load().await?;
        Ok(path::get(&document, key).cloned())
    }

    async fn modify(&self, key: &str, mutate: Mutator) -> StoreResult<Value> {
        path::split_key(key)?;
        let _guard = self.lock.lock().await;
        let mut document = self.load().await?;
        let next = mutate(path::get(&document, key))?;
        path::set(&mut document, key, next.clone())?;
        self.write_document(&document).await?;
        Ok(next)
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        path::split_key(key)?;
        let _guard = self.lock.lock().await;
        let mut document = self.load().await?;
        path::delete(&mut document, key)?;
        self.write_document(&document).await?;
        Ok(true)
    }

    async fn clear_all(&self) -> StoreResult<bool> {
        let _guard = self.lock.lock().await;
        self.write_document(&Value::Object(Map::new())).await?;
        Ok(true)
    }

    async fn fetch_everything(&self) -> StoreResult<Value> {
        self.load().await
    }
}

impl std::fmt::Debug for JsonFileBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonFileBackend")
            .field("path", &self.path)
            .field("minify", &self.minify)
            .finish()
    }
}
