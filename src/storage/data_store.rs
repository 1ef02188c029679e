//! DataStore - cache-backed facade over one storage backend
//!
//! ## Lifecycle
//! ```text
//! Uninitialized ──load()──▶ Loading ──fetch_everything ok──▶ Ready
//! ```
//! Reads before `Ready` see an empty cache. Writes before `Ready` fail
//! with `StoreError::NotReady`.
//!
//! ## Write path
//! 1. Snapshot the cache subtree the write can change
//! 2. Apply the mutation to the cache (failures are not propagated)
//! 3. Issue the matching backend call
//! 4. On backend failure restore the snapshot (or reload the entry when
//!    another write changed that subtree meanwhile) and return the error
//!
//! Reads never touch the backend except [`DataStore::get_from_backend`].
//! Two un-awaited writes to the same path may commit to the backend in
//! either order; await each write before issuing the next when order
//! matters.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::backend::StorageBackend;
use super::cache::{CacheStore, PathSnapshot};
use super::path;
use crate::config::Config;
use crate::error::{StoreError, StoreResult};

/// Load state of a [`DataStore`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreState {
    Uninitialized,
    Loading,
    Ready,
}

impl StoreState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => StoreState::Loading,
            2 => StoreState::Ready,
            _ => StoreState::Uninitialized,
        }
    }
}

/// What a write changed, as seen by the cache
///
/// Domain managers compare `previous` and `current` to decide which events
/// to emit.
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    pub previous: Value,
    pub current: Value,
}

/// Operation counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub reads: u64,
    pub writes: u64,
    pub backend_failures: u64,
    pub rollbacks: u64,
}

#[derive(Default)]
struct Counters {
    reads: AtomicU64,
    writes: AtomicU64,
    backend_failures: AtomicU64,
    rollbacks: AtomicU64,
}

/// Cache-backed, path-addressed data store
pub struct DataStore {
    cache: CacheStore,
    backend: Arc<dyn StorageBackend>,
    debug: bool,
    state: AtomicU8,
    counters: Counters,
}

impl DataStore {
    /// Wrap `backend` without loading it
    pub fn new(backend: Arc<dyn StorageBackend>, debug: bool) -> Self {
        Self {
            cache: CacheStore::new(),
            backend,
            debug,
            state: AtomicU8::new(StoreState::Uninitialized as u8),
            counters: Counters::default(),
        }
    }

    /// Open the configured backend and load it into the cache
    ///
    /// Configuration and connection errors propagate; nothing is retried.
    pub async fn open(config: &Config) -> StoreResult<Self> {
        let backend = super::open_backend(&config.database).await?;
        let store = Self::new(backend, config.debug);
        store.load().await?;
        Ok(store)
    }

    /// Seed the cache with the backend's whole document
    ///
    /// Returns the number of top-level entries loaded. Calling it again
    /// re-synchronises the cache from the backend.
    pub async fn load(&self) -> StoreResult<usize> {
        self.state.store(StoreState::Loading as u8, Ordering::SeqCst);
        match self.backend.fetch_everything().await {
            Ok(document) => {
                let count = self.cache.load(document);
                self.state.store(StoreState::Ready as u8, Ordering::SeqCst);
                info!("[{}] loaded {} top-level entries into cache", self.backend.name(), count);
                Ok(count)
            }
            Err(e) => {
                self.state.store(StoreState::Uninitialized as u8, Ordering::SeqCst);
                error!("[{}] failed to load store: {}", self.backend.name(), e);
                Err(e)
            }
        }
    }

    pub fn state(&self) -> StoreState {
        StoreState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn is_ready(&self) -> bool {
        self.state() == StoreState::Ready
    }

    /// Name of the backend medium
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            reads: self.counters.reads.load(Ordering::Relaxed),
            writes: self.counters.writes.load(Ordering::Relaxed),
            backend_failures: self.counters.backend_failures.load(Ordering::Relaxed),
            rollbacks: self.counters.rollbacks.load(Ordering::Relaxed),
        }
    }

    // ========================================================================
    // Reads (cache only)
    // ========================================================================

    /// Cached value at `path`; `Value::Null` when missing
    pub fn get(&self, path: &str) -> Value {
        self.counters.reads.fetch_add(1, Ordering::Relaxed);
        self.cache.get(path)
    }

    /// Cached value at `path` decoded into `T`; `None` when missing
    ///
    /// A cached value of the wrong shape for `T` fails with
    /// `InvalidTargetType`; it is not a backend error.
    pub fn get_as<T: DeserializeOwned>(&self, path: &str) -> StoreResult<Option<T>> {
        let value = self.get(path);
        if value.is_null() {
            return Ok(None);
        }
        let found = path::type_name(Some(&value));
        serde_json::from_value(value).map(Some).map_err(|e| {
            debug!("[cache] '{}' does not decode as {}: {}", path, std::any::type_name::<T>(), e);
            StoreError::InvalidTargetType {
                operation: "get_as",
                path: path.to_string(),
                expected: std::any::type_name::<T>(),
                found,
            }
        })
    }

    pub fn has(&self, path: &str) -> bool {
        self.counters.reads.fetch_add(1, Ordering::Relaxed);
        self.cache.has(path)
    }

    /// The whole cached document
    pub fn all(&self) -> Value {
        self.counters.reads.fetch_add(1, Ordering::Relaxed);
        self.cache.get_cache_object()
    }

    /// Read straight from the backend, bypassing the cache
    pub async fn get_from_backend(&self, path: &str) -> StoreResult<Value> {
        let result = self.backend.get(path).await.map(|v| v.unwrap_or(Value::Null));
        self.report("get_from_backend", path, &result);
        result
    }

    // ========================================================================
    // Writes (cache first, then backend)
    // ========================================================================

    /// Overwrite the value at `path`
    pub async fn set<T: Serialize>(&self, path: &str, value: T) -> StoreResult<Mutation> {
        let value = serde_json::to_value(value)?;
        let cached = value.clone();
        self.write_through(
            "set",
            path,
            |cache| cache.update(path, move |_| Ok(cached)),
            self.backend.set(path, value),
        )
        .await
    }

    /// Add `amount` to the number at `path`
    pub async fn add(&self, path: &str, amount: f64) -> StoreResult<Mutation> {
        self.write_through(
            "add",
            path,
            |cache| cache.update(path, |current| path::added("add", path, current, amount)),
            self.backend.add(path, amount),
        )
        .await
    }

    /// Subtract `amount` from the number at `path`
    pub async fn subtract(&self, path: &str, amount: f64) -> StoreResult<Mutation> {
        self.write_through(
            "subtract",
            path,
            |cache| cache.update(path, |current| path::added("subtract", path, current, -amount)),
            self.backend.subtract(path, amount),
        )
        .await
    }

    /// Remove the value at `path`
    pub async fn delete(&self, path: &str) -> StoreResult<Mutation> {
        self.write_through(
            "delete",
            path,
            |cache| {
                cache.delete(path).map(|previous| (previous, Value::Null))
            },
            self.backend.delete(path),
        )
        .await
    }

    /// Append `value` to the array at `path`
    pub async fn push<T: Serialize>(&self, path: &str, value: T) -> StoreResult<Mutation> {
        let value = serde_json::to_value(value)?;
        let cached = value.clone();
        self.write_through(
            "push",
            path,
            |cache| cache.update(path, move |current| path::pushed(path, current, cached)),
            self.backend.push(path, value),
        )
        .await
    }

    /// Replace element `index` of the array at `path`
    pub async fn pull<T: Serialize>(&self, path: &str, index: usize, value: T) -> StoreResult<Mutation> {
        let value = serde_json::to_value(value)?;
        let cached = value.clone();
        self.write_through(
            "pull",
            path,
            |cache| cache.update(path, move |current| path::pulled(path, current, index, cached)),
            self.backend.pull(path, index, value),
        )
        .await
    }

    /// Remove element `index` of the array at `path`
    pub async fn pop(&self, path: &str, index: usize) -> StoreResult<Mutation> {
        self.write_through(
            "pop",
            path,
            |cache| cache.update(path, |current| path::popped(path, current, index)),
            self.backend.pop(path, index),
        )
        .await
    }

    /// Wipe the cache and the backend together
    ///
    /// If the backend cannot be cleared the cache is put back.
    pub async fn clear(&self) -> StoreResult<bool> {
        self.ensure_ready("clear", "*")?;
        self.counters.writes.fetch_add(1, Ordering::Relaxed);

        let snapshot = self.cache.get_cache_object();
        self.cache.clear();
        let result = self.backend.clear_all().await;
        if result.is_err() {
            self.counters.backend_failures.fetch_add(1, Ordering::Relaxed);
            self.counters.rollbacks.fetch_add(1, Ordering::Relaxed);
            self.cache.load(snapshot);
        }
        self.report("clear", "*", &result);
        result
    }

    /// Alias of [`DataStore::clear`]
    pub async fn delete_all(&self) -> StoreResult<bool> {
        self.clear().await
    }

    fn ensure_ready(&self, operation: &'static str, path: &str) -> StoreResult<()> {
        if self.is_ready() {
            return Ok(());
        }
        let err = StoreError::NotReady;
        if self.debug {
            error!("[{}] {} '{}' failed: {}", self.backend.name(), operation, path, err);
        }
        Err(err)
    }

    async fn write_through<B, Fut>(
        &self,
        operation: &'static str,
        path: &str,
        cache_step: impl FnOnce(&CacheStore) -> StoreResult<(Value, Value)>,
        backend_call: Fut,
    ) -> StoreResult<Mutation>
    where
        Fut: Future<Output = StoreResult<B>>,
    {
        self.ensure_ready(operation, path)?;
        self.counters.writes.fetch_add(1, Ordering::Relaxed);

        let mut snapshot = self.cache.snapshot(path);
        let cached = cache_step(&self.cache);
        match (&cached, snapshot.as_mut()) {
            (Ok(_), Some(snapshot)) => self.cache.seal(snapshot),
            (Err(e), _) => debug!("[cache] {} '{}' skipped: {}", operation, path, e),
            _ => {}
        }

        let result = match backend_call.await {
            Ok(_) => match cached {
                Ok((previous, current)) => Ok(Mutation { previous, current }),
                Err(_) => self.resync_entry(path).await,
            },
            Err(e) => {
                self.counters.backend_failures.fetch_add(1, Ordering::Relaxed);
                if let (Ok(_), Some(snapshot)) = (&cached, &snapshot) {
                    self.roll_back(path, snapshot).await;
                }
                Err(e)
            }
        };

        self.report(operation, path, &result);
        result
    }

    /// Undo a cache write whose backend call failed
    ///
    /// Writes to other paths may have landed in the cache while the backend
    /// call was pending. When one of them touched the same subtree the
    /// snapshot cannot be applied, and the top-level entry is reloaded from
    /// the backend instead.
    async fn roll_back(&self, path: &str, snapshot: &PathSnapshot) {
        if self.cache.restore(snapshot) {
            self.counters.rollbacks.fetch_add(1, Ordering::Relaxed);
            return;
        }
        debug!(
            "[cache] '{}' changed concurrently, reloading instead of rolling back",
            snapshot.anchor()
        );
        if let Err(e) = self.reload_entry(path).await {
            error!("[{}] failed to reload cache for '{}': {}", self.backend.name(), path, e);
        }
    }

    /// The backend accepted a write the cache rejected: the two disagree,
    /// so reload the touched top-level entry from the backend
    async fn resync_entry(&self, path: &str) -> StoreResult<Mutation> {
        warn!("[{}] cache out of sync for '{}', reloading entry", self.backend.name(), path);
        self.reload_entry(path).await?;
        Ok(Mutation {
            previous: Value::Null,
            current: self.cache.get(path),
        })
    }

    async fn reload_entry(&self, path: &str) -> StoreResult<()> {
        let top = path::top_level(path)?;
        let entry = self.backend.get(top).await?;
        self.cache.replace_entry(top, entry);
        Ok(())
    }

    /// Debug envelope: one line per operation when debug is on
    fn report<T>(&self, operation: &str, path: &str, result: &StoreResult<T>) {
        if !self.debug {
            return;
        }
        match result {
            Ok(_) => info!("[{}] {} '{}': ok", self.backend.name(), operation, path),
            Err(e) => error!("[{}] {} '{}' failed: {}", self.backend.name(), operation, path, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::backend::Mutator;
    use crate::storage::json_file::JsonFileBackend;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::AtomicBool;

    /// Backend that can be switched into failing every write
    struct FlakyBackend {
        inner: JsonFileBackend,
        failing: AtomicBool,
    }

    #[async_trait]
    impl StorageBackend for FlakyBackend {
        fn name(&self) -> &'static str {
            "flaky"
        }

        async fn get(&self, path: &str) -> StoreResult<Option<Value>> {
            self.inner.get(path).await
        }

        async fn modify(&self, path: &str, mutate: Mutator) -> StoreResult<Value> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(crate::error::DatabaseError::Connection("offline".into()).into());
            }
            self.inner.modify(path, mutate).await
        }

        async fn delete(&self, path: &str) -> StoreResult<bool> {
            self.inner.delete(path).await
        }

        async fn clear_all(&self) -> StoreResult<bool> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(crate::error::DatabaseError::Connection("offline".into()).into());
            }
            self.inner.clear_all().await
        }

        async fn fetch_everything(&self) -> StoreResult<Value> {
            self.inner.fetch_everything().await
        }
    }

    async fn flaky_store() -> (Arc<FlakyBackend>, DataStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let inner = JsonFileBackend::open(dir.path().join("db.json"), false).await.unwrap();
        let backend = Arc::new(FlakyBackend {
            inner,
            failing: AtomicBool::new(false),
        });
        let store = DataStore::new(backend.clone(), true);
        store.load().await.unwrap();
        (backend, store, dir)
    }

    #[tokio::test]
    async fn test_state_machine() {
        let dir = tempfile::tempdir().unwrap();
        let backend = JsonFileBackend::open(dir.path().join("db.json"), false).await.unwrap();
        let store = DataStore::new(Arc::new(backend), false);

        assert_eq!(store.state(), StoreState::Uninitialized);
        assert_eq!(store.all(), json!({}));
        assert!(matches!(store.set("g.u.xp", 1).await, Err(StoreError::NotReady)));

        store.load().await.unwrap();
        assert_eq!(store.state(), StoreState::Ready);
        store.set("g.u.xp", 1).await.unwrap();
    }

    #[tokio::test]
    async fn test_mutation_reports_previous_and_current() {
        let (_backend, store, _dir) = flaky_store().await;
        let first = store.set("g.u.xp", 10).await.unwrap();
        assert_eq!(first, Mutation { previous: Value::Null, current: json!(10) });

        let second = store.add("g.u.xp", 5.0).await.unwrap();
        assert_eq!(second, Mutation { previous: json!(10), current: json!(15) });
    }

    #[tokio::test]
    async fn test_backend_failure_rolls_back_cache() {
        let (backend, store, _dir) = flaky_store().await;
        store.set("g.u.xp", 10).await.unwrap();

        backend.failing.store(true, Ordering::SeqCst);
        let err = store.set("g.u.xp", 99).await.unwrap_err();
        assert!(err.is_database());
        assert_eq!(store.get("g.u.xp"), json!(10));

        let err = store.set("g.other.xp", 1).await.unwrap_err();
        assert!(err.is_database());
        assert_eq!(store.get("g"), json!({"u": {"xp": 10}}));

        let stats = store.stats();
        assert_eq!(stats.backend_failures, 2);
        assert_eq!(stats.rollbacks, 2);
    }

    /// Backend whose writes under `failing_prefix` fail after a delay, so
    /// other writes complete while they are pending
    struct SlowFailBackend {
        inner: JsonFileBackend,
        failing_prefix: &'static str,
    }

    #[async_trait]
    impl StorageBackend for SlowFailBackend {
        fn name(&self) -> &'static str {
            "slow-fail"
        }

        async fn get(&self, path: &str) -> StoreResult<Option<Value>> {
            self.inner.get(path).await
        }

        async fn modify(&self, path: &str, mutate: Mutator) -> StoreResult<Value> {
            if path.starts_with(self.failing_prefix) {
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                return Err(crate::error::DatabaseError::Connection("timed out".into()).into());
            }
            self.inner.modify(path, mutate).await
        }

        async fn delete(&self, path: &str) -> StoreResult<bool> {
            self.inner.delete(path).await
        }

        async fn clear_all(&self) -> StoreResult<bool> {
            self.inner.clear_all().await
        }

        async fn fetch_everything(&self) -> StoreResult<Value> {
            self.inner.fetch_everything().await
        }
    }

    async fn slow_fail_store(seed: Option<Value>) -> (Arc<SlowFailBackend>, DataStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let inner = JsonFileBackend::open(dir.path().join("db.json"), false).await.unwrap();
        if let Some(seed) = seed {
            inner.set("g", seed).await.unwrap();
        }
        let backend = Arc::new(SlowFailBackend {
            inner,
            failing_prefix: "g.bad",
        });
        let store = DataStore::new(backend.clone(), false);
        store.load().await.unwrap();
        (backend, store, dir)
    }

    #[tokio::test]
    async fn test_failed_write_keeps_concurrent_sibling_write() {
        let (backend, store, _dir) = slow_fail_store(Some(json!({"good": {"xp": 0}}))).await;

        let (bad, good) = tokio::join!(store.set("g.bad.xp", 1), store.set("g.good.xp", 2));
        assert!(bad.unwrap_err().is_database());
        good.unwrap();

        assert_eq!(store.get("g"), json!({"good": {"xp": 2}}));
        assert_eq!(store.all(), backend.fetch_everything().await.unwrap());
        assert_eq!(store.stats().rollbacks, 1);
    }

    #[tokio::test]
    async fn test_failed_write_reloads_when_subtree_changed() {
        // Guild missing from the cache: both writes create "g", so the
        // failed one cannot be undone in place
        let (backend, store, _dir) = slow_fail_store(None).await;

        let (bad, good) = tokio::join!(store.set("g.bad.xp", 1), store.set("g.good.xp", 2));
        assert!(bad.is_err());
        good.unwrap();

        assert_eq!(store.get("g.good.xp"), json!(2));
        assert_eq!(store.get("g.bad"), Value::Null);
        assert_eq!(store.all(), backend.fetch_everything().await.unwrap());
        assert_eq!(store.stats().rollbacks, 0);
    }

    #[tokio::test]
    async fn test_failed_clear_restores_cache() {
        let (backend, store, _dir) = flaky_store().await;
        store.set("g.u.xp", 10).await.unwrap();

        backend.failing.store(true, Ordering::SeqCst);
        assert!(store.clear().await.is_err());
        assert_eq!(store.get("g.u.xp"), json!(10));

        backend.failing.store(false, Ordering::SeqCst);
        assert!(store.clear().await.unwrap());
        assert_eq!(store.all(), json!({}));
    }

    #[tokio::test]
    async fn test_type_guard_error_is_returned() {
        let (_backend, store, _dir) = flaky_store().await;
        store.set("g.u.name", "bob").await.unwrap();

        let err = store.add("g.u.name", 5.0).await.unwrap_err();
        assert!(err.is_invalid_target());
        assert_eq!(store.get("g.u.name"), json!("bob"));
        assert_eq!(store.get_from_backend("g.u.name").await.unwrap(), json!("bob"));
    }

    #[tokio::test]
    async fn test_cache_divergence_is_resynced() {
        let (backend, store, _dir) = flaky_store().await;
        store.set("g.u.xp", 1).await.unwrap();

        // Backend changed behind the store's back
        backend.inner.set("g.u.list", json!([1])).await.unwrap();
        let mutation = store.pop("g.u.list", 0).await.unwrap();
        assert_eq!(mutation.current, json!([]));
        assert_eq!(store.get("g.u"), json!({"xp": 1, "list": []}));
    }

    #[tokio::test]
    async fn test_get_as_typed() {
        let (_backend, store, _dir) = flaky_store().await;
        store.set("g.u.tags", vec!["a", "b"]).await.unwrap();
        let tags: Option<Vec<String>> = store.get_as("g.u.tags").unwrap();
        assert_eq!(tags, Some(vec!["a".to_string(), "b".to_string()]));
        let missing: Option<u64> = store.get_as("g.u.none").unwrap();
        assert_eq!(missing, None);
    }

    #[tokio::test]
    async fn test_get_as_shape_mismatch_is_not_a_database_error() {
        let (_backend, store, _dir) = flaky_store().await;
        store.set("g.u.xp", "lots").await.unwrap();

        let err = store.get_as::<u64>("g.u.xp").unwrap_err();
        assert!(err.is_invalid_target());
        assert!(!err.is_database());
        assert!(matches!(err, StoreError::InvalidTargetType { found: "string", .. }));
    }
}
