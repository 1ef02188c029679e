//! Integration tests for the storage layer
//!
//! Tests the complete flow against each embedded medium:
//! Backend seed → DataStore load → cache reads → write-through → backend

use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;

use guild_leveling::storage::backend::StorageBackend;
use guild_leveling::storage::json_file::JsonFileBackend;
use guild_leveling::storage::lmdb::LmdbBackend;
use guild_leveling::{Config, DataStore, DatabaseConfig, StoreError};

/// One fresh backend of every embedded medium, each in its own directory
async fn create_backends() -> Vec<(Arc<dyn StorageBackend>, TempDir)> {
    let json_dir = tempfile::tempdir().unwrap();
    let json = JsonFileBackend::open(json_dir.path().join("leveling.json"), false)
        .await
        .expect("Failed to create JSON store");

    let lmdb_dir = tempfile::tempdir().unwrap();
    let lmdb = LmdbBackend::open(lmdb_dir.path(), 10 * 1024 * 1024).expect("Failed to create LMDB store");

    vec![(Arc::new(json), json_dir), (Arc::new(lmdb), lmdb_dir)]
}

async fn loaded(backend: Arc<dyn StorageBackend>) -> DataStore {
    let store = DataStore::new(backend, false);
    store.load().await.expect("Failed to load store");
    store
}

// ============================================================================
// Load
// ============================================================================

#[tokio::test]
async fn test_cache_matches_seeded_backend() {
    let seeded = json!({
        "g1": {"u1": {"xp": 3, "level": 2}, "settings": {"xp": 10}},
        "g2": {"ranks": [{"level": 5, "roleId": "r5"}]}
    });

    for (backend, _dir) in create_backends().await {
        backend.set("g1", seeded["g1"].clone()).await.unwrap();
        backend.set("g2", seeded["g2"].clone()).await.unwrap();

        let store = loaded(backend.clone()).await;
        assert_eq!(store.all(), seeded, "backend {}", backend.name());
        assert_eq!(store.get("g1.u1.level"), json!(2));
    }
}

// ============================================================================
// Write-through
// ============================================================================

#[tokio::test]
async fn test_write_through_visibility() {
    for (backend, _dir) in create_backends().await {
        let store = loaded(backend.clone()).await;
        store.set("g1.u1.xp", 42).await.unwrap();

        assert_eq!(store.get("g1.u1.xp"), json!(42));
        assert_eq!(backend.get("g1.u1.xp").await.unwrap(), Some(json!(42)));
        assert_eq!(store.get("g1.u1"), json!({"xp": 42}));
    }
}

#[tokio::test]
async fn test_type_guard_leaves_backend_unchanged() {
    for (backend, _dir) in create_backends().await {
        let store = loaded(backend.clone()).await;
        store.set("g1.u1.name", "bob").await.unwrap();

        let err = store.add("g1.u1.name", 5.0).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidTargetType { .. }), "got {err}");
        assert_eq!(backend.get("g1.u1.name").await.unwrap(), Some(json!("bob")));
        assert_eq!(store.get("g1.u1.name"), json!("bob"));
    }
}

#[tokio::test]
async fn test_numeric_overflow_leaves_counter_intact() {
    for (backend, _dir) in create_backends().await {
        let store = loaded(backend.clone()).await;
        store.set("g1.u1.big", 1e308).await.unwrap();

        let err = store.add("g1.u1.big", 1e308).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidTargetType { .. }), "got {err}");
        assert_eq!(store.get("g1.u1.big"), json!(1e308));
        assert_eq!(backend.get("g1.u1.big").await.unwrap(), Some(json!(1e308)));
    }
}

#[tokio::test]
async fn test_array_mutations() {
    for (backend, _dir) in create_backends().await {
        let store = loaded(backend.clone()).await;
        store.set("g1.list", json!([1, 2, 3])).await.unwrap();

        store.push("g1.list", 4).await.unwrap();
        assert_eq!(store.get("g1.list"), json!([1, 2, 3, 4]));

        store.pop("g1.list", 1).await.unwrap();
        assert_eq!(store.get("g1.list"), json!([1, 3, 4]));

        store.pull("g1.list", 0, 9).await.unwrap();
        assert_eq!(store.get("g1.list"), json!([9, 3, 4]));
        assert_eq!(backend.get("g1.list").await.unwrap(), Some(json!([9, 3, 4])));

        let err = store.pop("g1.list", 7).await.unwrap_err();
        assert!(matches!(err, StoreError::IndexOutOfBounds { index: 7, len: 3, .. }));
    }
}

#[tokio::test]
async fn test_delete_keeps_siblings() {
    for (backend, _dir) in create_backends().await {
        let store = loaded(backend.clone()).await;
        store.set("g1.u1", json!({"xp": 5, "level": 2})).await.unwrap();

        store.delete("g1.u1.xp").await.unwrap();
        assert_eq!(store.get("g1.u1.xp"), Value::Null);
        assert_eq!(store.get("g1.u1"), json!({"level": 2}));
        assert_eq!(backend.get("g1.u1").await.unwrap(), Some(json!({"level": 2})));

        // Missing paths are not an error
        store.delete("g1.nobody.xp").await.unwrap();
    }
}

#[tokio::test]
async fn test_subtract_from_missing_counts_from_zero() {
    for (backend, _dir) in create_backends().await {
        let store = loaded(backend.clone()).await;
        store.subtract("g1.u1.xp", 4.0).await.unwrap();
        assert_eq!(store.get("g1.u1.xp"), json!(-4));
        assert_eq!(backend.get("g1.u1.xp").await.unwrap(), Some(json!(-4)));
    }
}

#[tokio::test]
async fn test_clear_empties_cache_and_backend() {
    for (backend, _dir) in create_backends().await {
        let store = loaded(backend.clone()).await;
        store.set("g1.u1.xp", 1).await.unwrap();
        store.set("g2.u2.xp", 2).await.unwrap();

        assert!(store.clear().await.unwrap());
        assert_eq!(store.all(), json!({}));
        assert_eq!(backend.fetch_everything().await.unwrap(), json!({}));
    }
}

#[tokio::test]
async fn test_reload_after_reopen_sees_writes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("leveling.json");
    {
        let backend = JsonFileBackend::open(&path, true).await.unwrap();
        let store = loaded(Arc::new(backend)).await;
        store.set("g1.u1.xp", 7).await.unwrap();
    }

    let backend = JsonFileBackend::open(&path, true).await.unwrap();
    let store = loaded(Arc::new(backend)).await;
    assert_eq!(store.get("g1.u1.xp"), json!(7));
    assert_eq!(std::fs::read_to_string(&path).unwrap(), r#"{"g1":{"u1":{"xp":7}}}"#);
}

// ============================================================================
// Scenario: flat file seeded with {}
// ============================================================================

#[tokio::test]
async fn test_flat_file_set_then_add() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("leveling.json");
    std::fs::write(&path, "{}").unwrap();

    let config = Config {
        debug: true,
        database: DatabaseConfig::JsonFile {
            path: path.clone(),
            minify: false,
            check_interval: None,
        },
        leveling: Default::default(),
    };
    let store = DataStore::open(&config).await.unwrap();

    store.set("guildA.user1.xp", 10).await.unwrap();
    store.add("guildA.user1.xp", 5.0).await.unwrap();
    assert_eq!(store.get("guildA.user1.xp"), json!(15));

    let on_disk: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(on_disk["guildA"]["user1"]["xp"], json!(15));

    let stats = store.stats();
    assert_eq!(stats.writes, 2);
    assert_eq!(stats.backend_failures, 0);
}

#[tokio::test]
async fn test_malformed_file_fails_to_open() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("leveling.json");
    std::fs::write(&path, "{not json").unwrap();

    let config = Config {
        debug: false,
        database: DatabaseConfig::JsonFile {
            path,
            minify: false,
            check_interval: None,
        },
        leveling: Default::default(),
    };
    let err = DataStore::open(&config).await.err().expect("malformed file must not load");
    assert!(err.is_database(), "got {err}");
}
