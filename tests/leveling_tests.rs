//! Integration tests for the leveling managers
//!
//! Every test runs on a JSON file store in its own temp directory.

use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

use guild_leveling::leveling::{
    Leveling, LevelingEvent, MessageEvent, Rank, SettingKey, UserRecord,
};
use guild_leveling::storage::json_file::JsonFileBackend;
use guild_leveling::{DataStore, LevelingOptions, StoreError};

async fn create_leveling() -> (Leveling, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let backend = JsonFileBackend::open(dir.path().join("leveling.json"), false)
        .await
        .expect("Failed to create JSON store");
    let store = DataStore::new(Arc::new(backend), false);
    store.load().await.unwrap();

    let options = LevelingOptions {
        xp: 5,
        max_xp: 100,
        multiplier: 1.0,
    };
    (Leveling::new(Arc::new(store), options), dir)
}

fn message(user: &str) -> MessageEvent {
    MessageEvent::new("g1", user, "c1")
}

// ============================================================================
// Messages
// ============================================================================

#[tokio::test]
async fn test_first_message_creates_record() {
    let (leveling, _dir) = create_leveling().await;

    let events = leveling.handle_message(&message("u1"), |_| true).await.unwrap();
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], LevelingEvent::XpGained { amount: 5, xp: 5, total_xp: 5, .. }));

    let record = leveling.users.get("g1", "u1").unwrap().expect("record created");
    assert_eq!(record.xp, 5);
    assert_eq!(record.total_xp, 5);
    assert_eq!(record.level, 1);
    assert_eq!(record.difference, 95);
}

#[tokio::test]
async fn test_level_up_broadcasts_events_and_ranks() {
    let (leveling, _dir) = create_leveling().await;
    leveling.settings.set("g1", SettingKey::Xp, 150).await.unwrap();
    leveling
        .ranks
        .add("g1", Rank { level: 2, role_id: "r2".into() })
        .await
        .unwrap();
    let mut rx = leveling.subscribe();

    let events = leveling.handle_message(&message("u1"), |_| true).await.unwrap();
    assert_eq!(events.len(), 3);
    assert!(matches!(events[1], LevelingEvent::LevelUp { previous_level: 1, level: 2, .. }));
    assert!(matches!(&events[2], LevelingEvent::RankReached { rank, .. } if rank.role_id == "r2"));

    for expected in &events {
        assert_eq!(&rx.recv().await.unwrap(), expected);
    }

    // 100 to leave level 1, 50 into level 2
    let stored = leveling.store().get("g1.u1");
    assert_eq!(stored["level"], json!(2));
    assert_eq!(stored["xp"], json!(50));
    assert_eq!(stored["totalXP"], json!(150));
    assert_eq!(stored["maxXP"], json!(200));
    assert_eq!(stored["difference"], json!(150));
}

#[tokio::test]
async fn test_ignored_and_disabled_are_skipped() {
    let (leveling, _dir) = create_leveling().await;

    leveling.settings.ignore_channel("g1", "c1").await.unwrap();
    assert!(leveling.handle_message(&message("u1"), |_| true).await.unwrap().is_empty());
    assert!(leveling.settings.unignore_channel("g1", "c1").await.unwrap());

    leveling.settings.ignore_user("g1", "u1").await.unwrap();
    assert!(!leveling.settings.ignore_user("g1", "u1").await.unwrap());
    assert!(leveling.handle_message(&message("u1"), |_| true).await.unwrap().is_empty());

    leveling.settings.set("g1", SettingKey::Status, false).await.unwrap();
    assert!(leveling.handle_message(&message("u2"), |_| true).await.unwrap().is_empty());
    leveling.settings.reset("g1", SettingKey::Status).await.unwrap();

    let filtered = leveling
        .handle_message(&message("u2"), |event| event.channel_id != "c1")
        .await
        .unwrap();
    assert!(filtered.is_empty());

    assert!(!leveling.users.exists("g1", "u1").unwrap());
    assert!(!leveling.users.exists("g1", "u2").unwrap());
}

#[tokio::test]
async fn test_multipliers_scale_message_xp() {
    let (leveling, _dir) = create_leveling().await;
    leveling.settings.set("g1", SettingKey::Multiplier, 2.0).await.unwrap();
    leveling.xp.set_multiplier("g1", "u1", 1.5).await.unwrap();

    leveling.handle_message(&message("u1"), |_| true).await.unwrap();
    // 5 * 2.0 * 1.5
    assert_eq!(leveling.xp.get("g1", "u1").unwrap(), Some(15));
}

// ============================================================================
// Managers
// ============================================================================

#[tokio::test]
async fn test_xp_subtract_drops_levels() {
    let (leveling, _dir) = create_leveling().await;
    leveling.total_xp.set("g1", "u1", 350).await.unwrap();
    assert_eq!(leveling.levels.get("g1", "u1").unwrap(), Some(3));

    let progress = leveling.xp.subtract("g1", "u1", 100).await.unwrap();
    assert_eq!(progress.current, UserRecord::from_total(250, 100, 1.0));
    assert_eq!(progress.current.level, 2);

    let progress = leveling.xp.subtract("g1", "u1", 1000).await.unwrap();
    assert_eq!(progress.current.total_xp, 0);
    assert_eq!(progress.current.level, 1);
}

#[tokio::test]
async fn test_level_set_resets_xp() {
    let (leveling, _dir) = create_leveling().await;
    leveling.xp.add("g1", "u1", 30).await.unwrap();

    let progress = leveling.levels.set("g1", "u1", 4).await.unwrap();
    assert_eq!(progress.current, UserRecord::at_level(4, 100, 1.0));
    assert_eq!(progress.current.total_xp, 600);

    let progress = leveling.levels.subtract("g1", "u1", 10).await.unwrap();
    assert_eq!(progress.current.level, 1);
    assert!(matches!(progress.events()[1], LevelingEvent::LevelDown { previous_level: 4, level: 1, .. }));
}

#[tokio::test]
async fn test_settings_fall_back_to_defaults() {
    let (leveling, _dir) = create_leveling().await;
    assert_eq!(leveling.settings.get("g1").unwrap().xp, 5);
    assert_eq!(leveling.settings.all("g1").unwrap(), serde_json::Value::Null);

    leveling.settings.set("g1", SettingKey::MaxXp, 500).await.unwrap();
    let settings = leveling.settings.get("g1").unwrap();
    assert_eq!(settings.max_xp, 500);
    assert_eq!(settings.xp, 5);

    let err = leveling.settings.set("g1", SettingKey::Status, "yes").await.unwrap_err();
    assert!(matches!(err, StoreError::InvalidTargetType { .. }));
    assert_eq!("ignoredUsers".parse::<SettingKey>().unwrap(), SettingKey::IgnoredUsers);

    leveling.settings.reset_all("g1").await.unwrap();
    assert_eq!(leveling.settings.get("g1").unwrap().max_xp, 100);
}

#[tokio::test]
async fn test_ranks_edit_and_remove() {
    let (leveling, _dir) = create_leveling().await;
    leveling.ranks.add("g1", Rank { level: 5, role_id: "r5".into() }).await.unwrap();
    leveling.ranks.add("g1", Rank { level: 10, role_id: "r10".into() }).await.unwrap();

    leveling
        .ranks
        .edit("g1", 1, Rank { level: 12, role_id: "r12".into() })
        .await
        .unwrap();
    assert_eq!(leveling.ranks.rank_for_level("g1", 12).unwrap().unwrap().role_id, "r12");
    assert_eq!(leveling.ranks.rank_for_level("g1", 11).unwrap().unwrap().role_id, "r5");
    assert_eq!(leveling.ranks.rank_for_level("g1", 4).unwrap(), None);

    leveling.ranks.remove("g1", 0).await.unwrap();
    assert_eq!(leveling.ranks.list("g1").unwrap().len(), 1);
    assert!(leveling.ranks.remove("g1", 5).await.is_err());
}

#[tokio::test]
async fn test_leaderboard_skips_reserved_keys() {
    let (leveling, _dir) = create_leveling().await;
    leveling.total_xp.set("g1", "low", 10).await.unwrap();
    leveling.total_xp.set("g1", "high", 500).await.unwrap();
    leveling.settings.set("g1", SettingKey::Xp, 20).await.unwrap();
    leveling.ranks.add("g1", Rank { level: 2, role_id: "r".into() }).await.unwrap();

    let board = leveling.leaderboard("g1", None).unwrap();
    let ids: Vec<&str> = board.iter().map(|e| e.user_id.as_str()).collect();
    assert_eq!(ids, vec!["high", "low"]);
    assert_eq!(board[0].position, 1);
}

#[tokio::test]
async fn test_reset_user_and_guild() {
    let (leveling, _dir) = create_leveling().await;
    leveling.xp.add("g1", "u1", 10).await.unwrap();
    leveling.xp.add("g1", "u2", 10).await.unwrap();

    assert!(leveling.reset_user("g1", "u1").await.unwrap());
    assert!(!leveling.reset_user("g1", "u1").await.unwrap());
    assert!(leveling.users.exists("g1", "u2").unwrap());

    assert!(leveling.reset_guild("g1").await.unwrap());
    assert_eq!(leveling.store().all(), json!({}));
    assert!(leveling.reset_guild("bad.id").await.is_err());
}
