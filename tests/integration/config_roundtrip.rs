//! Engine configuration persisted as TOML.

use crate::helpers::{Harness, start};
use beacon::config::TierConfig;
use beacon::notify::Permission;
use beacon::store::MemoryItemStore;
use beacon::{EngineConfig, ReminderError, ReminderItem};
use chrono::TimeDelta;
use std::time::Duration;

#[test]
fn test_config_save_and_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    let mut config = EngineConfig::default();
    config.catch_up.grace_secs = 90;
    config.feed.max_backoff_ms = 10_000;
    config.tiers.entries.push(TierConfig::new("15-min", 15 * 60));
    config.save_to_file(&path).unwrap();

    let loaded = EngineConfig::from_file(&path).unwrap();
    assert_eq!(loaded.catch_up.grace_secs, 90);
    assert_eq!(loaded.feed.max_backoff_ms, 10_000);
    assert_eq!(loaded.tiers.entries.len(), 4);
    assert_eq!(loaded.tiers().unwrap()[0].label(), "15-min");
}

#[test]
fn test_partial_file_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[catch_up]\ngrace_secs = 15\n").unwrap();

    let loaded = EngineConfig::from_file(&path).unwrap();
    assert_eq!(loaded.catch_up.grace_secs, 15);
    assert_eq!(loaded.tiers.entries.len(), 3);
    assert_eq!(loaded.feed.initial_backoff_ms, 500);
    assert!(loaded.surface.primary_enabled);
}

#[test]
fn test_malformed_file_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[tiers\n").unwrap();

    assert!(matches!(
        EngineConfig::from_file(&path),
        Err(ReminderError::Config(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_custom_tiers_drive_dispatch() {
    let mut config = EngineConfig::default();
    config.tiers.entries = vec![
        TierConfig::new("due-now", 0),
        TierConfig::new("30-min", 30 * 60),
    ];
    let h = Harness::with_config(
        MemoryItemStore::with_items([ReminderItem::task(
            "t1",
            "Appointment",
            start() + TimeDelta::minutes(45),
        )]),
        Permission::Granted,
        config,
    );

    h.engine.initialize().await.unwrap();
    tokio::time::sleep(Duration::from_secs(50 * 60)).await;

    assert_eq!(h.surface.tags(), vec!["30-min", "due-now"]);
    assert!(h.surface.shown()[0].body.starts_with("This task is due in 30 minutes"));
    h.engine.shutdown().await;
}
