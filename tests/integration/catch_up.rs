//! Catch-up sweeps on start and resume.

use crate::helpers::{Harness, settle, start};
use beacon::EngineConfig;
use beacon::notify::Permission;
use beacon::store::MemoryItemStore;
use beacon::{ItemKind, ReminderItem, ScheduleKey};
use chrono::TimeDelta;
use std::time::Duration;

fn overdue(seconds: i64) -> MemoryItemStore {
    MemoryItemStore::with_items([ReminderItem::task(
        "t1",
        "Meds",
        start() - TimeDelta::seconds(seconds),
    )])
}

#[tokio::test(start_paused = true)]
async fn test_due_now_thirty_seconds_late_fires_once() {
    let h = Harness::new(overdue(30), Permission::Granted);

    let status = h.engine.initialize().await.unwrap();
    settle().await;

    assert_eq!(status.swept.unwrap().scheduled, 1);
    assert_eq!(h.surface.tags(), vec!["due-now"]);

    h.engine.resume_handle().signal();
    h.engine.flush().await.unwrap();
    h.engine.sweep_now().await.unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(h.surface.tags(), vec!["due-now"]);
    h.engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_two_minutes_late_arms_nothing() {
    let h = Harness::new(overdue(120), Permission::Granted);

    let status = h.engine.initialize().await.unwrap();
    tokio::time::sleep(Duration::from_secs(60)).await;

    let report = status.swept.unwrap();
    assert_eq!(report.scanned, 1);
    assert_eq!(report.scheduled, 0);
    assert!(h.engine.registry().is_empty());
    assert!(h.surface.shown().is_empty());
    h.engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_grace_window_edges() {
    for (late, fires) in [(59, true), (60, true), (61, false)] {
        let h = Harness::new(overdue(late), Permission::Granted);
        h.engine.initialize().await.unwrap();
        settle().await;
        assert_eq!(h.surface.shown().len(), usize::from(fires), "late by {late}s");
        h.engine.shutdown().await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_grace_window_is_configurable() {
    let mut config = EngineConfig::default();
    config.catch_up.grace_secs = 300;
    let h = Harness::with_config(overdue(120), Permission::Granted, config);

    h.engine.initialize().await.unwrap();
    settle().await;

    assert_eq!(h.surface.tags(), vec!["due-now"]);
    h.engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_resume_after_suspension_prunes_and_schedules() {
    let h = Harness::new(
        MemoryItemStore::with_items([ReminderItem::task(
            "old",
            "Old",
            start() + TimeDelta::minutes(30),
        )]),
        Permission::Granted,
    );
    h.engine.initialize().await.unwrap();
    assert!(h.engine.registry().has(&ScheduleKey::new(ItemKind::Task, "old")));

    // Simulate a lost feed: changes land in the store without events.
    h.store.disconnect_subscribers();
    h.store.fail_next_subscribes(u32::MAX);
    settle().await;
    h.store.remove(&ScheduleKey::new(ItemKind::Task, "old"));
    h.store
        .upsert(ReminderItem::task("new", "New", h.now() + TimeDelta::minutes(10)));

    let report = h.engine.sweep_now().await.unwrap();

    assert_eq!(report.scanned, 1);
    assert_eq!(report.scheduled, 1);
    assert_eq!(report.pruned, 1);
    assert_eq!(h.engine.registry().keys(), vec![ScheduleKey::new(ItemKind::Task, "new")]);
    h.engine.shutdown().await;
}
