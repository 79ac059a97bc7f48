//! Engine start, end-to-end reminder timelines and shutdown.

use crate::helpers::{Harness, settle, start};
use beacon::notify::{Permission, Severity};
use beacon::store::MemoryItemStore;
use beacon::{ItemKind, ReminderItem, ScheduleKey};
use chrono::TimeDelta;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_added_item_fires_every_tier_once() {
    let h = Harness::new(MemoryItemStore::new(), Permission::Granted);
    h.engine.initialize().await.unwrap();

    h.store
        .upsert(ReminderItem::task("t1", "Evening meds", start() + TimeDelta::minutes(10)));
    h.engine.flush().await.unwrap();
    assert_eq!(h.engine.registry().armed_count(), 3);

    tokio::time::sleep(Duration::from_secs(11 * 60)).await;

    assert_eq!(h.surface.tags(), vec!["5-min", "1-min", "due-now"]);
    let shown = h.surface.shown();
    assert_eq!(shown[0].title, "Task Reminder: Evening meds");
    assert!(shown[0].body.starts_with("This task is due in 5 minutes"));
    assert!(shown[2].body.starts_with("This task is due now"));
    h.engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_completed_before_first_tier_never_dispatches() {
    let h = Harness::new(MemoryItemStore::new(), Permission::Granted);
    h.engine.initialize().await.unwrap();
    let item = ReminderItem::task("t1", "Walk", start() + TimeDelta::seconds(65));

    h.store.upsert(item.clone());
    h.engine.flush().await.unwrap();
    assert_eq!(h.engine.registry().armed_tiers(&item.key()), vec!["1-min", "due-now"]);

    tokio::time::sleep(Duration::from_secs(4)).await;
    assert!(h.surface.shown().is_empty());

    h.store.set_completed(ItemKind::Task, "t1", true);
    h.engine.flush().await.unwrap();
    assert!(!h.engine.registry().has(&item.key()));

    tokio::time::sleep(Duration::from_secs(10 * 60)).await;
    assert_eq!(h.engine.dispatcher().dispatch_count(&item.key()), 0);
    assert!(h.surface.shown().is_empty());
    h.engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_after_one_minute_tier_only_due_now_remains() {
    let h = Harness::new(MemoryItemStore::new(), Permission::Granted);
    h.engine.initialize().await.unwrap();
    let item = ReminderItem::task("t1", "Walk", start() + TimeDelta::seconds(65));

    h.store.upsert(item.clone());
    h.engine.flush().await.unwrap();

    tokio::time::sleep(Duration::from_secs(5)).await;
    settle().await;

    assert_eq!(h.engine.registry().armed_tiers(&item.key()), vec!["due-now"]);
    assert_eq!(h.surface.tags(), vec!["1-min"]);

    h.store.set_completed(ItemKind::Task, "t1", true);
    h.engine.flush().await.unwrap();
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(h.engine.dispatcher().dispatch_count(&item.key()), 1);
    h.engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_denied_permission_uses_fallback_for_every_tier() {
    let h = Harness::new(
        MemoryItemStore::with_items([ReminderItem::note(
            "n1",
            "Call pharmacy",
            start() + TimeDelta::minutes(6),
        )]),
        Permission::Denied,
    );
    let mut fallback = h.engine.fallback().subscribe();

    let status = h.engine.initialize().await.unwrap();
    assert_eq!(status.permission, Permission::Denied);

    tokio::time::sleep(Duration::from_secs(7 * 60)).await;

    let mut messages = Vec::new();
    while let Ok(notice) = fallback.try_recv() {
        assert_eq!(notice.severity, Severity::Info);
        messages.push(notice.message);
    }
    assert_eq!(messages.len(), 3);
    assert!(messages.iter().all(|m| m.starts_with("Note Reminder: Call pharmacy - ")));
    assert!(h.surface.shown().is_empty());
    h.engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_leaves_no_live_timers() {
    let items = (0..5).map(|i| {
        ReminderItem::task(format!("t{i}"), "Chore", start() + TimeDelta::minutes(10 + i))
    });
    let h = Harness::new(MemoryItemStore::with_items(items), Permission::Granted);
    h.engine.initialize().await.unwrap();
    assert_eq!(h.engine.registry().armed_count(), 15);

    h.engine.shutdown().await;
    assert!(h.engine.registry().is_empty());

    h.store
        .upsert(ReminderItem::task("late", "Late", start() + TimeDelta::minutes(2)));
    tokio::time::sleep(Duration::from_secs(30 * 60)).await;

    assert!(h.surface.shown().is_empty());
    assert!(h.engine.registry().is_empty());
    assert!(!h.engine.resume_handle().signal());
}

#[tokio::test(start_paused = true)]
async fn test_resume_sweep_rearms_items_missed_by_feed() {
    let h = Harness::new(MemoryItemStore::new(), Permission::Granted);
    h.engine.initialize().await.unwrap();

    let report = h.engine.sweep_now().await.unwrap();
    assert_eq!(report.scanned, 0);

    h.store.disconnect_subscribers();
    settle().await;
    h.store
        .upsert(ReminderItem::task("t1", "Meds", h.now() + TimeDelta::minutes(3)));

    assert!(h.engine.resume_handle().signal());
    h.engine.flush().await.unwrap();

    let key = ScheduleKey::new(ItemKind::Task, "t1");
    assert_eq!(h.engine.registry().armed_tiers(&key), vec!["1-min", "due-now"]);
    h.engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_hung_surface_call_does_not_delay_other_items() {
    let h = Harness::new(
        MemoryItemStore::with_items([
            ReminderItem::task("stuck", "Stuck", start() + TimeDelta::minutes(3)),
            ReminderItem::note(
                "other",
                "Other",
                start() + TimeDelta::minutes(3) + TimeDelta::seconds(5),
            ),
        ]),
        Permission::Granted,
    );
    h.surface.hang_on("Stuck");
    h.engine.initialize().await.unwrap();

    // "Stuck" fires its 1-min tier at +2:00 and never returns from the surface.
    tokio::time::sleep(Duration::from_secs(2 * 60 + 4)).await;
    assert!(h.surface.shown().is_empty());

    tokio::time::sleep(Duration::from_secs(2)).await;
    let shown = h.surface.shown();
    assert_eq!(shown.len(), 1);
    assert_eq!(shown[0].title, "Note Reminder: Other");
    assert_eq!(shown[0].tag, "1-min");

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(h.surface.tags(), vec!["1-min", "due-now"]);
    assert!(h.surface.shown().iter().all(|n| n.title == "Note Reminder: Other"));

    let other = ScheduleKey::new(ItemKind::Note, "other");
    assert_eq!(h.engine.dispatcher().dispatch_count(&other), 2);
    tokio::time::timeout(Duration::from_secs(2), h.engine.shutdown())
        .await
        .expect("shutdown with a hung surface call");
}
