//! One schedule per item across feed edits, sweeps and completion.

use crate::helpers::{Harness, start};
use beacon::notify::Permission;
use beacon::store::MemoryItemStore;
use beacon::{ItemKind, ReminderItem, ScheduleKey};
use chrono::TimeDelta;
use std::time::Duration;

fn key() -> ScheduleKey {
    ScheduleKey::new(ItemKind::Task, "t1")
}

#[tokio::test(start_paused = true)]
async fn test_edit_sequence_keeps_one_entry_matching_latest_due() {
    let h = Harness::new(MemoryItemStore::new(), Permission::Granted);
    h.engine.initialize().await.unwrap();

    for minutes in [30, 3, 45, 20] {
        h.store
            .upsert(ReminderItem::task("t1", "Meds", start() + TimeDelta::minutes(minutes)));
    }
    h.engine.flush().await.unwrap();

    assert_eq!(h.engine.registry().len(), 1);
    assert_eq!(
        h.engine.registry().scheduled_due(&key()),
        Some(start() + TimeDelta::minutes(20))
    );
    assert_eq!(h.engine.registry().armed_count(), 3);

    tokio::time::sleep(Duration::from_secs(60 * 60)).await;
    assert_eq!(h.surface.tags(), vec!["5-min", "1-min", "due-now"]);
    h.engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_title_edit_keeps_cancel_handles() {
    let h = Harness::new(MemoryItemStore::new(), Permission::Granted);
    h.engine.initialize().await.unwrap();
    let due = start() + TimeDelta::minutes(15);

    h.store.upsert(ReminderItem::task("t1", "Meds", due));
    h.engine.flush().await.unwrap();
    let handles = h.engine.registry().handle_ids(&key());
    assert_eq!(handles.len(), 3);

    h.store.upsert(ReminderItem::task("t1", "Evening meds", due));
    h.engine.flush().await.unwrap();

    assert_eq!(h.engine.registry().handle_ids(&key()), handles);

    tokio::time::sleep(Duration::from_secs(16 * 60)).await;
    let shown = h.surface.shown();
    assert_eq!(shown.len(), 3);
    assert!(shown.iter().all(|n| n.title == "Task Reminder: Evening meds"));
    h.engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_due_change_replaces_every_timer() {
    let h = Harness::new(MemoryItemStore::new(), Permission::Granted);
    h.engine.initialize().await.unwrap();

    h.store
        .upsert(ReminderItem::task("t1", "Meds", start() + TimeDelta::minutes(15)));
    h.engine.flush().await.unwrap();
    let before = h.engine.registry().handle_ids(&key());

    h.store
        .upsert(ReminderItem::task("t1", "Meds", start() + TimeDelta::minutes(40)));
    h.engine.flush().await.unwrap();
    let after = h.engine.registry().handle_ids(&key());

    assert_eq!(after.len(), 3);
    assert!(after.iter().all(|id| !before.contains(id)));

    tokio::time::sleep(Duration::from_secs(20 * 60)).await;
    assert!(h.surface.shown().is_empty());
    h.engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_reopened_item_is_rescheduled() {
    let h = Harness::new(MemoryItemStore::new(), Permission::Granted);
    h.engine.initialize().await.unwrap();

    h.store
        .upsert(ReminderItem::task("t1", "Meds", start() + TimeDelta::minutes(15)));
    h.store.set_completed(ItemKind::Task, "t1", true);
    h.engine.flush().await.unwrap();
    assert!(h.engine.registry().is_empty());

    h.store.set_completed(ItemKind::Task, "t1", false);
    h.engine.flush().await.unwrap();
    assert_eq!(h.engine.registry().armed_count(), 3);
    h.engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_note_losing_its_reminder_is_unscheduled() {
    let h = Harness::new(MemoryItemStore::new(), Permission::Granted);
    h.engine.initialize().await.unwrap();
    let note_key = ScheduleKey::new(ItemKind::Note, "n1");

    h.store
        .upsert(ReminderItem::note("n1", "Call", start() + TimeDelta::minutes(15)));
    h.engine.flush().await.unwrap();
    assert!(h.engine.registry().has(&note_key));

    h.store
        .upsert(ReminderItem::new(ItemKind::Note, "n1", "Call", None));
    h.engine.flush().await.unwrap();
    assert!(!h.engine.registry().has(&note_key));

    tokio::time::sleep(Duration::from_secs(20 * 60)).await;
    assert!(h.surface.shown().is_empty());
    h.engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_task_and_note_with_same_id_are_distinct() {
    let due = start() + TimeDelta::minutes(15);
    let h = Harness::new(
        MemoryItemStore::with_items([
            ReminderItem::task("x", "Task", due),
            ReminderItem::note("x", "Note", due),
        ]),
        Permission::Granted,
    );
    h.engine.initialize().await.unwrap();

    assert_eq!(h.engine.registry().len(), 2);
    h.store.remove(&ScheduleKey::new(ItemKind::Note, "x"));
    h.engine.flush().await.unwrap();

    assert!(h.engine.registry().has(&ScheduleKey::new(ItemKind::Task, "x")));
    assert_eq!(h.engine.registry().len(), 1);
    h.engine.shutdown().await;
}
