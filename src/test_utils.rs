//! Shared test utilities used across unit test modules.

#![allow(clippy::expect_used)]

use crate::notify::surface::{Notification, NotificationSurface, Permission};
use async_trait::async_trait;
use std::sync::Mutex;

/// Surface that records every notification it is asked to show.
pub struct RecordingSurface {
    permission: Permission,
    fail: bool,
    shown: Mutex<Vec<Notification>>,
}

impl RecordingSurface {
    /// Permission granted; every `show` succeeds.
    pub fn granted() -> Self {
        Self::build(Permission::Granted, false)
    }

    /// Permission denied; `show` must never be called.
    pub fn denied() -> Self {
        Self::build(Permission::Denied, false)
    }

    /// Permission granted, but permission requests and `show` fail.
    pub fn failing() -> Self {
        Self::build(Permission::Granted, true)
    }

    fn build(permission: Permission, fail: bool) -> Self {
        Self {
            permission,
            fail,
            shown: Mutex::new(Vec::new()),
        }
    }

    /// Notifications shown so far.
    pub fn shown(&self) -> Vec<Notification> {
        self.shown.lock().expect("recording surface lock").clone()
    }
}

#[async_trait]
impl NotificationSurface for RecordingSurface {
    fn permission(&self) -> Permission {
        self.permission
    }

    async fn request_permission(&self) -> crate::Result<Permission> {
        if self.fail {
            return Err(crate::ReminderError::Notification(
                "permission prompt crashed".to_owned(),
            ));
        }
        Ok(self.permission)
    }

    async fn show(&self, notification: &Notification) -> crate::Result<()> {
        if self.fail {
            return Err(crate::ReminderError::Notification(
                "surface refused notification".to_owned(),
            ));
        }
        self.shown
            .lock()
            .expect("recording surface lock")
            .push(notification.clone());
        Ok(())
    }
}
