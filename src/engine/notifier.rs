//! User notifications.

use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

use crate::reconciler::Notification;

/// Surface for local user notifications.
#[cfg_attr(test, mockall::automock)]
pub trait Notifier: Send + Sync {
    /// Ask for permission to notify. Called once at startup.
    fn request_permission(&self) -> bool;

    /// Show a notification.
    fn notify(&self, notification: &Notification);
}

/// Emits notifications as log events.
#[derive(Debug, Default)]
pub struct TracingNotifier {
    enabled: bool,
    granted: AtomicBool,
}

impl TracingNotifier {
    pub fn new(enabled: bool) -> Self {
        Self { enabled, granted: AtomicBool::new(false) }
    }
}

impl Notifier for TracingNotifier {
    fn request_permission(&self) -> bool {
        self.granted.store(self.enabled, Ordering::Relaxed);
        info!(granted = self.enabled, "Notification permission requested");
        self.enabled
    }

    fn notify(&self, notification: &Notification) {
        if self.granted.load(Ordering::Relaxed) {
            info!(title = %notification.title, body = %notification.body, "🔔 Notification");
        }
    }
}
