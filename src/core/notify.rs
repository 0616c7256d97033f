//! Transient user notifications
//!
//! Table operations never surface failures as panics or hard errors to the
//! presentation layer; they queue a [`Notification`] instead.

use serde::{Deserialize, Serialize};

/// Display time of a notification when none is given
pub const DEFAULT_DURATION_MS: u64 = 5000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Success,
    Error,
    Info,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub kind: NotificationKind,
    pub message: String,
    pub duration_ms: u64,
}

impl Notification {
    pub fn new(kind: NotificationKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            duration_ms: DEFAULT_DURATION_MS,
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(NotificationKind::Success, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(NotificationKind::Error, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(NotificationKind::Info, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(NotificationKind::Warning, message)
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }
}

/// Pending notifications, drained by the presentation layer
#[derive(Debug, Clone, Default)]
pub struct Notifications {
    queue: Vec<Notification>,
}

impl Notifications {
    pub fn push(&mut self, notification: Notification) {
        match notification.kind {
            NotificationKind::Error | NotificationKind::Warning => {
                tracing::warn!(message = %notification.message, "notification")
            }
            _ => tracing::info!(message = %notification.message, "notification"),
        }
        self.queue.push(notification);
    }

    /// Remove and return every pending notification
    pub fn take(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.queue)
    }

    pub fn peek(&self) -> &[Notification] {
        &self.queue
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
