//! User-facing notices.
//!
//! The session monitor announces idle warnings and idle logouts through a
//! [`Notifier`]; whatever renders the UI subscribes and shows them.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Default channel capacity.
const DEFAULT_CAPACITY: usize = 32;

/// Severity of a notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// A message to show the user for `duration`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    pub duration: Duration,
}

/// Publish/subscribe channel for [`Notice`]s, backed by
/// [`tokio::sync::broadcast`]. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Notifier {
    sender: broadcast::Sender<Notice>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish a notice. Returns how many subscribers will see it; with no
    /// subscribers the notice is dropped.
    pub fn publish(&self, notice: Notice) -> usize {
        match self.sender.send(notice) {
            Ok(n) => n,
            Err(_) => {
                tracing::trace!("notice published but no active subscribers");
                0
            }
        }
    }

    pub fn warning(&self, message: impl Into<String>, duration: Duration) -> usize {
        self.publish(Notice {
            level: NoticeLevel::Warning,
            message: message.into(),
            duration,
        })
    }

    /// Receive notices published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.sender.subscribe()
    }
}
