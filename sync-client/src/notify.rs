//! Local alerts for tables that need cleaning.
//!
//! One alert per table, keyed by the table's numeric key, so re-posting
//! replaces the previous alert and cancelling is addressed by the same key.

use dashmap::DashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tablesync_core::Alert;
use tablesync_types::TableKey;

use crate::config::NotificationConfig;

/// Platform notification sink.
///
/// Posting with an id that is already showing replaces it; cancelling an
/// id that is not showing is a no-op.
pub trait Notifier: Send + Sync {
    /// Show or replace the alert with `notification_id`.
    ///
    /// `target` is the external id of the table to highlight when the
    /// alert is opened.
    fn post(&self, channel_id: &str, notification_id: u32, title: &str, body: &str, target: &str);

    /// Withdraw the alert with `notification_id`.
    fn cancel(&self, notification_id: u32);
}

/// Turns [`Alert`]s into notifier calls with the configured wording.
#[derive(Clone)]
pub struct NotificationDispatcher {
    notifier: Arc<dyn Notifier>,
    channel_id: String,
    title: String,
}

impl NotificationDispatcher {
    /// Create a dispatcher using `config` for the channel and title.
    pub fn new(notifier: Arc<dyn Notifier>, config: &NotificationConfig) -> Self {
        Self {
            notifier,
            channel_id: config.channel_id.clone(),
            title: config.title.clone(),
        }
    }

    /// Body text for a table alert.
    pub fn body(key: TableKey) -> String {
        format!("Table {} needs cleaning!", key)
    }

    /// Raise the alert for `key`, highlighting `entity_id` when opened.
    pub fn notify(&self, key: TableKey, entity_id: &str) {
        tracing::debug!("Notifying for table {} ({})", key, entity_id);
        self.notifier.post(
            &self.channel_id,
            key.value(),
            &self.title,
            &Self::body(key),
            entity_id,
        );
    }

    /// Withdraw the alert for `key`.
    pub fn cancel(&self, key: TableKey) {
        tracing::debug!("Cancelling notification for table {}", key);
        self.notifier.cancel(key.value());
    }

    /// Apply an alert decision from the reconciler.
    pub fn dispatch(&self, alert: &Alert) {
        match alert {
            Alert::Raise { key, id } => self.notify(*key, id),
            Alert::Withdraw { key } => self.cancel(*key),
        }
    }
}

/// A notifier call, as recorded by [`RecordingNotifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifierCall {
    /// `post` was called.
    Post {
        /// Channel the alert was posted on.
        channel_id: String,
        /// Alert id.
        notification_id: u32,
        /// Alert title.
        title: String,
        /// Alert body.
        body: String,
        /// Table id to highlight.
        target: String,
    },
    /// `cancel` was called.
    Cancel {
        /// Alert id.
        notification_id: u32,
    },
}

/// Notifier that keeps alerts in memory.
///
/// Tracks which alerts are showing and records every call in order.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    showing: DashMap<u32, String>,
    calls: Mutex<Vec<NotifierCall>>,
}

impl RecordingNotifier {
    /// Create an empty notifier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the alert with `notification_id` is showing.
    pub fn is_showing(&self, notification_id: u32) -> bool {
        self.showing.contains_key(&notification_id)
    }

    /// Body of the alert with `notification_id`, if showing.
    pub fn body(&self, notification_id: u32) -> Option<String> {
        self.showing.get(&notification_id).map(|b| b.clone())
    }

    /// Ids of all showing alerts, sorted.
    pub fn showing(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.showing.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();
        ids
    }

    /// Every call so far.
    pub fn calls(&self) -> Vec<NotifierCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, call: NotifierCall) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }
}

impl Notifier for RecordingNotifier {
    fn post(&self, channel_id: &str, notification_id: u32, title: &str, body: &str, target: &str) {
        self.showing.insert(notification_id, body.to_string());
        self.record(NotifierCall::Post {
            channel_id: channel_id.to_string(),
            notification_id,
            title: title.to_string(),
            body: body.to_string(),
            target: target.to_string(),
        });
    }

    fn cancel(&self, notification_id: u32) {
        self.showing.remove(&notification_id);
        self.record(NotifierCall::Cancel { notification_id });
    }
}
