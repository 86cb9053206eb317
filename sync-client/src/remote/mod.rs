//! Remote stream abstraction for tablesync.
//!
//! This module provides a pluggable boundary to the push-based service
//! that holds the table collection (hosted realtime database, mock for
//! testing).
//!
//! # Design
//!
//! The stream is subscription-oriented:
//! - `subscribe()` attaches a listener to a path and returns a handle
//! - events are pushed into the [`EventSink`] from any thread
//! - `unsubscribe()` detaches the listener
//!
//! Attaching never reports failure through the event channel; if the
//! service refuses the listener later, it delivers
//! [`RemoteEvent::Cancelled`] instead. A synchronous `Err` from
//! `subscribe()` means the request could not even be issued.
//!
//! # Example
//!
//! ```ignore
//! let remote = MockRemote::new();
//! let sub = remote.subscribe("tables", sink).await?;
//! remote.emit(RemoteEvent::removed("table_3"));
//! remote.unsubscribe(sub).await;
//! ```

mod mock;

pub use mock::MockRemote;

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tablesync_types::{RemoteEvent, SubscriptionId, TablePayload};
use thiserror::Error;

/// Remote stream errors.
#[derive(Debug, Clone, Error)]
pub enum RemoteError {
    /// Could not reach the service.
    #[error("network failure: {0}")]
    Network(String),

    /// The request timed out.
    #[error("subscribe timed out")]
    Timeout,

    /// The service refused the listener.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The path or query is malformed.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// The service client is shut down.
    #[error("stream closed")]
    Closed,
}

impl RemoteError {
    /// Failure type name used for classification.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Network(_) => "NetworkError",
            Self::Timeout => "TimeoutError",
            Self::PermissionDenied(_) => "SecurityError",
            Self::InvalidPath(_) => "IllegalArgumentError",
            Self::Closed => "StreamClosed",
        }
    }
}

/// Handle to one attached listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    /// Unique id of this attach.
    pub id: SubscriptionId,
    /// Path the listener is attached to.
    pub path: String,
}

impl Subscription {
    /// Create a handle for a fresh attach.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            id: SubscriptionId::new(),
            path: path.into(),
        }
    }
}

/// Callback the stream pushes events into.
///
/// Cheap to clone and safe to call from any thread. Returns `false` once
/// the receiving side is gone.
#[derive(Clone)]
pub struct EventSink(Arc<dyn Fn(RemoteEvent) -> bool + Send + Sync>);

impl EventSink {
    /// Wrap a delivery function.
    pub fn new(deliver: impl Fn(RemoteEvent) -> bool + Send + Sync + 'static) -> Self {
        Self(Arc::new(deliver))
    }

    /// Deliver one event.
    pub fn send(&self, event: RemoteEvent) -> bool {
        (self.0)(event)
    }
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EventSink")
    }
}

/// Which child callback a payload came through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildChange {
    /// Child added.
    Added,
    /// Child changed.
    Changed,
}

/// Turn a raw child callback into a [`RemoteEvent`].
///
/// Children delivered without any data are dropped and logged. A payload
/// that is present but does not decode is treated as carrying no status.
pub fn child_event(
    change: ChildChange,
    key: &str,
    payload: Option<&serde_json::Value>,
) -> Option<RemoteEvent> {
    let value = match payload {
        Some(value) if !value.is_null() => value.clone(),
        _ => {
            tracing::warn!("{:?}: received null data for table {}", change, key);
            return None;
        }
    };

    let payload = TablePayload::from_value(value).unwrap_or_else(|e| {
        tracing::warn!("{:?}: undecodable payload for table {}: {}", change, key, e);
        TablePayload::default()
    });

    Some(match change {
        ChildChange::Added => RemoteEvent::added(key, &payload),
        ChildChange::Changed => RemoteEvent::changed(key, &payload),
    })
}

/// Remote stream trait for attaching to the keyed table collection.
///
/// Implementations handle the underlying service client
/// (hosted realtime database, mock, etc).
#[async_trait]
pub trait RemoteStream: Send + Sync {
    /// Attach a listener to `path`, delivering every event into `sink`.
    async fn subscribe(&self, path: &str, sink: EventSink) -> Result<Subscription, RemoteError>;

    /// Detach a listener. Unknown handles are ignored.
    async fn unsubscribe(&self, subscription: Subscription);
}
