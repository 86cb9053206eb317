//! Mock remote stream for testing.
//!
//! Captures attached listeners so tests can push collection events and
//! cancellations into them, and lets tests force subscribe failures.

use super::{child_event, ChildChange, EventSink, RemoteError, RemoteStream, Subscription};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tablesync_types::{RemoteEvent, StreamErrorCode, SubscriptionId};

/// Mock remote stream for testing.
///
/// Clones share state, so a test can keep one handle while the coordinator
/// owns another.
#[derive(Debug, Default, Clone)]
pub struct MockRemote {
    inner: Arc<Mutex<MockRemoteInner>>,
}

#[derive(Debug, Default)]
struct MockRemoteInner {
    active: Vec<(Subscription, EventSink)>,
    issued_sinks: Vec<EventSink>,
    subscribe_calls: Vec<String>,
    unsubscribe_calls: Vec<SubscriptionId>,
    fail_next_subscribe: Option<RemoteError>,
    cancel_on_subscribe: Option<(StreamErrorCode, String)>,
}

impl MockRemote {
    /// Create a new mock remote.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockRemoteInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Push an event into every attached listener.
    ///
    /// A cancellation also drops the listeners it was delivered to, like a
    /// real stream does. Returns the number of listeners reached.
    pub fn emit(&self, event: RemoteEvent) -> usize {
        let sinks: Vec<EventSink> = {
            let mut inner = self.lock();
            let sinks = inner.active.iter().map(|(_, s)| s.clone()).collect();
            if event.is_terminal() {
                inner.active.clear();
            }
            sinks
        };
        // Deliver outside the lock; sinks may call back into the mock.
        sinks.iter().filter(|s| s.send(event.clone())).count()
    }

    /// Push a raw child payload, dropping it like the real stream would
    /// when it carries no data.
    pub fn emit_child(
        &self,
        change: ChildChange,
        key: &str,
        payload: Option<&serde_json::Value>,
    ) -> usize {
        match child_event(change, key, payload) {
            Some(event) => self.emit(event),
            None => 0,
        }
    }

    /// Cancel every attached listener with the given code.
    pub fn cancel(&self, code: StreamErrorCode, message: &str) -> usize {
        self.emit(RemoteEvent::cancelled(code, message))
    }

    /// Cause the next `subscribe()` to fail with the given error.
    pub fn fail_next_subscribe(&self, error: RemoteError) {
        self.lock().fail_next_subscribe = Some(error);
    }

    /// Cause the next `subscribe()` to succeed and then immediately
    /// cancel, the way the service rejects a listener it is not allowed
    /// to attach.
    pub fn cancel_next_subscribe(&self, code: StreamErrorCode, message: &str) {
        self.lock().cancel_on_subscribe = Some((code, message.to_string()));
    }

    /// Every sink ever handed to `subscribe()`, detached ones included.
    ///
    /// Lets tests deliver late events on a listener that was already
    /// detached.
    pub fn issued_sinks(&self) -> Vec<EventSink> {
        self.lock().issued_sinks.clone()
    }

    /// Number of currently attached listeners.
    pub fn active_count(&self) -> usize {
        self.lock().active.len()
    }

    /// Paths of every `subscribe()` call, in order.
    pub fn subscribe_calls(&self) -> Vec<String> {
        self.lock().subscribe_calls.clone()
    }

    /// Ids of every `unsubscribe()` call, in order.
    pub fn unsubscribe_calls(&self) -> Vec<SubscriptionId> {
        self.lock().unsubscribe_calls.clone()
    }

    /// Clear all state.
    pub fn reset(&self) {
        *self.lock() = MockRemoteInner::default();
    }
}

#[async_trait]
impl RemoteStream for MockRemote {
    async fn subscribe(&self, path: &str, sink: EventSink) -> Result<Subscription, RemoteError> {
        let rejection = {
            let mut inner = self.lock();
            inner.subscribe_calls.push(path.to_string());
            inner.issued_sinks.push(sink.clone());

            if let Some(error) = inner.fail_next_subscribe.take() {
                return Err(error);
            }
            inner.cancel_on_subscribe.take()
        };

        let subscription = Subscription::new(path);
        match rejection {
            Some((code, message)) => {
                sink.send(RemoteEvent::cancelled(code, message));
            }
            None => self.lock().active.push((subscription.clone(), sink)),
        }
        Ok(subscription)
    }

    async fn unsubscribe(&self, subscription: Subscription) {
        let mut inner = self.lock();
        inner.unsubscribe_calls.push(subscription.id);
        inner.active.retain(|(s, _)| s.id != subscription.id);
    }
}
