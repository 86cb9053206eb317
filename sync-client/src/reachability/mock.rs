//! Mock connectivity source for testing.

use super::{Capabilities, CallbackToken, ConnectivitySource, PlatformSignal, SignalCallback};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Scriptable connectivity source.
///
/// Clones share state. Signals are fired synchronously on the calling
/// thread, outside the internal lock.
#[derive(Clone, Default)]
pub struct MockConnectivity {
    inner: Arc<Mutex<MockConnectivityInner>>,
}

#[derive(Default)]
struct MockConnectivityInner {
    current: Option<Capabilities>,
    callbacks: Vec<(CallbackToken, SignalCallback)>,
    next_token: u64,
}

impl MockConnectivity {
    /// Create a source with no active network.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a source whose active network has `caps`.
    pub fn online(caps: Capabilities) -> Self {
        let source = Self::new();
        source.lock().current = Some(caps);
        source
    }

    fn lock(&self) -> MutexGuard<'_, MockConnectivityInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Deliver a raw signal to every registered callback.
    pub fn fire(&self, signal: PlatformSignal) {
        let callbacks: Vec<SignalCallback> =
            self.lock().callbacks.iter().map(|(_, c)| Arc::clone(c)).collect();
        for callback in callbacks {
            callback(signal);
        }
    }

    /// Bring a network up: fires `Available` then `CapabilitiesChanged`.
    pub fn go_online(&self, caps: Capabilities) {
        self.lock().current = Some(caps);
        self.fire(PlatformSignal::Available);
        self.fire(PlatformSignal::CapabilitiesChanged(caps));
    }

    /// Drop the network: fires `Lost`.
    pub fn go_offline(&self) {
        self.lock().current = None;
        self.fire(PlatformSignal::Lost);
    }

    /// Change capabilities of the active network.
    pub fn set_capabilities(&self, caps: Capabilities) {
        self.lock().current = Some(caps);
        self.fire(PlatformSignal::CapabilitiesChanged(caps));
    }

    /// Number of registered callbacks.
    pub fn callback_count(&self) -> usize {
        self.lock().callbacks.len()
    }
}

impl ConnectivitySource for MockConnectivity {
    fn current(&self) -> Option<Capabilities> {
        self.lock().current
    }

    fn register(&self, callback: SignalCallback) -> CallbackToken {
        let mut inner = self.lock();
        inner.next_token += 1;
        let token = CallbackToken(inner.next_token);
        inner.callbacks.push((token, callback));
        token
    }

    fn unregister(&self, token: CallbackToken) {
        self.lock().callbacks.retain(|(t, _)| *t != token);
    }
}
