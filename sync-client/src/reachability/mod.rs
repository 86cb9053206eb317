//! Network reachability monitoring.
//!
//! [`ReachabilityMonitor`] wraps a platform [`ConnectivitySource`], keeps
//! the process-wide [`NetworkStatus`] in a `watch` channel and forwards
//! transitions to one registered [`ReachabilityObserver`].
//!
//! Platform callbacks may arrive on any thread. The status is updated
//! before the observer is called, so an observer reading the status
//! channel always sees the transition it is being told about.

mod mock;

pub use mock::MockConnectivity;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tablesync_types::{NetworkStatus, TransportKind};
use tokio::sync::watch;

/// Capabilities of the active network as reported by the platform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// Carried over wireless LAN.
    pub wifi: bool,
    /// Carried over mobile data.
    pub cellular: bool,
    /// Claims internet access.
    pub internet: bool,
    /// Internet access was validated by the platform.
    pub validated: bool,
}

impl Capabilities {
    /// Validated internet over wifi.
    pub const fn wifi() -> Self {
        Self {
            wifi: true,
            cellular: false,
            internet: true,
            validated: true,
        }
    }

    /// Validated internet over mobile data.
    pub const fn cellular() -> Self {
        Self {
            wifi: false,
            cellular: true,
            internet: true,
            validated: true,
        }
    }

    /// Usable only with validated internet access.
    pub fn is_usable(&self) -> bool {
        self.internet && self.validated
    }

    /// Transport kind, preferring wifi over cellular.
    pub fn transport(&self) -> TransportKind {
        if self.wifi {
            TransportKind::Wifi
        } else if self.cellular {
            TransportKind::Cellular
        } else {
            TransportKind::Other
        }
    }

    /// Network status implied by these capabilities.
    pub fn status(&self) -> NetworkStatus {
        if self.is_usable() {
            NetworkStatus::online(self.transport())
        } else {
            NetworkStatus::offline()
        }
    }
}

/// Raw callback from the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformSignal {
    /// A network became available.
    Available,
    /// The network was lost.
    Lost,
    /// Capabilities of the active network changed.
    CapabilitiesChanged(Capabilities),
}

/// Callback registered with a [`ConnectivitySource`].
pub type SignalCallback = Arc<dyn Fn(PlatformSignal) + Send + Sync>;

/// Handle for unregistering a callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackToken(pub u64);

/// Platform connectivity service.
pub trait ConnectivitySource: Send + Sync {
    /// Capabilities of the active network, `None` if there is none.
    fn current(&self) -> Option<Capabilities>;

    /// Register a callback for connectivity changes.
    fn register(&self, callback: SignalCallback) -> CallbackToken;

    /// Remove a registered callback. Unknown tokens are ignored.
    fn unregister(&self, token: CallbackToken);
}

/// Receives reachability transitions.
pub trait ReachabilityObserver: Send + Sync {
    /// A usable network became available.
    fn on_available(&self);

    /// The network was lost.
    fn on_lost(&self);

    /// Transport or validation changed.
    fn on_capabilities_changed(&self, is_wifi: bool, is_cellular: bool);
}

struct Shared {
    status: watch::Sender<NetworkStatus>,
    observer: Mutex<Option<Arc<dyn ReachabilityObserver>>>,
}

impl Shared {
    fn observer(&self) -> MutexGuard<'_, Option<Arc<dyn ReachabilityObserver>>> {
        self.observer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn handle(&self, signal: PlatformSignal, source: &dyn ConnectivitySource) {
        match signal {
            PlatformSignal::Available => {
                let transport = source
                    .current()
                    .map(|c| c.transport())
                    .unwrap_or(TransportKind::Other);
                tracing::debug!("Network became available ({})", transport);
                self.status.send_replace(NetworkStatus::online(transport));
            }
            PlatformSignal::Lost => {
                tracing::debug!("Network lost");
                self.status.send_replace(NetworkStatus::offline());
            }
            PlatformSignal::CapabilitiesChanged(caps) => {
                tracing::debug!(
                    "Network capabilities changed - wifi: {}, cellular: {}, internet: {}, validated: {}",
                    caps.wifi,
                    caps.cellular,
                    caps.internet,
                    caps.validated
                );
                self.status.send_replace(caps.status());
            }
        }

        // Call outside the lock; observers may query the monitor.
        let observer = self.observer().clone();
        if let Some(observer) = observer {
            match signal {
                PlatformSignal::Available => observer.on_available(),
                PlatformSignal::Lost => observer.on_lost(),
                PlatformSignal::CapabilitiesChanged(caps) => {
                    observer.on_capabilities_changed(caps.wifi, caps.cellular)
                }
            }
        }
    }
}

/// Tracks whether a usable network path exists.
pub struct ReachabilityMonitor {
    source: Arc<dyn ConnectivitySource>,
    shared: Arc<Shared>,
    token: Mutex<Option<CallbackToken>>,
}

impl ReachabilityMonitor {
    /// Create a monitor, reading the current status from `source`.
    pub fn new(source: Arc<dyn ConnectivitySource>) -> Self {
        let initial = source.current().map(|c| c.status()).unwrap_or_default();
        tracing::debug!("Reachability initialized, available: {}", initial.available);
        let (status, _) = watch::channel(initial);
        Self {
            source,
            shared: Arc::new(Shared {
                status,
                observer: Mutex::new(None),
            }),
            token: Mutex::new(None),
        }
    }

    fn token(&self) -> MutexGuard<'_, Option<CallbackToken>> {
        self.token.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start monitoring, reporting to `observer`.
    ///
    /// The current status is reported to the observer before this returns.
    /// Starting again replaces the previous observer and registration.
    pub fn start(&self, observer: Arc<dyn ReachabilityObserver>) {
        self.stop();
        tracing::debug!("Starting network monitoring");

        *self.shared.observer() = Some(Arc::clone(&observer));

        let shared: Weak<Shared> = Arc::downgrade(&self.shared);
        let source = Arc::downgrade(&self.source);
        let callback: SignalCallback = Arc::new(move |signal| {
            if let (Some(shared), Some(source)) = (shared.upgrade(), source.upgrade()) {
                shared.handle(signal, source.as_ref());
            }
        });
        *self.token() = Some(self.source.register(callback));

        let current = self.source.current().map(|c| c.status()).unwrap_or_default();
        self.shared.status.send_replace(current);
        if current.available {
            observer.on_available();
        } else {
            observer.on_lost();
        }
    }

    /// Stop monitoring. Safe to call when not started.
    pub fn stop(&self) {
        if let Some(token) = self.token().take() {
            tracing::debug!("Stopping network monitoring");
            self.source.unregister(token);
        }
        *self.shared.observer() = None;
    }

    /// Whether the monitor has a registered callback.
    pub fn is_started(&self) -> bool {
        self.token().is_some()
    }

    /// Latest status.
    pub fn status(&self) -> NetworkStatus {
        *self.shared.status.borrow()
    }

    /// Receiver that tracks every status change.
    pub fn subscribe_status(&self) -> watch::Receiver<NetworkStatus> {
        self.shared.status.subscribe()
    }

    /// Diagnostic summary of the active network.
    pub fn describe(&self) -> String {
        match self.source.current() {
            None => "No active network".to_string(),
            Some(caps) => format!(
                "Network available: {}\nWiFi: {}\nCellular: {}\nInternet: {}\nValidated: {}",
                self.status().available,
                caps.wifi,
                caps.cellular,
                caps.internet,
                caps.validated
            ),
        }
    }
}

impl Drop for ReachabilityMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Seen {
        Available,
        Lost,
        Changed(bool, bool),
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<Seen>>);

    impl Recorder {
        fn seen(&self) -> Vec<Seen> {
            self.0.lock().unwrap().clone()
        }
    }

    impl ReachabilityObserver for Recorder {
        fn on_available(&self) {
            self.0.lock().unwrap().push(Seen::Available);
        }
        fn on_lost(&self) {
            self.0.lock().unwrap().push(Seen::Lost);
        }
        fn on_capabilities_changed(&self, is_wifi: bool, is_cellular: bool) {
            self.0.lock().unwrap().push(Seen::Changed(is_wifi, is_cellular));
        }
    }

    fn monitor(source: &MockConnectivity) -> (ReachabilityMonitor, Arc<Recorder>) {
        let monitor = ReachabilityMonitor::new(Arc::new(source.clone()));
        let recorder = Arc::new(Recorder::default());
        (monitor, recorder)
    }

    // ===========================================
    // Capabilities Tests
    // ===========================================

    #[test]
    fn usable_needs_internet_and_validation() {
        assert!(Capabilities::wifi().is_usable());
        let unvalidated = Capabilities {
            validated: false,
            ..Capabilities::wifi()
        };
        assert!(!unvalidated.is_usable());
        assert_eq!(unvalidated.status(), NetworkStatus::offline());
    }

    #[test]
    fn transport_prefers_wifi() {
        let both = Capabilities {
            cellular: true,
            ..Capabilities::wifi()
        };
        assert_eq!(both.transport(), TransportKind::Wifi);
        assert_eq!(Capabilities::cellular().transport(), TransportKind::Cellular);
        let wired = Capabilities {
            internet: true,
            validated: true,
            ..Capabilities::default()
        };
        assert_eq!(wired.transport(), TransportKind::Other);
    }

    // ===========================================
    // Monitor Tests
    // ===========================================

    #[test]
    fn start_reports_current_status_synchronously() {
        let source = MockConnectivity::online(Capabilities::wifi());
        let (monitor, recorder) = monitor(&source);

        monitor.start(recorder.clone());

        assert_eq!(recorder.seen(), vec![Seen::Available]);
        assert_eq!(monitor.status(), NetworkStatus::online(TransportKind::Wifi));
        assert!(monitor.is_started());
    }

    #[test]
    fn start_offline_reports_lost() {
        let source = MockConnectivity::new();
        let (monitor, recorder) = monitor(&source);

        monitor.start(recorder.clone());

        assert_eq!(recorder.seen(), vec![Seen::Lost]);
        assert!(!monitor.status().available);
    }

    #[test]
    fn transitions_update_status_and_observer() {
        let source = MockConnectivity::new();
        let (monitor, recorder) = monitor(&source);
        monitor.start(recorder.clone());

        source.go_online(Capabilities::cellular());
        assert_eq!(monitor.status(), NetworkStatus::online(TransportKind::Cellular));

        source.go_offline();
        assert!(!monitor.status().available);

        assert_eq!(
            recorder.seen(),
            vec![
                Seen::Lost,
                Seen::Available,
                Seen::Changed(false, true),
                Seen::Lost
            ]
        );
    }

    #[test]
    fn capabilities_change_recomputes_availability() {
        let source = MockConnectivity::online(Capabilities::wifi());
        let (monitor, recorder) = monitor(&source);
        monitor.start(recorder.clone());

        source.set_capabilities(Capabilities {
            validated: false,
            ..Capabilities::wifi()
        });

        assert!(!monitor.status().available);
        assert_eq!(recorder.seen().last(), Some(&Seen::Changed(true, false)));
    }

    #[tokio::test]
    async fn status_channel_tracks_changes() {
        let source = MockConnectivity::new();
        let (monitor, recorder) = monitor(&source);
        let mut rx = monitor.subscribe_status();
        monitor.start(recorder);

        source.go_online(Capabilities::wifi());
        rx.changed().await.unwrap();
        assert!(rx.borrow_and_update().available);
    }

    #[test]
    fn stop_unregisters_and_silences_observer() {
        let source = MockConnectivity::online(Capabilities::wifi());
        let (monitor, recorder) = monitor(&source);
        monitor.start(recorder.clone());
        assert_eq!(source.callback_count(), 1);

        monitor.stop();
        assert_eq!(source.callback_count(), 0);
        assert!(!monitor.is_started());

        source.go_offline();
        assert_eq!(recorder.seen(), vec![Seen::Available]);
    }

    #[test]
    fn stop_without_start_is_tolerated() {
        let source = MockConnectivity::new();
        let (monitor, _) = monitor(&source);
        monitor.stop();
        monitor.stop();
        assert_eq!(source.callback_count(), 0);
    }

    #[test]
    fn restart_keeps_single_registration() {
        let source = MockConnectivity::new();
        let (monitor, recorder) = monitor(&source);
        monitor.start(recorder.clone());
        monitor.start(recorder);
        assert_eq!(source.callback_count(), 1);
    }

    #[test]
    fn drop_unregisters() {
        let source = MockConnectivity::new();
        let (monitor, recorder) = monitor(&source);
        monitor.start(recorder);
        drop(monitor);
        assert_eq!(source.callback_count(), 0);
    }

    #[test]
    fn describe_lists_capabilities() {
        let source = MockConnectivity::new();
        let (offline, _) = monitor(&source);
        assert_eq!(offline.describe(), "No active network");

        let source = MockConnectivity::online(Capabilities::wifi());
        let (monitor, _) = monitor(&source);
        let text = monitor.describe();
        assert!(text.contains("Network available: true"));
        assert!(text.contains("WiFi: true"));
        assert!(text.contains("Cellular: false"));
    }
}
