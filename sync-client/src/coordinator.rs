//! SyncCoordinator - owns the single remote subscription.
//!
//! The coordinator is an actor: one task owns the [`SyncMachine`], the
//! [`TableReconciler`] and the subscription handle, and every input
//! (explicit start/shutdown, reachability signals, stream events, retry
//! timer) arrives as a message on one queue. That queue is the only
//! serialization point; no locks guard coordinator state.
//!
//! # Architecture
//!
//! ```text
//! ReachabilityMonitor ─┐
//! RemoteStream sink ───┼─► command queue ─► actor ─► SyncMachine (sync-core)
//! retry timer ─────────┤                      │
//! CoordinatorHandle ───┘                      ├─► RemoteStream (attach/detach)
//!                                             ├─► NotificationDispatcher
//!                                             └─► Update channel
//! ```
//!
//! Every attach and detach bumps an epoch. Stream events carry the epoch
//! of the listener that produced them, so events still in flight from a
//! detached listener are dropped instead of being applied.
//!
//! # Example
//!
//! ```ignore
//! let (handle, mut updates) = SyncCoordinator::spawn(context, remote, notifier, network);
//! monitor.start(Arc::new(handle.clone()));
//! handle.start().await?;
//! while let Some(update) = updates.recv().await {
//!     render(update);
//! }
//! ```

use std::collections::VecDeque;
use std::sync::Arc;
use tablesync_core::{
    classify, classify_failure, Action, Diff, Event, SyncEvent, SyncMachine, SyncState,
    TableReconciler,
};
use tablesync_types::{NetworkStatus, RemoteEvent, Table};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::context::SyncContext;
use crate::notify::{NotificationDispatcher, Notifier};
use crate::reachability::ReachabilityObserver;
use crate::remote::{EventSink, RemoteStream, Subscription};

/// Coordinator errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordinatorError {
    /// A subscription is already attached or pending.
    #[error("already subscribed")]
    AlreadySubscribed,

    /// Start requires a logged-in session.
    #[error("not logged in")]
    NotLoggedIn,

    /// The coordinator task is gone.
    #[error("coordinator closed")]
    Closed,
}

/// Published to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Update {
    /// The collection changed.
    Diff {
        /// What changed.
        diff: Diff,
        /// The collection after the change.
        tables: Vec<Table>,
    },
    /// Subscription lifecycle report.
    Status(SyncEvent),
}

#[derive(Debug, Clone, Copy)]
enum NetworkSignal {
    Available,
    Lost,
    CapabilitiesChanged { is_wifi: bool, is_cellular: bool },
}

enum Command {
    Start(oneshot::Sender<Result<(), CoordinatorError>>),
    Shutdown(oneshot::Sender<()>),
    Network(NetworkSignal),
    Stream { epoch: u64, event: RemoteEvent },
    RetryTimer { generation: u64 },
    Snapshot(oneshot::Sender<Vec<Table>>),
    State(oneshot::Sender<SyncState>),
}

/// Cloneable handle to a running coordinator.
///
/// The coordinator task stops once every handle is dropped.
#[derive(Debug, Clone)]
pub struct CoordinatorHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl CoordinatorHandle {
    /// Start syncing.
    ///
    /// # Errors
    ///
    /// `NotLoggedIn` without a session, `AlreadySubscribed` if a
    /// subscription is attached or a retry is pending.
    pub async fn start(&self) -> Result<(), CoordinatorError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Start(tx))?;
        rx.await.map_err(|_| CoordinatorError::Closed)?
    }

    /// Detach the listener and cancel any pending retry.
    ///
    /// Idempotent, including after the coordinator task has stopped.
    pub async fn shutdown(&self) -> Result<(), CoordinatorError> {
        let (tx, rx) = oneshot::channel();
        if self.send(Command::Shutdown(tx)).is_err() {
            return Ok(());
        }
        let _ = rx.await;
        Ok(())
    }

    /// Current collection, sorted by key.
    pub async fn snapshot(&self) -> Result<Vec<Table>, CoordinatorError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Snapshot(tx))?;
        rx.await.map_err(|_| CoordinatorError::Closed)
    }

    /// Current subscription state.
    pub async fn state(&self) -> Result<SyncState, CoordinatorError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::State(tx))?;
        rx.await.map_err(|_| CoordinatorError::Closed)
    }

    fn send(&self, command: Command) -> Result<(), CoordinatorError> {
        self.commands
            .send(command)
            .map_err(|_| CoordinatorError::Closed)
    }

    fn signal(&self, signal: NetworkSignal) {
        if self.send(Command::Network(signal)).is_err() {
            tracing::debug!("Coordinator closed, dropping {:?}", signal);
        }
    }
}

impl ReachabilityObserver for CoordinatorHandle {
    fn on_available(&self) {
        self.signal(NetworkSignal::Available);
    }

    fn on_lost(&self) {
        self.signal(NetworkSignal::Lost);
    }

    fn on_capabilities_changed(&self, is_wifi: bool, is_cellular: bool) {
        self.signal(NetworkSignal::CapabilitiesChanged {
            is_wifi,
            is_cellular,
        });
    }
}

/// The coordinator actor.
pub struct SyncCoordinator<R: RemoteStream> {
    context: SyncContext,
    remote: R,
    dispatcher: NotificationDispatcher,
    network: watch::Receiver<NetworkStatus>,
    machine: SyncMachine,
    reconciler: TableReconciler,
    subscription: Option<Subscription>,
    epoch: u64,
    retry_timer: Option<JoinHandle<()>>,
    timer_generation: u64,
    commands: mpsc::UnboundedReceiver<Command>,
    loopback: mpsc::WeakUnboundedSender<Command>,
    updates: mpsc::UnboundedSender<Update>,
}

impl<R: RemoteStream + 'static> SyncCoordinator<R> {
    /// Spawn the coordinator on the current tokio runtime.
    ///
    /// `network` is read before every attach decision; it is normally
    /// [`ReachabilityMonitor::subscribe_status`](crate::ReachabilityMonitor::subscribe_status).
    pub fn spawn(
        context: SyncContext,
        remote: R,
        notifier: Arc<dyn Notifier>,
        network: watch::Receiver<NetworkStatus>,
    ) -> (CoordinatorHandle, mpsc::UnboundedReceiver<Update>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        let coordinator = Self {
            dispatcher: NotificationDispatcher::new(notifier, &context.config.notifications),
            machine: SyncMachine::new(context.config.retry.policy()),
            context,
            remote,
            network,
            reconciler: TableReconciler::new(),
            subscription: None,
            epoch: 0,
            retry_timer: None,
            timer_generation: 0,
            commands: command_rx,
            loopback: command_tx.downgrade(),
            updates: update_tx,
        };
        tokio::spawn(coordinator.run());

        (
            CoordinatorHandle {
                commands: command_tx,
            },
            update_rx,
        )
    }

    async fn run(mut self) {
        tracing::info!("Sync coordinator started (path: {})", self.context.config.stream.path);

        while let Some(command) = self.commands.recv().await {
            match command {
                Command::Start(reply) => {
                    let result = self.start().await;
                    let _ = reply.send(result);
                }
                Command::Shutdown(reply) => {
                    self.drive(Event::ShutdownRequested).await;
                    self.epoch += 1;
                    let _ = reply.send(());
                }
                Command::Network(signal) => self.on_network(signal).await,
                Command::Stream { epoch, event } => self.on_stream(epoch, event).await,
                Command::RetryTimer { generation } => {
                    if generation != self.timer_generation {
                        tracing::debug!("Ignoring superseded retry timer {}", generation);
                        continue;
                    }
                    self.retry_timer = None;
                    self.drive(Event::RetryTimerFired).await;
                }
                Command::Snapshot(reply) => {
                    let _ = reply.send(self.reconciler.tables().to_vec());
                }
                Command::State(reply) => {
                    let _ = reply.send(self.machine.state());
                }
            }
        }

        // Every handle is gone.
        self.cancel_retry();
        self.detach().await;
        tracing::info!("Sync coordinator stopped");
    }

    async fn start(&mut self) -> Result<(), CoordinatorError> {
        if !self.context.session.is_logged_in() {
            tracing::warn!("Start rejected: no staff session");
            return Err(CoordinatorError::NotLoggedIn);
        }
        if !self.machine.state().is_idle() {
            tracing::warn!("Start rejected: already {:?}", self.machine.state());
            return Err(CoordinatorError::AlreadySubscribed);
        }
        if let Some(staff) = self.context.session.current_staff_id() {
            tracing::info!("Starting sync for staff {}", staff);
        }
        self.drive(Event::StartRequested).await;
        Ok(())
    }

    async fn on_network(&mut self, signal: NetworkSignal) {
        match signal {
            NetworkSignal::Available => {
                tracing::info!("Network available");
                self.drive(Event::NetworkAvailable).await;
            }
            NetworkSignal::Lost => {
                tracing::warn!("Network lost");
                self.drive(Event::NetworkLost).await;
            }
            NetworkSignal::CapabilitiesChanged {
                is_wifi,
                is_cellular,
            } => {
                let kind = if is_wifi {
                    "wifi"
                } else if is_cellular {
                    "cellular"
                } else {
                    "unknown transport"
                };
                tracing::info!("Using {}", kind);
                // Validation may arrive after the bare availability signal.
                if self.network.borrow().available {
                    self.drive(Event::NetworkAvailable).await;
                }
            }
        }
    }

    async fn on_stream(&mut self, epoch: u64, event: RemoteEvent) {
        if epoch != self.epoch {
            tracing::debug!(
                "Dropping event from stale listener (epoch {}, current {})",
                epoch,
                self.epoch
            );
            return;
        }

        if let RemoteEvent::Cancelled { error } = &event {
            tracing::error!("Listener cancelled: {}", error);
            let result = classify(Some(error));
            self.drive(Event::Cancelled { result }).await;
            return;
        }

        let diff = self.reconciler.apply(&event);
        if let Some(alert) = diff.alert() {
            self.dispatcher.dispatch(&alert);
        }
        if !diff.is_noop() {
            self.publish(Update::Diff {
                diff,
                tables: self.reconciler.tables().to_vec(),
            });
        }
        self.drive(Event::DataReceived).await;
    }

    /// Feed an event to the state machine and execute the resulting actions,
    /// including any follow-up events they produce, before returning.
    async fn drive(&mut self, event: Event) {
        let mut pending = VecDeque::from([event]);
        while let Some(event) = pending.pop_front() {
            let network = *self.network.borrow();
            for action in self.machine.on_event(event, network) {
                if let Some(next) = self.execute(action).await {
                    pending.push_back(next);
                }
            }
        }
    }

    async fn execute(&mut self, action: Action) -> Option<Event> {
        match action {
            Action::Attach => self.attach().await,
            Action::Detach => {
                self.detach().await;
                None
            }
            Action::ScheduleRetry { delay } => {
                self.cancel_retry();
                let generation = self.timer_generation;
                let loopback = self.loopback.clone();
                self.retry_timer = Some(tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    if let Some(tx) = loopback.upgrade() {
                        let _ = tx.send(Command::RetryTimer { generation });
                    }
                }));
                tracing::debug!("Retry timer {} armed for {:?}", generation, delay);
                None
            }
            Action::CancelRetry => {
                self.cancel_retry();
                None
            }
            Action::EmitEvent(event) => {
                self.publish(Update::Status(event));
                None
            }
        }
    }

    async fn attach(&mut self) -> Option<Event> {
        if self.subscription.is_some() {
            tracing::error!("Attach requested while a listener is attached; rejected");
            return None;
        }

        self.epoch += 1;
        let epoch = self.epoch;
        let loopback = self.loopback.clone();
        let sink = EventSink::new(move |event| match loopback.upgrade() {
            Some(tx) => tx.send(Command::Stream { epoch, event }).is_ok(),
            None => false,
        });

        let path = self.context.config.stream.path.clone();
        match self.remote.subscribe(&path, sink).await {
            Ok(subscription) => {
                tracing::info!("Listener {} attached to /{}", subscription.id, path);
                self.subscription = Some(subscription);
                Some(Event::Attached)
            }
            Err(e) => {
                tracing::error!("Failed to attach listener to /{}: {}", path, e);
                let result = classify_failure(e.kind_name(), &e.to_string());
                Some(Event::AttachFailed { result })
            }
        }
    }

    async fn detach(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            self.epoch += 1;
            tracing::info!("Detaching listener {}", subscription.id);
            self.remote.unsubscribe(subscription).await;
        }
    }

    fn cancel_retry(&mut self) {
        // Bumping the generation invalidates a timer that already fired
        // but whose message is still queued.
        self.timer_generation += 1;
        if let Some(timer) = self.retry_timer.take() {
            timer.abort();
            tracing::debug!("Pending retry cancelled");
        }
    }

    fn publish(&self, update: Update) {
        if self.updates.send(update).is_err() {
            tracing::trace!("No update receiver");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::context::MemorySession;
    use crate::notify::{NotifierCall, RecordingNotifier};
    use crate::reachability::{Capabilities, MockConnectivity, ReachabilityMonitor};
    use crate::remote::{ChildChange, MockRemote, RemoteError};
    use serde_json::json;
    use std::time::Duration;
    use tablesync_types::{
        ErrorCategory, StreamErrorCode, TableKey, TablePayload, TableStatus, TransportKind,
    };

    const ONLINE: NetworkStatus = NetworkStatus::online(TransportKind::Wifi);

    struct Harness {
        handle: CoordinatorHandle,
        updates: mpsc::UnboundedReceiver<Update>,
        remote: MockRemote,
        notifier: Arc<RecordingNotifier>,
        session: Arc<MemorySession>,
        network: watch::Sender<NetworkStatus>,
    }

    impl Harness {
        fn new(initial: NetworkStatus) -> Self {
            let remote = MockRemote::new();
            let notifier = Arc::new(RecordingNotifier::new());
            let session = Arc::new(MemorySession::logged_in("staff-1"));
            let (network, network_rx) = watch::channel(initial);
            let context = SyncContext::new(SyncConfig::default(), session.clone());
            let (handle, updates) =
                SyncCoordinator::spawn(context, remote.clone(), notifier.clone(), network_rx);
            Self {
                handle,
                updates,
                remote,
                notifier,
                session,
                network,
            }
        }

        fn online() -> Self {
            Self::new(ONLINE)
        }

        /// Round-trip through the actor, then collect what it published.
        async fn settle(&mut self) -> Vec<Update> {
            self.handle.state().await.unwrap();
            let mut out = Vec::new();
            while let Ok(update) = self.updates.try_recv() {
                out.push(update);
            }
            out
        }

        async fn statuses(&mut self) -> Vec<SyncEvent> {
            self.settle()
                .await
                .into_iter()
                .filter_map(|u| match u {
                    Update::Status(event) => Some(event),
                    Update::Diff { .. } => None,
                })
                .collect()
        }

        fn go_online(&self) {
            self.network.send_replace(ONLINE);
            self.handle.on_available();
        }

        fn go_offline(&self) {
            self.network.send_replace(NetworkStatus::offline());
            self.handle.on_lost();
        }

        fn emit(&self, event: RemoteEvent) {
            assert_eq!(self.remote.emit(event), 1, "no listener attached");
        }

        fn emit_status(&self, change: ChildChange, key: &str, status: &str) {
            let payload = json!({ "status": status });
            assert_eq!(
                self.remote.emit_child(change, key, Some(&payload)),
                1,
                "no listener attached"
            );
        }
    }

    fn retry_in(events: &[SyncEvent]) -> Option<Duration> {
        events.iter().find_map(|e| match e {
            SyncEvent::StreamError { retry_in, .. } => *retry_in,
            _ => None,
        })
    }

    // ===========================================
    // Start Tests
    // ===========================================

    #[tokio::test(start_paused = true)]
    async fn start_attaches_and_reports_subscribed() {
        let mut h = Harness::online();

        h.handle.start().await.unwrap();

        assert_eq!(h.remote.subscribe_calls(), vec!["tables".to_string()]);
        assert_eq!(h.remote.active_count(), 1);
        assert_eq!(h.statuses().await, vec![SyncEvent::Subscribed]);
        assert_eq!(h.handle.state().await.unwrap(), SyncState::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn start_requires_login() {
        let h = Harness::online();
        h.session.logout();

        assert_eq!(h.handle.start().await, Err(CoordinatorError::NotLoggedIn));
        assert!(h.remote.subscribe_calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn second_start_is_rejected() {
        let h = Harness::online();
        h.handle.start().await.unwrap();

        assert_eq!(
            h.handle.start().await,
            Err(CoordinatorError::AlreadySubscribed)
        );
        assert_eq!(h.remote.subscribe_calls().len(), 1);
        assert_eq!(h.remote.active_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn start_offline_waits_for_network() {
        let mut h = Harness::new(NetworkStatus::offline());

        h.handle.start().await.unwrap();
        assert!(h.remote.subscribe_calls().is_empty());
        assert!(matches!(
            h.statuses().await.as_slice(),
            [SyncEvent::WaitingForNetwork { .. }]
        ));

        h.go_online();
        assert_eq!(h.statuses().await, vec![SyncEvent::Subscribed]);
        assert_eq!(h.remote.subscribe_calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn network_before_start_does_not_subscribe() {
        let mut h = Harness::new(NetworkStatus::offline());
        h.go_online();
        h.settle().await;
        assert!(h.remote.subscribe_calls().is_empty());
    }

    // ===========================================
    // Reconciliation Tests
    // ===========================================

    #[tokio::test(start_paused = true)]
    async fn dirty_table_scenario() {
        let mut h = Harness::online();
        h.handle.start().await.unwrap();
        h.settle().await;

        h.emit_status(ChildChange::Added, "table_12", "OCCUPIED");
        let snapshot = h.handle.snapshot().await.unwrap();
        assert_eq!(
            snapshot,
            vec![Table::new("table_12", TableKey::new(12), TableStatus::Occupied)]
        );
        assert!(h.notifier.calls().is_empty());

        h.emit_status(ChildChange::Changed, "table_12", "DIRTY");
        let snapshot = h.handle.snapshot().await.unwrap();
        assert_eq!(snapshot[0].status, TableStatus::Dirty);
        assert_eq!(h.notifier.showing(), vec![12]);
        assert_eq!(
            h.notifier.body(12).as_deref(),
            Some("Table 12 needs cleaning!")
        );
        assert!(matches!(
            h.notifier.calls().as_slice(),
            [NotifierCall::Post { notification_id: 12, target, .. }] if target == "table_12"
        ));

        // Known quirk: removal leaves the alert in place.
        h.emit(RemoteEvent::removed("table_12"));
        assert!(h.handle.snapshot().await.unwrap().is_empty());
        assert_eq!(h.notifier.showing(), vec![12]);
    }

    #[tokio::test(start_paused = true)]
    async fn clean_change_after_removal_withdraws_alert() {
        let mut h = Harness::online();
        h.handle.start().await.unwrap();

        h.emit_status(ChildChange::Added, "table_12", "DIRTY");
        h.emit(RemoteEvent::removed("table_12"));
        h.settle().await;
        assert_eq!(h.notifier.showing(), vec![12]);

        h.emit_status(ChildChange::Changed, "table_12", "CLEAN");
        h.settle().await;

        assert!(h.notifier.showing().is_empty());
        assert_eq!(
            h.notifier.calls().last(),
            Some(&NotifierCall::Cancel {
                notification_id: 12
            })
        );
        let snapshot = h.handle.snapshot().await.unwrap();
        assert_eq!(snapshot[0].status, TableStatus::Available);
    }

    #[tokio::test(start_paused = true)]
    async fn cleaned_table_withdraws_alert() {
        let mut h = Harness::online();
        h.handle.start().await.unwrap();

        h.emit_status(ChildChange::Added, "table_3", "DIRTY");
        h.emit_status(ChildChange::Changed, "table_3", "CLEAN");
        h.settle().await;

        assert!(h.notifier.showing().is_empty());
        assert_eq!(h.notifier.calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_dirty_renews_alert() {
        let mut h = Harness::online();
        h.handle.start().await.unwrap();

        h.emit_status(ChildChange::Added, "table_3", "DIRTY");
        h.emit_status(ChildChange::Changed, "table_3", "DIRTY");
        h.settle().await;

        assert_eq!(h.notifier.calls().len(), 2);
        assert_eq!(h.notifier.showing(), vec![3]);
    }

    #[tokio::test(start_paused = true)]
    async fn diffs_are_published_with_snapshot() {
        let mut h = Harness::online();
        h.handle.start().await.unwrap();
        h.settle().await;

        h.emit_status(ChildChange::Added, "table_7", "OCCUPIED");
        h.emit_status(ChildChange::Added, "table_2", "AVAILABLE");
        let updates = h.settle().await;

        assert_eq!(updates.len(), 2);
        match &updates[1] {
            Update::Diff {
                diff: Diff::Inserted { index, .. },
                tables,
            } => {
                assert_eq!(*index, 0);
                let keys: Vec<u32> = tables.iter().map(|t| t.key.value()).collect();
                assert_eq!(keys, vec![2, 7]);
            }
            other => panic!("unexpected update {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn unparseable_key_is_dropped_without_update() {
        let mut h = Harness::online();
        h.handle.start().await.unwrap();
        h.settle().await;

        h.emit(RemoteEvent::added("bar", &TablePayload::with_status("DIRTY")));
        assert!(h.settle().await.is_empty());
        assert!(h.handle.snapshot().await.unwrap().is_empty());
        assert!(h.notifier.calls().is_empty());
        assert_eq!(h.handle.state().await.unwrap(), SyncState::Active);
    }

    // ===========================================
    // Retry Tests
    // ===========================================

    #[tokio::test(start_paused = true)]
    async fn network_cancel_online_retries_after_3s() {
        let mut h = Harness::online();
        h.handle.start().await.unwrap();
        h.settle().await;

        h.remote.cancel(StreamErrorCode::NetworkError, "socket closed");
        let events = h.statuses().await;
        assert_eq!(retry_in(&events), Some(Duration::from_millis(3000)));
        assert_eq!(
            h.handle.state().await.unwrap(),
            SyncState::AwaitingRetry { attempt: 1 }
        );

        tokio::time::sleep(Duration::from_millis(2999)).await;
        assert_eq!(h.remote.subscribe_calls().len(), 1);

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(h.statuses().await, vec![SyncEvent::Subscribed]);
        assert_eq!(h.remote.subscribe_calls().len(), 2);
        assert_eq!(h.remote.active_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn network_cancel_offline_surfaces_error_without_retry() {
        let mut h = Harness::online();
        h.handle.start().await.unwrap();
        h.settle().await;

        h.go_offline();
        h.remote.cancel(StreamErrorCode::NetworkError, "socket closed");
        let events = h.statuses().await;
        assert!(matches!(
            events.as_slice(),
            [SyncEvent::StreamError { retry_in: None, .. }]
        ));

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(h.remote.subscribe_calls().len(), 1);

        // The network coming back resubscribes.
        h.go_online();
        assert_eq!(h.statuses().await, vec![SyncEvent::Subscribed]);
        assert_eq!(h.remote.subscribe_calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn permission_denied_goes_idle_for_good() {
        let mut h = Harness::online();
        h.handle.start().await.unwrap();
        h.settle().await;

        h.remote.cancel(StreamErrorCode::PermissionDenied, "rules");
        let events = h.statuses().await;
        match events.as_slice() {
            [SyncEvent::StreamError {
                result,
                retry_in: None,
            }] => assert_eq!(result.category(), ErrorCategory::Permission),
            other => panic!("unexpected events {:?}", other),
        }
        assert_eq!(h.handle.state().await.unwrap(), SyncState::Idle);

        h.go_online();
        h.settle().await;
        assert_eq!(h.remote.subscribe_calls().len(), 1);

        // Manual restart resumes.
        h.handle.start().await.unwrap();
        assert_eq!(h.remote.subscribe_calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_listener_is_classified() {
        let mut h = Harness::online();
        h.remote
            .cancel_next_subscribe(StreamErrorCode::ExpiredToken, "token expired");

        h.handle.start().await.unwrap();
        let events = h.statuses().await;

        assert_eq!(events[0], SyncEvent::Subscribed);
        assert!(matches!(
            &events[1],
            SyncEvent::StreamError { result, retry_in: None } if result.category() == ErrorCategory::Auth
        ));
        assert_eq!(h.handle.state().await.unwrap(), SyncState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn attach_failure_follows_retry_path() {
        let mut h = Harness::online();
        h.remote
            .fail_next_subscribe(RemoteError::Network("unreachable".into()));

        h.handle.start().await.unwrap();
        let events = h.statuses().await;
        assert_eq!(retry_in(&events), Some(Duration::from_millis(3000)));

        tokio::time::sleep(Duration::from_millis(3001)).await;
        assert_eq!(h.statuses().await, vec![SyncEvent::Subscribed]);
        assert_eq!(h.remote.subscribe_calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn attach_permission_failure_is_terminal() {
        let mut h = Harness::online();
        h.remote
            .fail_next_subscribe(RemoteError::PermissionDenied("rules".into()));

        h.handle.start().await.unwrap();
        let events = h.statuses().await;
        assert!(matches!(
            events.as_slice(),
            [SyncEvent::StreamError { retry_in: None, .. }]
        ));
        assert_eq!(h.handle.state().await.unwrap(), SyncState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn consecutive_failures_back_off_then_give_up() {
        let mut h = Harness::online();
        h.handle.start().await.unwrap();
        h.settle().await;

        let mut delays = Vec::new();
        loop {
            h.remote.cancel(StreamErrorCode::NetworkError, "flaky");
            let events = h.statuses().await;
            match retry_in(&events) {
                Some(delay) => {
                    delays.push(delay.as_millis());
                    tokio::time::sleep(delay + Duration::from_millis(1)).await;
                    assert_eq!(h.statuses().await, vec![SyncEvent::Subscribed]);
                }
                None => {
                    assert!(matches!(
                        events.as_slice(),
                        [SyncEvent::RetriesExhausted { attempts: 5, .. }]
                    ));
                    break;
                }
            }
        }

        assert_eq!(delays, vec![3000, 6000, 12000, 24000, 30000]);
        assert_eq!(h.handle.state().await.unwrap(), SyncState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn data_after_reattach_resets_backoff() {
        let mut h = Harness::online();
        h.handle.start().await.unwrap();
        h.settle().await;

        h.remote.cancel(StreamErrorCode::NetworkError, "flaky");
        assert_eq!(
            retry_in(&h.statuses().await),
            Some(Duration::from_millis(3000))
        );
        tokio::time::sleep(Duration::from_millis(3001)).await;
        h.settle().await;

        h.emit_status(ChildChange::Added, "table_1", "AVAILABLE");
        h.remote.cancel(StreamErrorCode::NetworkError, "flaky");
        assert_eq!(
            retry_in(&h.statuses().await),
            Some(Duration::from_millis(3000))
        );
    }

    // ===========================================
    // Shutdown Tests
    // ===========================================

    #[tokio::test(start_paused = true)]
    async fn shutdown_detaches_and_is_idempotent() {
        let h = Harness::online();
        h.handle.start().await.unwrap();

        h.handle.shutdown().await.unwrap();
        h.handle.shutdown().await.unwrap();

        assert_eq!(h.remote.active_count(), 0);
        assert_eq!(h.remote.unsubscribe_calls().len(), 1);
        assert_eq!(h.handle.state().await.unwrap(), SyncState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_pending_retry() {
        let mut h = Harness::online();
        h.handle.start().await.unwrap();
        h.remote.cancel(StreamErrorCode::Unavailable, "maintenance");
        h.settle().await;

        h.handle.shutdown().await.unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(h.remote.subscribe_calls().len(), 1);
        assert_eq!(h.handle.state().await.unwrap(), SyncState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn late_events_after_shutdown_are_ignored() {
        let mut h = Harness::online();
        h.handle.start().await.unwrap();
        h.handle.shutdown().await.unwrap();
        h.settle().await;

        let stale = h.remote.issued_sinks().remove(0);
        stale.send(RemoteEvent::added("table_4", &TablePayload::with_status("DIRTY")));

        assert!(h.settle().await.is_empty());
        assert!(h.handle.snapshot().await.unwrap().is_empty());
        assert!(h.notifier.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn events_from_replaced_listener_are_ignored() {
        let mut h = Harness::online();
        h.handle.start().await.unwrap();
        h.remote.cancel(StreamErrorCode::NetworkError, "flaky");
        tokio::time::sleep(Duration::from_millis(3001)).await;
        h.settle().await;

        let sinks = h.remote.issued_sinks();
        assert_eq!(sinks.len(), 2);
        sinks[0].send(RemoteEvent::added("table_9", &TablePayload::with_status("DIRTY")));
        sinks[1].send(RemoteEvent::added("table_8", &TablePayload::with_status("OCCUPIED")));

        let keys: Vec<u32> = h
            .handle
            .snapshot()
            .await
            .unwrap()
            .iter()
            .map(|t| t.key.value())
            .collect();
        assert_eq!(keys, vec![8]);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_after_shutdown() {
        let h = Harness::online();
        h.handle.start().await.unwrap();
        h.handle.shutdown().await.unwrap();

        h.handle.start().await.unwrap();
        assert_eq!(h.remote.active_count(), 1);
        assert_eq!(h.remote.subscribe_calls().len(), 2);
    }

    #[tokio::test]
    async fn closed_coordinator_reports_closed() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let handle = CoordinatorHandle { commands: tx };

        assert_eq!(handle.start().await, Err(CoordinatorError::Closed));
        assert_eq!(handle.snapshot().await, Err(CoordinatorError::Closed));
        assert!(handle.shutdown().await.is_ok());
    }

    // ===========================================
    // Reachability Integration Tests
    // ===========================================

    #[tokio::test(start_paused = true)]
    async fn monitor_drives_subscription() {
        let connectivity = MockConnectivity::new();
        let monitor = ReachabilityMonitor::new(Arc::new(connectivity.clone()));

        let remote = MockRemote::new();
        let session = Arc::new(MemorySession::logged_in("staff-1"));
        let context = SyncContext::new(SyncConfig::default(), session);
        let (handle, _updates) = SyncCoordinator::spawn(
            context,
            remote.clone(),
            Arc::new(RecordingNotifier::new()),
            monitor.subscribe_status(),
        );
        monitor.start(Arc::new(handle.clone()));

        handle.start().await.unwrap();
        assert!(remote.subscribe_calls().is_empty());

        connectivity.go_online(Capabilities::wifi());
        handle.state().await.unwrap();
        assert_eq!(remote.subscribe_calls().len(), 1);
        assert_eq!(handle.state().await.unwrap(), SyncState::Active);

        // Losing the network leaves the listener alone.
        connectivity.go_offline();
        assert_eq!(handle.state().await.unwrap(), SyncState::Active);
        assert_eq!(remote.active_count(), 1);

        monitor.stop();
        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn validation_arriving_late_resumes() {
        let connectivity = MockConnectivity::new();
        let monitor = ReachabilityMonitor::new(Arc::new(connectivity.clone()));
        let remote = MockRemote::new();
        let context = SyncContext::new(
            SyncConfig::default(),
            Arc::new(MemorySession::logged_in("staff-1")),
        );
        let (handle, _updates) = SyncCoordinator::spawn(
            context,
            remote.clone(),
            Arc::new(RecordingNotifier::new()),
            monitor.subscribe_status(),
        );
        monitor.start(Arc::new(handle.clone()));
        handle.start().await.unwrap();

        connectivity.set_capabilities(Capabilities {
            validated: false,
            ..Capabilities::wifi()
        });
        handle.state().await.unwrap();
        assert!(remote.subscribe_calls().is_empty());

        connectivity.set_capabilities(Capabilities::wifi());
        handle.state().await.unwrap();
        assert_eq!(remote.subscribe_calls().len(), 1);
    }
}
