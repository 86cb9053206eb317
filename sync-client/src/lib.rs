//! # sync-client
//!
//! I/O layer for tablesync: keeps a live subscription to the remote table
//! collection and turns it into a sorted local snapshot plus cleaning
//! alerts.
//!
//! ## Features
//!
//! - **Single Subscription Actor**: [`SyncCoordinator`] serializes every
//!   input on one queue and drives the pure state machine from sync-core
//! - **Remote Abstraction**: Pluggable stream layer ([`RemoteStream`], mock)
//! - **Reachability Gate**: [`ReachabilityMonitor`] over a platform
//!   [`ConnectivitySource`]
//! - **Alerts**: [`NotificationDispatcher`] over a platform [`Notifier`]
//! - **TOML Configuration**: [`SyncConfig`]
//!
//! ## Example
//!
//! ```ignore
//! use tablesync_client::*;
//!
//! let monitor = ReachabilityMonitor::new(Arc::new(connectivity));
//! let context = SyncContext::new(SyncConfig::default(), session);
//! let (handle, mut updates) =
//!     SyncCoordinator::spawn(context, remote, notifier, monitor.subscribe_status());
//! monitor.start(Arc::new(handle.clone()));
//! handle.start().await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod context;
pub mod coordinator;
pub mod notify;
pub mod reachability;
pub mod remote;

pub use config::{ConfigError, NotificationConfig, RetryConfig, StreamConfig, SyncConfig};
pub use context::{MemorySession, SessionStore, SyncContext};
pub use coordinator::{CoordinatorError, CoordinatorHandle, SyncCoordinator, Update};
pub use notify::{NotificationDispatcher, Notifier, NotifierCall, RecordingNotifier};
pub use reachability::{
    CallbackToken, Capabilities, ConnectivitySource, MockConnectivity, PlatformSignal,
    ReachabilityMonitor, ReachabilityObserver, SignalCallback,
};
pub use remote::{
    child_event, ChildChange, EventSink, MockRemote, RemoteError, RemoteStream, Subscription,
};
