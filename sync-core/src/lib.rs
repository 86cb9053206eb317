//! # sync-core
//!
//! Pure logic for tablesync (no I/O, instant tests).
//!
//! This crate implements the reconciliation, error classification, retry
//! policy and subscription state machine without any network or timer
//! I/O, enabling fast unit tests.
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure** - they take input and produce output
//! without side effects. This enables:
//! - Instant unit tests (no mocks, no async)
//! - Deterministic behavior (same input → same output)
//! - Easy reasoning about state transitions
//!
//! The actual I/O (remote stream, notifications, timers) is performed by
//! `sync-client`, which interprets the actions produced by these state
//! machines. Logging goes through `tracing`; no subscriber is installed here.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod classify;
pub mod reconcile;
pub mod retry;
pub mod state;

pub use classify::{
    classify, classify_error, classify_failure, classify_stream_error, network_error_message,
};
pub use reconcile::{map_status, Alert, Diff, Origin, TableReconciler};
pub use retry::{next_delay, should_retry, RetryPolicy, RetryState};
pub use state::{Action, Event, SyncEvent, SyncMachine, SyncState};
