//! Subscription state machine for tablesync.
//!
//! This module provides a pure, side-effect-free state machine for the
//! lifecycle of the single remote subscription. It takes events as input
//! and produces a list of actions to execute.
//!
//! The actual I/O (attaching the listener, arming timers) is performed by
//! sync-client, not by this module. This enables instant unit testing
//! without network mocks.
//!
//! ```text
//!          start / network up              attached
//!   Idle ─────────────────────► Subscribing ─────────► Active
//!    ▲                               ▲                   │
//!    │  not retryable / offline      │ timer             │ cancelled
//!    └───────────────────────── AwaitingRetry ◄──────────┘
//! ```

use std::time::Duration;
use tablesync_types::{ErrorResult, NetworkStatus};

use crate::classify::network_error_message;
use crate::retry::{RetryPolicy, RetryState};

/// Lifecycle state of the remote subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No listener attached, no retry pending.
    Idle,
    /// Attach issued, waiting for confirmation.
    Subscribing,
    /// Listener attached and delivering events.
    Active,
    /// Previous listener failed; a retry timer is armed.
    AwaitingRetry {
        /// Retry number that the pending timer will perform.
        attempt: u32,
    },
}

impl SyncState {
    /// Check if no subscription exists and none is pending.
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// Check if a listener is attached or being attached.
    pub fn is_attached(&self) -> bool {
        matches!(self, Self::Subscribing | Self::Active)
    }
}

/// Events that drive the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Owner asked to start syncing.
    StartRequested,
    /// Reachability reported a usable network.
    NetworkAvailable,
    /// Reachability reported the network is gone.
    NetworkLost,
    /// The listener was attached.
    Attached,
    /// Attaching the listener failed outright.
    AttachFailed {
        /// Classified failure.
        result: ErrorResult,
    },
    /// A collection event arrived on the current listener.
    DataReceived,
    /// The remote side cancelled the listener.
    Cancelled {
        /// Classified failure.
        result: ErrorResult,
    },
    /// The retry timer fired.
    RetryTimerFired,
    /// Owner is tearing down.
    ShutdownRequested,
}

/// Actions to be executed by the coordinator.
///
/// These are instructions, not side effects. The coordinator interprets
/// these and performs the actual I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Attach a new listener.
    Attach,
    /// Detach the current listener, if any.
    Detach,
    /// Arm the retry timer, replacing any pending one.
    ScheduleRetry {
        /// Delay before the timer fires.
        delay: Duration,
    },
    /// Disarm the retry timer.
    CancelRetry,
    /// Report to the presentation layer.
    EmitEvent(SyncEvent),
}

/// Status reports for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// The listener is attached.
    Subscribed,
    /// A subscribe attempt was skipped because the device is offline.
    WaitingForNetwork {
        /// Message for staff.
        message: String,
    },
    /// The listener failed.
    StreamError {
        /// Classified failure.
        result: ErrorResult,
        /// When the next attempt runs, `None` if no retry is scheduled.
        retry_in: Option<Duration>,
    },
    /// Automatic retries are exhausted; manual restart required.
    RetriesExhausted {
        /// The last failure.
        result: ErrorResult,
        /// Retries performed before giving up.
        attempts: u32,
    },
}

/// Subscription state machine - NO I/O, just state transitions.
///
/// Besides the visible [`SyncState`] it tracks the retry counter and
/// whether the owner wants a subscription at all. The latter is cleared
/// by shutdown and by unrecoverable failures, after which a returning
/// network no longer resubscribes on its own.
#[derive(Debug, Clone)]
pub struct SyncMachine {
    state: SyncState,
    retry: RetryState,
    policy: RetryPolicy,
    wanted: bool,
}

impl SyncMachine {
    /// Create a machine in the Idle state.
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            state: SyncState::Idle,
            retry: RetryState::new(),
            policy,
            wanted: false,
        }
    }

    /// Current state.
    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Current retry counter.
    pub fn retry(&self) -> &RetryState {
        &self.retry
    }

    /// Whether a returning network would resubscribe.
    pub fn is_wanted(&self) -> bool {
        self.wanted
    }

    /// Process an event and return the actions to execute.
    ///
    /// `network` is the reachability snapshot at the time of the event; it
    /// gates every new attach.
    pub fn on_event(&mut self, event: Event, network: NetworkStatus) -> Vec<Action> {
        match (self.state, event) {
            // From Idle
            (SyncState::Idle, Event::StartRequested) => {
                self.wanted = true;
                self.retry.reset();
                self.subscribe_if_online(network)
            }
            (SyncState::Idle, Event::NetworkAvailable) if self.wanted => {
                self.subscribe_if_online(network)
            }

            // Start while something is attached or pending is rejected.
            (_, Event::StartRequested) => {
                tracing::warn!("Start requested while {:?}; ignored", self.state);
                vec![]
            }

            // From Subscribing
            (SyncState::Subscribing, Event::Attached) => {
                self.state = SyncState::Active;
                vec![Action::EmitEvent(SyncEvent::Subscribed)]
            }
            (SyncState::Subscribing, Event::AttachFailed { result }) => {
                self.on_failure(result, network)
            }

            // From Active
            (SyncState::Active, Event::DataReceived) => {
                if self.retry.attempts() > 0 {
                    tracing::debug!(
                        "Subscription live again after {} retries",
                        self.retry.attempts()
                    );
                    self.retry.reset();
                }
                vec![]
            }
            (SyncState::Subscribing | SyncState::Active, Event::Cancelled { result }) => {
                self.on_failure(result, network)
            }

            // From AwaitingRetry
            (SyncState::AwaitingRetry { attempt }, Event::RetryTimerFired) => {
                if network.available {
                    tracing::debug!("Retry {} firing", attempt);
                    self.state = SyncState::Subscribing;
                    vec![Action::Detach, Action::Attach]
                } else {
                    self.state = SyncState::Idle;
                    vec![Action::EmitEvent(SyncEvent::WaitingForNetwork {
                        message: network_error_message(false).to_string(),
                    })]
                }
            }

            // Shutdown from anywhere
            (SyncState::Idle, Event::ShutdownRequested) => {
                self.wanted = false;
                vec![]
            }
            (_, Event::ShutdownRequested) => {
                self.wanted = false;
                self.state = SyncState::Idle;
                self.retry.reset();
                vec![Action::CancelRetry, Action::Detach]
            }

            // Network loss never forces a detach; the stream cancels itself.
            (_, Event::NetworkLost) => vec![],

            // Everything else - stay in current state
            (state, event) => {
                tracing::trace!("Ignoring {:?} in {:?}", event, state);
                vec![]
            }
        }
    }

    fn subscribe_if_online(&mut self, network: NetworkStatus) -> Vec<Action> {
        if network.available {
            self.state = SyncState::Subscribing;
            vec![Action::Attach]
        } else {
            tracing::warn!("No network available, skipping subscribe");
            vec![Action::EmitEvent(SyncEvent::WaitingForNetwork {
                message: network_error_message(false).to_string(),
            })]
        }
    }

    fn on_failure(&mut self, result: ErrorResult, network: NetworkStatus) -> Vec<Action> {
        let attempts = self.retry.attempts();

        if !self.policy.should_retry(Some(&result), attempts) {
            self.state = SyncState::Idle;
            self.wanted = false;
            let exhausted = result.is_retryable() && !result.category().is_terminal();
            let event = if exhausted {
                tracing::warn!("Giving up after {} retries: {}", attempts, result);
                SyncEvent::RetriesExhausted { result, attempts }
            } else {
                tracing::warn!("Not retrying: {}", result);
                SyncEvent::StreamError {
                    result,
                    retry_in: None,
                }
            };
            return vec![Action::Detach, Action::EmitEvent(event)];
        }

        if !network.available {
            // Stay wanted: the next NetworkAvailable resubscribes.
            tracing::warn!("Not retrying while offline: {}", result);
            self.state = SyncState::Idle;
            return vec![
                Action::Detach,
                Action::EmitEvent(SyncEvent::StreamError {
                    result,
                    retry_in: None,
                }),
            ];
        }

        let delay = self.policy.next_delay(attempts, result.retry_delay_ms());
        self.retry.record(delay);
        self.state = SyncState::AwaitingRetry {
            attempt: self.retry.attempts(),
        };
        tracing::info!("Retry {} in {:?}: {}", self.retry.attempts(), delay, result);

        vec![
            Action::Detach,
            Action::EmitEvent(SyncEvent::StreamError {
                result,
                retry_in: Some(delay),
            }),
            Action::ScheduleRetry { delay },
        ]
    }
}

impl Default for SyncMachine {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}
