//! # sync-types
//!
//! Data model for the tablesync table-status synchronization engine.
//!
//! This crate provides the foundational types used across all tablesync crates:
//! - [`TableKey`], [`SubscriptionId`] - Identity and ordering types
//! - [`Table`], [`TableStatus`], [`TablePayload`] - The tracked entity
//! - [`RemoteEvent`], [`StreamError`], [`StreamErrorCode`] - Remote stream events
//! - [`ErrorResult`], [`ErrorCategory`] - Classified failures
//! - [`NetworkStatus`] - Reachability snapshot

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod event;
mod failure;
mod ids;
mod network;
mod table;

pub use error::TypesError;
pub use event::{RemoteEvent, StreamError, StreamErrorCode};
pub use failure::{ErrorCategory, ErrorResult};
pub use ids::{SubscriptionId, TableKey};
pub use network::{NetworkStatus, TransportKind};
pub use table::{Table, TablePayload, TableStatus};
