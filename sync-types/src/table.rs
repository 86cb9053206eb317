//! Table entity and its status.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::TypesError;
use crate::ids::TableKey;

/// Occupancy status of a table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TableStatus {
    /// Free to seat guests.
    #[default]
    Available,
    /// Guests are seated.
    Occupied,
    /// Needs cleaning before the next guests.
    Dirty,
}

impl TableStatus {
    /// Map a raw remote status string, ignoring case.
    ///
    /// `CLEAN` is an alias for `AVAILABLE`. Returns `None` for anything
    /// unrecognized; callers decide how to fall back.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "OCCUPIED" => Some(Self::Occupied),
            "DIRTY" => Some(Self::Dirty),
            "CLEAN" | "AVAILABLE" => Some(Self::Available),
            _ => None,
        }
    }

    /// Canonical upper-case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "AVAILABLE",
            Self::Occupied => "OCCUPIED",
            Self::Dirty => "DIRTY",
        }
    }

    /// Whether this status raises a cleaning alert.
    pub fn needs_attention(&self) -> bool {
        matches!(self, Self::Dirty)
    }
}

impl fmt::Display for TableStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One tracked table.
///
/// `key` is derived from `id` once, when the table is first inserted, and
/// never recomputed afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    /// External identifier as delivered by the remote stream.
    pub id: String,
    /// Numeric key used for ordering and notifications.
    pub key: TableKey,
    /// Current status.
    pub status: TableStatus,
}

impl Table {
    /// Create a table record.
    pub fn new(id: impl Into<String>, key: TableKey, status: TableStatus) -> Self {
        Self {
            id: id.into(),
            key,
            status,
        }
    }
}

/// Child payload as stored by the remote service.
///
/// Unknown fields are ignored so the device firmware can add telemetry
/// without breaking older clients.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TablePayload {
    /// Raw status string (`OCCUPIED`, `DIRTY`, `CLEAN`, `AVAILABLE`).
    #[serde(default)]
    pub status: Option<String>,
    /// Device-side timestamp (milliseconds since device boot).
    #[serde(default)]
    pub client_timestamp: Option<f64>,
    /// Server-assigned timestamp (milliseconds since epoch).
    #[serde(default)]
    pub server_timestamp: Option<i64>,
}

impl TablePayload {
    /// Payload carrying only a status.
    pub fn with_status(status: impl Into<String>) -> Self {
        Self {
            status: Some(status.into()),
            ..Self::default()
        }
    }

    /// Decode a payload from JSON text.
    pub fn from_json(text: &str) -> Result<Self, TypesError> {
        serde_json::from_str(text).map_err(TypesError::Payload)
    }

    /// Decode a payload from an already-parsed JSON value.
    pub fn from_value(value: serde_json::Value) -> Result<Self, TypesError> {
        serde_json::from_value(value).map_err(TypesError::Payload)
    }
}
