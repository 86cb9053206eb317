//! Identity and ordering types for tablesync.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Numeric key of a table, extracted from its external id.
///
/// Orders the local collection and doubles as the notification id, so a
/// table keeps the same alert slot for its whole lifetime.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TableKey(u32);

impl TableKey {
    /// Create a key from a raw number.
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Derive a key from an external id by dropping every non-digit.
    ///
    /// `"table_12"` and `"t-0012"` both yield `12`. Returns `None` when no
    /// digits remain or the digits overflow a `u32`.
    pub fn from_id(id: &str) -> Option<Self> {
        let digits: String = id.chars().filter(char::is_ascii_digit).collect();
        if digits.is_empty() {
            return None;
        }
        digits.parse::<u32>().ok().map(Self)
    }

    /// Get the raw value.
    pub const fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for TableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for TableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TableKey({})", self.0)
    }
}

/// Identifier of one attached remote subscription.
///
/// UUID v4 format, minted per attach.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(uuid::Uuid);

impl SubscriptionId {
    /// Create a new random SubscriptionId.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubscriptionId({})", &self.0.to_string()[..8])
    }
}
