//! Reconciliation of remote stream events into the local table collection.
//!
//! [`TableReconciler`] owns the only copy of the collection. Each call to
//! [`TableReconciler::apply`] mutates it by at most one table and reports
//! what happened as a [`Diff`], which the coordinator forwards to the
//! presentation layer and turns into notification side effects via
//! [`Diff::alert`].
//!
//! Invariants held after every `apply`:
//! - the collection is sorted ascending by [`TableKey`]
//! - no two tables share a key
//! - a table's key is never recomputed once it is in the collection

use tablesync_types::{RemoteEvent, Table, TableKey, TableStatus};

/// Outcome of applying one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diff {
    /// A new table was inserted at `index` (post-sort position).
    Inserted {
        /// Position in the sorted collection.
        index: usize,
        /// The inserted table.
        table: Table,
        /// Event kind that created it.
        origin: Origin,
    },
    /// An existing table's status was rewritten in place.
    ///
    /// Emitted even when `old == new`: the remote side re-sent the record.
    Updated {
        /// Position in the sorted collection.
        index: usize,
        /// External id kept from the original insert.
        id: String,
        /// Key of the updated table.
        key: TableKey,
        /// Status before the event.
        old: TableStatus,
        /// Status after the event.
        new: TableStatus,
    },
    /// A table was removed from `index`.
    Removed {
        /// Position the table occupied before removal.
        index: usize,
        /// The removed table.
        table: Table,
    },
    /// The event did not touch the collection.
    Noop,
}

impl Diff {
    /// Whether the collection changed.
    pub fn is_noop(&self) -> bool {
        matches!(self, Self::Noop)
    }

    /// Notification side effect implied by this diff.
    ///
    /// - any insert or update ending in `DIRTY` raises an alert, including
    ///   repeated `DIRTY` updates (each one renews the alert)
    /// - an update ending in anything else withdraws the alert that table
    ///   may have raised earlier; a `Changed` for an untracked key counts as
    ///   an update, since the table may have been removed while `DIRTY`
    /// - added inserts that are not `DIRTY` and removals do nothing; a
    ///   removal leaves any alert for that table in place
    pub fn alert(&self) -> Option<Alert> {
        match self {
            Self::Inserted { table, .. } if table.status.needs_attention() => Some(Alert::Raise {
                key: table.key,
                id: table.id.clone(),
            }),
            Self::Inserted {
                table,
                origin: Origin::Changed,
                ..
            } => Some(Alert::Withdraw { key: table.key }),
            Self::Updated { key, id, new, .. } => {
                if new.needs_attention() {
                    Some(Alert::Raise {
                        key: *key,
                        id: id.clone(),
                    })
                } else {
                    Some(Alert::Withdraw { key: *key })
                }
            }
            _ => None,
        }
    }
}

/// Event kind that produced an upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// A child added event.
    Added,
    /// A child changed event.
    Changed,
}

impl Origin {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Changed => "changed",
        }
    }
}

/// Notification side effect derived from a [`Diff`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Alert {
    /// Post (or re-post) the cleaning alert for this table.
    Raise {
        /// Notification slot.
        key: TableKey,
        /// External id, used as the highlight target.
        id: String,
    },
    /// Withdraw the alert for this table if one is showing.
    Withdraw {
        /// Notification slot.
        key: TableKey,
    },
}

/// Map a raw status, falling back to `AVAILABLE` for null or unknown values.
pub fn map_status(id: &str, raw: Option<&str>) -> TableStatus {
    match raw {
        Some(text) => TableStatus::parse(text).unwrap_or_else(|| {
            tracing::warn!(
                "Unknown status '{}' for table {}, defaulting to AVAILABLE",
                text,
                id
            );
            TableStatus::Available
        }),
        None => {
            tracing::warn!("Null status for table {}, defaulting to AVAILABLE", id);
            TableStatus::Available
        }
    }
}

/// Owns the sorted table collection and applies remote events to it.
#[derive(Debug, Clone, Default)]
pub struct TableReconciler {
    tables: Vec<Table>,
}

impl TableReconciler {
    /// Create an empty reconciler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one remote event and report the resulting change.
    ///
    /// Events with an id that holds no digits are dropped with a log line;
    /// they never abort the subscription. `Cancelled` is not a collection
    /// event and always yields [`Diff::Noop`].
    pub fn apply(&mut self, event: &RemoteEvent) -> Diff {
        match event {
            RemoteEvent::Added { key, raw_status } => {
                self.upsert(Origin::Added, key, raw_status.as_deref())
            }
            RemoteEvent::Changed { key, raw_status } => {
                self.upsert(Origin::Changed, key, raw_status.as_deref())
            }
            RemoteEvent::Removed { key } => self.remove(key),
            RemoteEvent::Cancelled { error } => {
                tracing::debug!("Cancelled event passed to reconciler ignored: {}", error);
                Diff::Noop
            }
        }
    }

    /// Insert or update. `Added` for a known key and `Changed` for an
    /// unknown key both land here, which makes the two interchangeable.
    fn upsert(&mut self, origin: Origin, id: &str, raw_status: Option<&str>) -> Diff {
        let Some(key) = TableKey::from_id(id) else {
            tracing::error!("{}: cannot derive table number from id '{}', event dropped", origin.as_str(), id);
            return Diff::Noop;
        };
        let status = map_status(id, raw_status);

        match self.tables.binary_search_by_key(&key, |t| t.key) {
            Ok(index) => {
                let table = &mut self.tables[index];
                let old = table.status;
                table.status = status;
                tracing::debug!("{}: table {} {} -> {}", origin.as_str(), key, old, status);
                Diff::Updated {
                    index,
                    id: table.id.clone(),
                    key,
                    old,
                    new: status,
                }
            }
            Err(index) => {
                if origin == Origin::Changed {
                    tracing::warn!("changed: table {} not tracked yet, inserting it", key);
                }
                let table = Table::new(id, key, status);
                self.tables.insert(index, table.clone());
                tracing::debug!("{}: table {} inserted at {} as {}", origin.as_str(), key, index, status);
                Diff::Inserted {
                    index,
                    table,
                    origin,
                }
            }
        }
    }

    fn remove(&mut self, id: &str) -> Diff {
        let Some(key) = TableKey::from_id(id) else {
            tracing::error!("removed: cannot derive table number from id '{}', event dropped", id);
            return Diff::Noop;
        };

        match self.tables.binary_search_by_key(&key, |t| t.key) {
            Ok(index) => {
                let table = self.tables.remove(index);
                tracing::debug!("removed: table {} from {}", key, index);
                Diff::Removed { index, table }
            }
            Err(_) => Diff::Noop,
        }
    }

    /// Current collection, sorted by key.
    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    /// Look up a table by key.
    pub fn get(&self, key: TableKey) -> Option<&Table> {
        self.position(key).map(|i| &self.tables[i])
    }

    /// Position of a table in the sorted collection.
    pub fn position(&self, key: TableKey) -> Option<usize> {
        self.tables.binary_search_by_key(&key, |t| t.key).ok()
    }

    /// Number of tracked tables.
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Whether no tables are tracked.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
