//! Shared context handed to the coordinator.
//!
//! Bundles the loaded configuration with the session store that gates
//! starting a subscription.

use std::sync::{Arc, PoisonError, RwLock};

use crate::config::SyncConfig;

/// Read access to the staff login session.
pub trait SessionStore: Send + Sync {
    /// Whether a staff member is logged in.
    fn is_logged_in(&self) -> bool;

    /// Id of the logged-in staff member.
    fn current_staff_id(&self) -> Option<String>;
}

/// In-memory session store.
#[derive(Debug, Default)]
pub struct MemorySession {
    staff_id: RwLock<Option<String>>,
}

impl MemorySession {
    /// Create a logged-out session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session already logged in as `staff_id`.
    pub fn logged_in(staff_id: impl Into<String>) -> Self {
        let session = Self::new();
        session.login(staff_id);
        session
    }

    /// Log in as `staff_id`.
    pub fn login(&self, staff_id: impl Into<String>) {
        *self.staff_id.write().unwrap_or_else(PoisonError::into_inner) = Some(staff_id.into());
    }

    /// Log out.
    pub fn logout(&self) {
        *self.staff_id.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl SessionStore for MemorySession {
    fn is_logged_in(&self) -> bool {
        self.staff_id
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn current_staff_id(&self) -> Option<String> {
        self.staff_id
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Configuration plus session, passed explicitly instead of living in
/// globals.
#[derive(Clone)]
pub struct SyncContext {
    /// Loaded configuration.
    pub config: SyncConfig,
    /// Session gate for explicit starts.
    pub session: Arc<dyn SessionStore>,
}

impl SyncContext {
    /// Create a context.
    pub fn new(config: SyncConfig, session: Arc<dyn SessionStore>) -> Self {
        Self { config, session }
    }
}

impl std::fmt::Debug for SyncContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncContext")
            .field("config", &self.config)
            .field("logged_in", &self.session.is_logged_in())
            .finish()
    }
}
