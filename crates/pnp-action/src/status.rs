//! Per-action status key-value store.
//!
//! Entries live under `status:<action>`. The command-dispatch side writes
//! `started`, running instances write `running` and their outcome, and the
//! execution controller polls the value.

use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock};

use pnp_core::ActionStatus;

/// Key under which the status of an action is stored.
pub fn status_key(action: &str) -> String {
    format!("status:{}", action)
}

/// Shared store of externally observed action status.
pub trait StatusStore: Send + Sync {
    fn get(&self, action: &str) -> Option<ActionStatus>;
    fn set(&self, action: &str, status: ActionStatus);
}

/// In-process status store.
#[derive(Debug, Default)]
pub struct InMemoryStatusStore {
    entries: RwLock<HashMap<String, ActionStatus>>,
}

impl InMemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All entries keyed by their `status:<action>` key.
    pub fn snapshot(&self) -> BTreeMap<String, ActionStatus> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect()
    }
}

impl StatusStore for InMemoryStatusStore {
    fn get(&self, action: &str) -> Option<ActionStatus> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&status_key(action))
            .copied()
    }

    fn set(&self, action: &str, status: ActionStatus) {
        tracing::debug!(action = %action, status = %status, "Status update");
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(status_key(action), status);
    }
}
