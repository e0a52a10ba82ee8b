//! Per-user exclusion for reconciliation runs within one process.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Tracks which users have a run in flight.
#[derive(Debug, Clone, Default)]
pub struct RunRegistry {
    active: Arc<DashMap<String, Uuid>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `user_id` for `run_id`. Returns `None` while another run holds
    /// it.
    pub fn try_acquire(&self, user_id: &str, run_id: Uuid) -> Option<RunGuard> {
        match self.active.entry(user_id.to_string()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                slot.insert(run_id);
                Some(RunGuard {
                    active: Arc::clone(&self.active),
                    user_id: user_id.to_string(),
                    run_id,
                })
            }
        }
    }

    pub fn active_run(&self, user_id: &str) -> Option<Uuid> {
        self.active.get(user_id).map(|r| *r.value())
    }
}

/// Releases the user's slot when dropped, including when the run's future is
/// cancelled.
#[derive(Debug)]
pub struct RunGuard {
    active: Arc<DashMap<String, Uuid>>,
    user_id: String,
    run_id: Uuid,
}

impl RunGuard {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.active
            .remove_if(&self.user_id, |_, run_id| *run_id == self.run_id);
    }
}
