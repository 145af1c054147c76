//! # Release-dedup registry.
//!
//! At most one pending release exists per top-level unit name. Every requester of the
//! same name receives a [`Completion`] over the one shared [`Outcome`]; the release
//! phase settles it exactly once and removes the entry.
//!
//! ```text
//! request("nav") ──► new entry ──► Completion ─┐
//! request("nav") ──► existing  ──► Completion ─┼─ same shared future
//!                                              │
//! release phase ──► settle("nav", res) ────────┘ (entry removed)
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::outcome::{Completion, Outcome};
use crate::error::Fault;
use crate::units::Unit;

/// Options for [`Orchestrator::release`](crate::Orchestrator::release).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReleaseOptions {
    /// Leave the unit alone until a pass deactivates it, then release it in that pass.
    pub wait_for_deactivate: bool,
}

impl ReleaseOptions {
    /// Options that defer the release to the pass that deactivates the unit.
    pub fn deferred() -> Self {
        Self {
            wait_for_deactivate: true,
        }
    }
}

struct PendingRelease {
    unit: Arc<Unit>,
    outcome: Outcome,
}

/// Pending release requests keyed by unit name.
pub(crate) struct ReleaseRegistry {
    pending: Mutex<HashMap<Arc<str>, PendingRelease>>,
}

impl ReleaseRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            pending: Mutex::new(HashMap::new()),
        })
    }

    /// Registers a pending release for `unit`, or joins the existing one.
    ///
    /// Returns the shared completion and whether a new entry was created.
    pub fn request(&self, unit: &Arc<Unit>) -> (Completion, bool) {
        let name = unit.name();
        let mut pending = self.pending.lock();
        if let Some(entry) = pending.get(&name) {
            return (entry.outcome.completion(), false);
        }
        let outcome = Outcome::new(name.clone());
        let completion = outcome.completion();
        pending.insert(
            name,
            PendingRelease {
                unit: Arc::clone(unit),
                outcome,
            },
        );
        (completion, true)
    }

    /// Completion of the pending release for `unit`, if any.
    pub fn get(&self, unit: &Unit) -> Option<Completion> {
        self.pending
            .lock()
            .get(&unit.name())
            .filter(|entry| entry.unit.id() == unit.id())
            .map(|entry| entry.outcome.completion())
    }

    pub fn is_pending(&self, unit: &Unit) -> bool {
        self.get(unit).is_some()
    }

    /// Settles and removes the pending release of `unit`. Returns `false` if none existed.
    pub fn settle(&self, unit: &Unit, res: Result<(), Fault>) -> bool {
        let name = unit.name();
        let entry = {
            let mut pending = self.pending.lock();
            let owned = pending
                .get(&name)
                .is_some_and(|entry| entry.unit.id() == unit.id());
            if owned { pending.remove(&name) } else { None }
        };
        match entry {
            Some(entry) => entry.outcome.settle(res),
            None => false,
        }
    }
}
