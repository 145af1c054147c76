//! # Unit: the orchestrated entity.
//!
//! A [`Unit`] is either a registered top-level unit (owns an activation predicate and
//! lives in the registry forever) or a child unit (owned by the [`ChildMap`] of another
//! unit, or of the orchestrator root, until its deactivation settles).
//!
//! ## Rules
//! - All mutable fields sit behind one short-lived lock; it is never held across `.await`.
//! - Phase implementations exist only between a successful load and the next release.
//! - `status` is only written by the lifecycle engine.

use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::{Map, Value};

use crate::config::UnitTimeouts;
use crate::core::Outcome;
use crate::error::{Fault, Rejection, panic_message};
use crate::units::{Context, Loader, PhaseSet, UnitStatus};

/// Process-unique unit identifier.
pub type UnitId = u64;

/// Opaque key/value bag handed to every phase invocation.
pub type CustomProps = Map<String, Value>;

/// Activation predicate of a top-level unit.
pub type ActivationPredicate = Arc<dyn Fn(&Context) -> Result<bool, Rejection> + Send + Sync>;

/// Ownership-specific data.
pub(crate) enum Role {
    TopLevel {
        predicate: ActivationPredicate,
    },
    Child {
        parent: Option<UnitId>,
        owner: Weak<ChildMap>,
        deactivated: Outcome,
    },
}

/// Mutable part of a unit.
pub(crate) struct UnitState {
    pub name: Arc<str>,
    pub status: UnitStatus,
    pub phases: Option<PhaseSet>,
    pub custom: Arc<CustomProps>,
    pub timeouts: UnitTimeouts,
    pub fault: Option<Fault>,
}

pub(crate) struct Unit {
    id: UnitId,
    role: Role,
    loader: Loader,
    children: Arc<ChildMap>,
    state: Mutex<UnitState>,
}

impl std::fmt::Debug for Unit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Unit").field("id", &self.id).finish_non_exhaustive()
    }
}

impl Unit {
    pub fn new(
        id: UnitId,
        name: Arc<str>,
        role: Role,
        loader: Loader,
        custom: CustomProps,
        timeouts: UnitTimeouts,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            role,
            loader,
            children: Arc::new(ChildMap::new(Some(id))),
            state: Mutex::new(UnitState {
                name,
                status: UnitStatus::Unloaded,
                phases: None,
                custom: Arc::new(custom),
                timeouts,
                fault: None,
            }),
        })
    }

    pub fn id(&self) -> UnitId {
        self.id
    }

    pub fn role(&self) -> &Role {
        &self.role
    }

    pub fn loader(&self) -> &Loader {
        &self.loader
    }

    pub fn children(&self) -> &Arc<ChildMap> {
        &self.children
    }

    pub fn is_child(&self) -> bool {
        matches!(self.role, Role::Child { .. })
    }

    /// Kind label used in fault prefixes.
    pub fn kind_label(&self) -> &'static str {
        if self.is_child() { "child-unit" } else { "unit" }
    }

    pub fn name(&self) -> Arc<str> {
        self.state.lock().name.clone()
    }

    pub fn status(&self) -> UnitStatus {
        self.state.lock().status
    }

    /// Runs `f` with the state locked.
    pub fn with_state<R>(&self, f: impl FnOnce(&mut UnitState) -> R) -> R {
        f(&mut self.state.lock())
    }

    /// Writes `next` and returns the previous status when it changed.
    ///
    /// Only the lifecycle engine calls this; edges outside the state machine are a bug.
    pub fn set_status(&self, next: UnitStatus) -> Option<UnitStatus> {
        let mut st = self.state.lock();
        let prev = st.status;
        debug_assert!(
            prev.permits(next),
            "illegal transition {prev} -> {next} for '{}'",
            st.name
        );
        if prev == next {
            return None;
        }
        st.status = next;
        Some(prev)
    }

    /// Evaluates the activation predicate. Child units are never predicate-driven.
    ///
    /// A panicking predicate is reported as a rejection.
    pub fn evaluate(&self, ctx: &Context) -> Result<bool, Rejection> {
        match &self.role {
            Role::TopLevel { predicate } => catch_unwind(AssertUnwindSafe(|| predicate(ctx)))
                .unwrap_or_else(|panic| {
                    Err(Rejection::message(format!(
                        "activation predicate panicked: {}",
                        panic_message(panic.as_ref())
                    )))
                }),
            Role::Child { .. } => Ok(false),
        }
    }

    pub fn fault(&self) -> Option<Fault> {
        self.state.lock().fault.clone()
    }
}

/// Child units owned by one unit (or by the orchestrator root).
pub(crate) struct ChildMap {
    owner: Option<UnitId>,
    entries: Mutex<BTreeMap<UnitId, Arc<Unit>>>,
}

impl ChildMap {
    pub fn new(owner: Option<UnitId>) -> Self {
        Self {
            owner,
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    /// Id of the owning unit; `None` for the root map.
    pub fn owner(&self) -> Option<UnitId> {
        self.owner
    }

    pub fn insert(&self, child: Arc<Unit>) {
        self.entries.lock().insert(child.id(), child);
    }

    pub fn remove(&self, id: UnitId) -> Option<Arc<Unit>> {
        self.entries.lock().remove(&id)
    }

    #[cfg(test)]
    pub fn contains(&self, id: UnitId) -> bool {
        self.entries.lock().contains_key(&id)
    }

    pub fn snapshot(&self) -> Vec<Arc<Unit>> {
        self.entries.lock().values().cloned().collect()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }
}
