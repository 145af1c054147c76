//! # Child units.
//!
//! A child unit is created by a mount call from unit code ([`Props::mount_child`]) or from
//! the orchestrator root. It is owned by exactly one [`ChildMap`] and is driven in hard
//! mode, so every fault reaches the handle instead of the fault handlers.
//!
//! ```text
//! mount_child ─► insert into owner map ─► spawn driver:
//!                                           load ─► loaded()
//!                                           init ─► initialized()
//!                                           activate ─► activated()
//!                                           (any fault: settle remaining completions, detach)
//!
//! deactivate_child ─► deactivate(Hard) ─► detach from owner map ─► deactivated()
//! ```
//!
//! [`Props::mount_child`]: crate::units::Props::mount_child

use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::warn;

use super::{FailureMode, Lifecycle};
use crate::core::outcome::{Completion, Outcome};
use crate::error::{Fault, OrchestratorError};
use crate::units::{ChildMap, ChildSource, CustomProps, Role, Unit, UnitId, UnitStatus};

impl Lifecycle {
    /// Creates a child unit owned by `owner` and starts driving it to `Active`.
    pub fn mount_child(
        self: &Arc<Self>,
        owner: Arc<ChildMap>,
        source: ChildSource,
        custom: CustomProps,
    ) -> ChildHandle {
        let id = self.next_id();
        let name: Arc<str> = format!("child-{id}").into();
        let deactivated = Outcome::new(name.clone());
        let unit = Unit::new(
            id,
            name.clone(),
            Role::Child {
                parent: owner.owner(),
                owner: Arc::downgrade(&owner),
                deactivated: deactivated.clone(),
            },
            source.into_loader(),
            custom,
            self.defaults,
        );
        owner.insert(Arc::clone(&unit));

        let handle = ChildHandle {
            unit,
            lifecycle: Arc::clone(self),
            loaded: Outcome::new(name.clone()),
            initialized: Outcome::new(name.clone()),
            activated: Outcome::new(name),
            deactivated,
        };
        tokio::spawn(Arc::clone(self).drive_child(handle.clone()));
        handle
    }

    async fn drive_child(self: Arc<Self>, handle: ChildHandle) {
        let res = async {
            let unit = self.load(Arc::clone(&handle.unit), FailureMode::Hard).await?;
            handle.loaded.settle(Ok(()));
            let unit = self.init(unit, FailureMode::Hard).await?;
            handle.initialized.settle(Ok(()));
            self.activate(unit, FailureMode::Hard).await?;
            handle.activated.settle(Ok(()));
            Ok::<(), Fault>(())
        }
        .await;

        if let Err(fault) = res {
            warn!(unit = fault.unit(), "child unit failed to mount: {fault}");
            for outcome in [
                &handle.loaded,
                &handle.initialized,
                &handle.activated,
                &handle.deactivated,
            ] {
                outcome.settle(Err(fault.clone()));
            }
            detach(&handle.unit);
        }
    }

    /// Deactivates an `Active` child in hard mode and removes it from its owner.
    ///
    /// The child leaves the owner map whether the deactivation succeeds or faults.
    pub fn deactivate_child(
        self: &Arc<Self>,
        unit: Arc<Unit>,
    ) -> BoxFuture<'static, Result<Arc<Unit>, OrchestratorError>> {
        let this = Arc::clone(self);
        async move {
            let status = unit.status();
            if status != UnitStatus::Active {
                return Err(OrchestratorError::InvalidStatus {
                    unit: unit.name().to_string(),
                    status,
                    action: "deactivate",
                });
            }

            let res = this.deactivate(Arc::clone(&unit), FailureMode::Hard).await;
            detach(&unit);
            if let Role::Child { deactivated, .. } = unit.role() {
                deactivated.settle(res.as_ref().map(|_| ()).map_err(Fault::clone));
            }
            res.map_err(OrchestratorError::from)
        }
        .boxed()
    }
}

fn owner_map(unit: &Unit) -> Option<Arc<ChildMap>> {
    match unit.role() {
        Role::Child { owner, .. } => owner.upgrade(),
        Role::TopLevel { .. } => None,
    }
}

/// Removes a child from its owner map, if the owner still exists.
fn detach(unit: &Unit) {
    if let Some(map) = owner_map(unit) {
        map.remove(unit.id());
    }
}

/// Puts a child back into its owner map.
fn attach(unit: &Arc<Unit>) {
    if let Some(map) = owner_map(unit) {
        map.insert(Arc::clone(unit));
    }
}

/// Public handle to a child unit.
///
/// Every operation runs in hard mode: faults are returned to the caller and are not
/// delivered to the fault handlers.
#[derive(Clone)]
pub struct ChildHandle {
    unit: Arc<Unit>,
    lifecycle: Arc<Lifecycle>,
    loaded: Outcome,
    initialized: Outcome,
    activated: Outcome,
    deactivated: Outcome,
}

impl ChildHandle {
    pub fn id(&self) -> UnitId {
        self.unit.id()
    }

    /// Current name; `child-<id>` unless the exports named the unit.
    pub fn name(&self) -> String {
        self.unit.name().to_string()
    }

    /// Id of the owning unit; `None` when mounted on the orchestrator root.
    pub fn parent_id(&self) -> Option<UnitId> {
        match self.unit.role() {
            Role::Child { parent, .. } => *parent,
            Role::TopLevel { .. } => None,
        }
    }

    pub fn status(&self) -> UnitStatus {
        self.unit.status()
    }

    /// Fault that broke the unit, if any.
    pub fn fault(&self) -> Option<Fault> {
        self.unit.fault()
    }

    /// Activates an `Inactive` child again and re-attaches it to its owner.
    ///
    /// # Errors
    /// - [`OrchestratorError::InvalidStatus`] unless the child is `Inactive`;
    /// - [`OrchestratorError::Fault`] if the activate phase faults (the child is detached).
    pub async fn activate(&self) -> Result<(), OrchestratorError> {
        let status = self.unit.status();
        if status != UnitStatus::Inactive {
            return Err(OrchestratorError::InvalidStatus {
                unit: self.name(),
                status,
                action: "activate",
            });
        }

        attach(&self.unit);
        match self
            .lifecycle
            .activate(Arc::clone(&self.unit), FailureMode::Hard)
            .await
        {
            Ok(_) => Ok(()),
            Err(fault) => {
                detach(&self.unit);
                Err(fault.into())
            }
        }
    }

    /// Deactivates an `Active` child, children first.
    pub async fn deactivate(&self) -> Result<(), OrchestratorError> {
        self.lifecycle
            .deactivate_child(Arc::clone(&self.unit))
            .await
            .map(|_| ())
    }

    /// Replaces the custom props and runs the update phase.
    pub async fn update(&self, custom: CustomProps) -> Result<(), OrchestratorError> {
        self.lifecycle
            .update(Arc::clone(&self.unit), Some(custom))
            .await
            .map(|_| ())
    }

    /// Settles when the code has loaded.
    pub fn loaded(&self) -> Completion {
        self.loaded.completion()
    }

    /// Settles when the init phase has completed.
    pub fn initialized(&self) -> Completion {
        self.initialized.completion()
    }

    /// Settles when the first activation has completed.
    pub fn activated(&self) -> Completion {
        self.activated.completion()
    }

    /// Settles when the first deactivation has completed.
    pub fn deactivated(&self) -> Completion {
        self.deactivated.completion()
    }
}

impl std::fmt::Debug for ChildHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChildHandle")
            .field("id", &self.unit.id())
            .field("name", &self.unit.name())
            .field("status", &self.unit.status())
            .finish()
    }
}
