//! Forward phases: load, init, activate, update.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use futures::FutureExt;
use futures::future::BoxFuture;

use super::{FailureMode, Lifecycle, PhaseResult};
use crate::error::{FaultKind, OrchestratorError, Rejection, panic_message};
use crate::events::{Event, EventKind};
use crate::faults::transform;
use crate::units::{CustomProps, PhaseKind, Props, Unit, UnitStatus};

impl Lifecycle {
    /// `Unloaded → LoadingCode → Uninitialized`, or `Broken` on a load fault.
    ///
    /// Invalid exports and a panicking loader are load faults too; loading never
    /// reaches the watchdog.
    pub fn load(self: &Arc<Self>, unit: Arc<Unit>, mode: FailureMode) -> BoxFuture<'static, PhaseResult> {
        let this = Arc::clone(self);
        async move {
            if !this.enter(&unit, UnitStatus::Unloaded, UnitStatus::LoadingCode) {
                return Ok(unit);
            }

            let props = Props::for_unit(&unit, &this);
            let loader = Arc::clone(unit.loader());
            let loaded = AssertUnwindSafe(async move { loader(props).await })
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| {
                    Err(Rejection::message(format!(
                        "loader panicked: {}",
                        panic_message(panic.as_ref())
                    )))
                });
            let exports = match loaded {
                Ok(exports) => exports,
                Err(raw) => {
                    let fault = transform(raw, &unit, FaultKind::Load);
                    return this.fail(unit, fault, mode);
                }
            };

            let phases = match exports.validate() {
                Ok(phases) => phases,
                Err(reason) => {
                    let raw = Rejection::message(format!("'{}' {reason}", unit.name()));
                    let fault = transform(raw, &unit, FaultKind::Load);
                    return this.fail(unit, fault, mode);
                }
            };

            let timeouts = this.defaults.merged(&exports.timeouts);
            let rename = if unit.is_child() { exports.name } else { None };
            unit.with_state(|st| {
                if let Some(name) = rename {
                    st.name = name.into();
                }
                st.phases = Some(phases);
                st.timeouts = timeouts;
            });
            this.write_status(&unit, UnitStatus::Uninitialized);
            Ok(unit)
        }
        .boxed()
    }

    /// `Uninitialized → Initializing → Inactive`.
    pub fn init(self: &Arc<Self>, unit: Arc<Unit>, mode: FailureMode) -> BoxFuture<'static, PhaseResult> {
        let this = Arc::clone(self);
        async move {
            if !this.enter(&unit, UnitStatus::Uninitialized, UnitStatus::Initializing) {
                return Ok(unit);
            }
            match this.run_phase(&unit, PhaseKind::Init).await {
                Ok(()) => {
                    this.write_status(&unit, UnitStatus::Inactive);
                    Ok(unit)
                }
                Err(fault) => this.fail(unit, fault, mode),
            }
        }
        .boxed()
    }

    /// `Inactive → Activating → Active`.
    ///
    /// On failure the unit is treated as `Active` and deactivated first, so partially
    /// activated resources are released; `Broken` is written once that settles.
    pub fn activate(self: &Arc<Self>, unit: Arc<Unit>, mode: FailureMode) -> BoxFuture<'static, PhaseResult> {
        let this = Arc::clone(self);
        async move {
            if unit.status() != UnitStatus::Inactive {
                return Ok(unit);
            }
            if !this.before_first_activation.swap(true, Ordering::SeqCst) {
                this.bus.publish(Event::new(EventKind::BeforeFirstActivation));
            }
            if !this.enter(&unit, UnitStatus::Inactive, UnitStatus::Activating) {
                return Ok(unit);
            }

            match this.run_phase(&unit, PhaseKind::Activate).await {
                Ok(()) => {
                    this.write_status(&unit, UnitStatus::Active);
                    if !this.first_activation.swap(true, Ordering::SeqCst) {
                        this.bus
                            .publish(Event::new(EventKind::FirstActivation).with_unit(unit.name()));
                    }
                    Ok(unit)
                }
                Err(fault) => {
                    this.write_status(&unit, UnitStatus::Active);
                    // The cleanup outcome is superseded by the activation fault.
                    let _ = this.deactivate(Arc::clone(&unit), FailureMode::Hard).await;
                    this.fail(unit, fault, mode)
                }
            }
        }
        .boxed()
    }

    /// `Active → Updating → Active`, always in hard mode.
    ///
    /// Fails without touching the status or the props when the unit is not `Active` or
    /// does not export an update implementation. `custom`, when given, replaces the
    /// unit's props together with the `Active → Updating` write.
    pub fn update(
        self: &Arc<Self>,
        unit: Arc<Unit>,
        custom: Option<CustomProps>,
    ) -> BoxFuture<'static, Result<Arc<Unit>, OrchestratorError>> {
        let this = Arc::clone(self);
        async move {
            unit.with_state(|st| {
                let supported = st.phases.as_ref().is_some_and(|p| p.update.is_some());
                if st.status != UnitStatus::Active {
                    return Err(OrchestratorError::InvalidStatus {
                        unit: st.name.to_string(),
                        status: st.status,
                        action: "update",
                    });
                }
                if !supported {
                    return Err(OrchestratorError::Unsupported {
                        unit: st.name.to_string(),
                        capability: "update",
                    });
                }
                st.status = UnitStatus::Updating;
                if let Some(custom) = custom {
                    st.custom = Arc::new(custom);
                }
                Ok(())
            })?;
            this.publish_status(&unit, UnitStatus::Updating);

            match this.run_phase(&unit, PhaseKind::Update).await {
                Ok(()) => {
                    this.write_status(&unit, UnitStatus::Active);
                    Ok(unit)
                }
                Err(fault) => this
                    .fail(unit, fault, FailureMode::Hard)
                    .map_err(OrchestratorError::from),
            }
        }
        .boxed()
    }
}
