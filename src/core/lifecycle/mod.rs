//! # Lifecycle engine: the phase functions.
//!
//! Each phase function takes a unit and a [`FailureMode`] and returns a future of the
//! unit. A phase only acts when the unit is in its source status; otherwise it resolves
//! immediately with the unit unchanged, which makes every phase idempotent.
//!
//! ```text
//! forward:   load ─► init ─► activate ─► (update)*
//! backward:  deactivate (children first) ─► release
//!
//! phase settles Ok  ─► next status
//! phase rejects     ─► transform(raw) ─► record fault ─► Broken ─┬─ Soft: report, Ok(unit)
//!                                                                └─ Hard: Err(fault)
//! ```
//!
//! ## Rules
//! - Every status write goes through [`Lifecycle::write_status`] and publishes `StatusChanged`.
//! - The fault is transformed before `Broken` is written, so its prefix names the status
//!   the unit died in.
//! - Init, activate, update, deactivate and release run under the watchdog with the unit's
//!   resolved bound; loading does not.

mod backward;
mod children;
mod forward;

pub use children::ChildHandle;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use crate::config::{Config, UnitTimeouts};
use crate::core::release::ReleaseRegistry;
use crate::core::watchdog::bounded_wait;
use crate::error::Fault;
use crate::events::{Bus, Event, EventKind};
use crate::faults::{FaultHandlers, transform};
use crate::units::{PhaseKind, Props, Unit, UnitId, UnitStatus};

/// How a phase surfaces its fault.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum FailureMode {
    /// Report to the fault handlers, mark `Broken`, resolve with the unit.
    Soft,
    /// Mark `Broken` and fail the returned future with the fault.
    Hard,
}

/// Result of a phase function.
pub(crate) type PhaseResult = Result<Arc<Unit>, Fault>;

/// Drives units through their status machine.
pub(crate) struct Lifecycle {
    bus: Bus,
    faults: Arc<FaultHandlers>,
    releases: Arc<ReleaseRegistry>,
    defaults: UnitTimeouts,
    warning_period: Duration,
    ids: AtomicU64,
    before_first_activation: AtomicBool,
    first_activation: AtomicBool,
}

impl Lifecycle {
    pub fn new(
        cfg: &Config,
        bus: Bus,
        faults: Arc<FaultHandlers>,
        releases: Arc<ReleaseRegistry>,
    ) -> Arc<Self> {
        Arc::new(Self {
            bus,
            faults,
            releases,
            defaults: cfg.timeouts,
            warning_period: cfg.warning_period,
            ids: AtomicU64::new(1),
            before_first_activation: AtomicBool::new(false),
            first_activation: AtomicBool::new(false),
        })
    }

    /// Allocates a process-unique unit id.
    pub fn next_id(&self) -> UnitId {
        self.ids.fetch_add(1, Ordering::Relaxed)
    }

    /// Global timeout defaults new units start with.
    pub fn defaults(&self) -> UnitTimeouts {
        self.defaults
    }

    /// Writes `next` and publishes `StatusChanged` if the status actually changed.
    pub fn write_status(&self, unit: &Unit, next: UnitStatus) {
        if unit.set_status(next).is_some() {
            self.publish_status(unit, next);
        }
    }

    /// Moves `from → to` atomically; returns `false` (no write) if the unit is elsewhere.
    fn enter(&self, unit: &Unit, from: UnitStatus, to: UnitStatus) -> bool {
        let moved = unit.with_state(|st| {
            if st.status != from {
                return false;
            }
            st.status = to;
            true
        });
        if moved {
            self.publish_status(unit, to);
        }
        moved
    }

    fn publish_status(&self, unit: &Unit, status: UnitStatus) {
        self.bus.publish(
            Event::new(EventKind::StatusChanged)
                .with_unit(unit.name())
                .with_status(status),
        );
    }

    /// Records `fault`, marks the unit `Broken` and surfaces the fault per `mode`.
    pub fn fail(&self, unit: Arc<Unit>, fault: Fault, mode: FailureMode) -> PhaseResult {
        unit.with_state(|st| st.fault = Some(fault.clone()));
        self.write_status(&unit, UnitStatus::Broken);
        match mode {
            FailureMode::Soft => {
                self.faults.report(fault);
                Ok(unit)
            }
            FailureMode::Hard => Err(fault),
        }
    }

    /// Runs the unit's `kind` implementation under the watchdog.
    async fn run_phase(self: &Arc<Self>, unit: &Arc<Unit>, kind: PhaseKind) -> Result<(), Fault> {
        let (phase, bound, name) = unit.with_state(|st| {
            (
                st.phases.as_ref().and_then(|p| p.get(kind)).cloned(),
                st.timeouts.get(kind),
                st.name.clone(),
            )
        });
        let Some(phase) = phase else {
            return Ok(());
        };

        let props = Props::for_unit(unit, self);
        let description = format!("{} for {} '{}'", kind.as_str(), unit.kind_label(), name);
        bounded_wait(phase.run(props), &description, bound, self.warning_period)
            .await
            .map_err(|failure| {
                let (kind, raw) = failure.into_parts();
                transform(raw, unit, kind)
            })
    }
}

#[cfg(test)]
mod tests;
