//! Backward phases: deactivate, release.

use std::sync::Arc;

use futures::FutureExt;
use futures::future::{BoxFuture, join_all};

use super::{FailureMode, Lifecycle, PhaseResult};
use crate::error::{FaultKind, Rejection};
use crate::faults::transform;
use crate::units::{PhaseKind, Unit, UnitStatus};

impl Lifecycle {
    /// `Active → Deactivating → Inactive`.
    ///
    /// Children are deactivated concurrently before the unit's own implementation runs.
    /// The unit's own deactivate still runs when a child fails; the unit then ends
    /// `Broken` with an aggregate fault carrying the first child's message. Children that
    /// deactivated successfully stay deactivated.
    pub fn deactivate(self: &Arc<Self>, unit: Arc<Unit>, mode: FailureMode) -> BoxFuture<'static, PhaseResult> {
        let this = Arc::clone(self);
        async move {
            if !this.enter(&unit, UnitStatus::Active, UnitStatus::Deactivating) {
                return Ok(unit);
            }

            let children = unit.children().snapshot();
            let child_fault = join_all(children.into_iter().map(|c| this.deactivate_child(c)))
                .await
                .into_iter()
                .find_map(Result::err);

            let own = this.run_phase(&unit, PhaseKind::Deactivate).await;
            match (own, child_fault) {
                (Err(fault), _) => this.fail(unit, fault, mode),
                (Ok(()), Some(child)) => {
                    let raw = Rejection::message(child.to_string());
                    let fault = transform(raw, &unit, FaultKind::AggregateChild);
                    this.fail(unit, fault, mode)
                }
                (Ok(()), None) => {
                    this.write_status(&unit, UnitStatus::Inactive);
                    Ok(unit)
                }
            }
        }
        .boxed()
    }

    /// `Inactive → Releasing → Unloaded`.
    ///
    /// Phase implementations are dropped whether or not the release implementation
    /// succeeds. A pending release request for the unit is settled last, exactly once.
    pub fn release(self: &Arc<Self>, unit: Arc<Unit>, mode: FailureMode) -> BoxFuture<'static, PhaseResult> {
        let this = Arc::clone(self);
        async move {
            match unit.status() {
                UnitStatus::Unloaded => {
                    this.releases.settle(&unit, Ok(()));
                    return Ok(unit);
                }
                UnitStatus::Releasing => {
                    // Another caller owns this release; its outcome is theirs to report.
                    if let Some(in_flight) = this.releases.get(&unit) {
                        let _ = in_flight.await;
                    }
                    return Ok(unit);
                }
                _ => {}
            }
            if !this.enter(&unit, UnitStatus::Inactive, UnitStatus::Releasing) {
                return Ok(unit);
            }

            let res = this.run_phase(&unit, PhaseKind::Release).await;
            unit.with_state(|st| st.phases = None);

            match res {
                Ok(()) => {
                    this.write_status(&unit, UnitStatus::Unloaded);
                    this.releases.settle(&unit, Ok(()));
                    Ok(unit)
                }
                Err(fault) => {
                    let out = this.fail(Arc::clone(&unit), fault.clone(), mode);
                    this.releases.settle(&unit, Err(fault));
                    out
                }
            }
        }
        .boxed()
    }
}
