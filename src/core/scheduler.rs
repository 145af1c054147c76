//! # Scheduler: serialized reevaluation passes.
//!
//! [`Scheduler::trigger`] either starts a pass or, if one is underway, queues the caller.
//! Callers queued during a pass seed exactly one follow-up pass and all observe the same
//! active-unit list.
//!
//! ```text
//! trigger(ctx) ─► underway? ── yes ──► queue waiter, return its future
//!                    │
//!                    no ──► underway = true, spawn pass(seed = [caller])
//!
//! pass (started):
//!   partition ─► BeforePass
//!   ├─ barrier  = release(toRelease) ∪ deactivate→release(toDeactivateThenRelease)
//!   ├─ toLoadThenActivate: load ─► init ─► await barrier ─► activate
//!   └─ toActivateOnly:            init ─► await barrier ─► activate
//!   PassComplete{no_op} ─► RoutingEvent ─► resolve seeds with active names
//!
//! pass (not started):
//!   load every eligible unit ─► PassComplete ─► RoutingEvent ─► resolve seeds
//!
//! finish: queued waiters? ── yes ──► spawn follow-up pass seeded with them
//!                              no  ──► underway = false
//! ```
//!
//! ## Rules
//! - Exactly one pass is underway at any time.
//! - No unit activates before the barrier of its pass has settled.
//! - Each unit's activation predicate is evaluated once per pass; a faulting or panicking
//!   predicate breaks the unit (soft) and counts as `false`.
//! - A pass aborted by a fault or a panic rejects its seed callers; queued callers still
//!   get their pass.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::FutureExt;
use futures::future::{BoxFuture, join_all, try_join_all};
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::core::lifecycle::{FailureMode, Lifecycle};
use crate::core::registry::Registry;
use crate::core::release::ReleaseRegistry;
use crate::error::{Fault, FaultKind, OrchestratorError, panic_message};
use crate::events::{Bus, Event, EventKind};
use crate::faults::transform;
use crate::units::{Context, Unit, UnitStatus};

/// Result delivered to every caller of one pass.
pub(crate) type PassResult = Result<Vec<String>, OrchestratorError>;

/// A caller waiting on a pass.
struct Waiter {
    tx: oneshot::Sender<PassResult>,
    context: Context,
}

#[derive(Default)]
struct PassState {
    underway: bool,
    waiting: Vec<Waiter>,
    last_context: Option<Context>,
}

/// Disjoint work sets of one started pass.
#[derive(Default)]
struct WorkSets {
    release: Vec<Arc<Unit>>,
    deactivate_then_release: Vec<Arc<Unit>>,
    load_then_activate: Vec<Arc<Unit>>,
    activate_only: Vec<Arc<Unit>>,
}

impl WorkSets {
    fn is_empty(&self) -> bool {
        self.release.is_empty()
            && self.deactivate_then_release.is_empty()
            && self.load_then_activate.is_empty()
            && self.activate_only.is_empty()
    }
}

/// Serializes and batches reevaluation passes.
pub(crate) struct Scheduler {
    registry: Arc<Registry>,
    lifecycle: Arc<Lifecycle>,
    releases: Arc<ReleaseRegistry>,
    bus: Bus,
    started: AtomicBool,
    state: Mutex<PassState>,
}

impl Scheduler {
    pub fn new(
        registry: Arc<Registry>,
        lifecycle: Arc<Lifecycle>,
        releases: Arc<ReleaseRegistry>,
        bus: Bus,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            lifecycle,
            releases,
            bus,
            started: AtomicBool::new(false),
            state: Mutex::new(PassState::default()),
        })
    }

    /// Marks the orchestrator started; later passes initialize and activate units.
    pub fn mark_started(&self) {
        self.started.store(true, Ordering::SeqCst);
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Context of the most recent trigger, if any.
    pub fn last_context(&self) -> Option<Context> {
        self.state.lock().last_context.clone()
    }

    /// Requests a reevaluation with `ctx`.
    ///
    /// The caller is registered immediately; the returned future only waits for the
    /// pass that resolves it.
    pub fn trigger(self: &Arc<Self>, ctx: Context) -> BoxFuture<'static, PassResult> {
        let (tx, rx) = oneshot::channel();
        let waiter = Waiter {
            tx,
            context: ctx.clone(),
        };

        let start = {
            let mut st = self.state.lock();
            st.last_context = Some(ctx.clone());
            if st.underway {
                st.waiting.push(waiter);
                None
            } else {
                st.underway = true;
                Some(waiter)
            }
        };
        if let Some(seed) = start {
            tokio::spawn(Arc::clone(self).run_pass(vec![seed], ctx));
        }

        async move {
            rx.await.unwrap_or_else(|_| {
                Err(OrchestratorError::PassAborted {
                    reason: "the pass was dropped before settling".into(),
                })
            })
        }
        .boxed()
    }

    fn run_pass(self: Arc<Self>, seeds: Vec<Waiter>, ctx: Context) -> BoxFuture<'static, ()> {
        let this = Arc::clone(&self);
        let pass_ctx = ctx.clone();
        let work = async move {
            if this.is_started() {
                this.perform_changes(&pass_ctx).await
            } else {
                this.load_only(&pass_ctx).await
            }
        }
        .boxed();
        self.settle_pass(seeds, ctx, work)
    }

    /// Runs `work`, resolves the seeds and hands over to the queued callers.
    ///
    /// A panic in `work` aborts the pass like a fault does; the hand-over always runs.
    fn settle_pass(
        self: Arc<Self>,
        seeds: Vec<Waiter>,
        ctx: Context,
        work: BoxFuture<'static, Result<bool, OrchestratorError>>,
    ) -> BoxFuture<'static, ()> {
        async move {
            let res = AssertUnwindSafe(work)
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| {
                    Err(OrchestratorError::PassAborted {
                        reason: format!("pass panicked: {}", panic_message(panic.as_ref())),
                    })
                });

            match res {
                Ok(no_op) => {
                    self.bus.publish(
                        Event::new(EventKind::PassComplete)
                            .with_no_op(no_op)
                            .with_trigger(Some(ctx.clone())),
                    );
                    self.bus
                        .publish(Event::new(EventKind::RoutingEvent).with_trigger(Some(ctx)));
                    let active = self.registry.active_names().await;
                    for waiter in seeds {
                        let _ = waiter.tx.send(Ok(active.clone()));
                    }
                }
                Err(err) => {
                    for waiter in seeds {
                        let _ = waiter.tx.send(Err(err.clone()));
                    }
                }
            }

            let next = {
                let mut st = self.state.lock();
                if st.waiting.is_empty() {
                    st.underway = false;
                    None
                } else {
                    Some(std::mem::take(&mut st.waiting))
                }
            };
            if let Some(waiters) = next {
                let ctx = waiters
                    .last()
                    .map(|w| w.context.clone())
                    .unwrap_or_default();
                tokio::spawn(self.run_pass(waiters, ctx));
            }
        }
        .boxed()
    }

    /// Pre-start pass: loads eligible units only.
    async fn load_only(&self, ctx: &Context) -> Result<bool, OrchestratorError> {
        let mut to_load = Vec::new();
        for unit in self.registry.snapshot().await {
            if unit.status() == UnitStatus::Unloaded && self.should_be_active(&unit, ctx) {
                to_load.push(unit);
            }
        }
        let no_op = to_load.is_empty();
        join_all(
            to_load
                .into_iter()
                .map(|u| self.lifecycle.load(u, FailureMode::Soft)),
        )
        .await;
        Ok(no_op)
    }

    /// Started pass: partition, barrier, activations.
    async fn perform_changes(&self, ctx: &Context) -> Result<bool, OrchestratorError> {
        let sets = self.partition(ctx).await;
        let no_op = sets.is_empty();
        self.bus
            .publish(Event::new(EventKind::BeforePass).with_trigger(Some(ctx.clone())));

        let lc = &self.lifecycle;

        let releases = sets
            .release
            .into_iter()
            .map(|u| lc.release(u, FailureMode::Soft));
        let deactivations = sets.deactivate_then_release.into_iter().map(|u| {
            let lc = Arc::clone(lc);
            let releases = Arc::clone(&self.releases);
            async move {
                let unit = lc.deactivate(u, FailureMode::Soft).await?;
                if releases.is_pending(&unit) {
                    lc.release(unit, FailureMode::Soft).await
                } else {
                    Ok(unit)
                }
            }
            .boxed()
        });
        let barrier = try_join_all(releases.chain(deactivations))
            .map(|res| res.map(|_| ()))
            .boxed()
            .shared();

        let loads = sets.load_then_activate.into_iter().map(|u| {
            let lc = Arc::clone(lc);
            let barrier = barrier.clone();
            async move {
                let unit = lc.load(u, FailureMode::Soft).await?;
                let unit = lc.init(unit, FailureMode::Soft).await?;
                barrier.await?;
                lc.activate(unit, FailureMode::Soft).await
            }
            .boxed()
        });
        let inits = sets.activate_only.into_iter().map(|u| {
            let lc = Arc::clone(lc);
            let barrier = barrier.clone();
            async move {
                let unit = lc.init(u, FailureMode::Soft).await?;
                barrier.await?;
                lc.activate(unit, FailureMode::Soft).await
            }
            .boxed()
        });
        let activations: Vec<_> = loads.chain(inits).collect();

        let (barrier_res, activated) = futures::join!(barrier, try_join_all(activations));
        barrier_res.map_err(abort)?;
        activated.map_err(abort)?;
        Ok(no_op)
    }

    /// Splits the registry into the work sets of one pass.
    async fn partition(&self, ctx: &Context) -> WorkSets {
        let mut sets = WorkSets::default();
        for unit in self.registry.snapshot().await {
            if unit.status().is_broken() {
                continue;
            }
            let active = self.should_be_active(&unit, ctx);
            match unit.status() {
                UnitStatus::Unloaded if active => sets.load_then_activate.push(unit),
                UnitStatus::Unloaded | UnitStatus::Uninitialized | UnitStatus::Inactive
                    if !active && self.releases.is_pending(&unit) =>
                {
                    sets.release.push(unit)
                }
                UnitStatus::Uninitialized | UnitStatus::Inactive if active => {
                    sets.activate_only.push(unit)
                }
                UnitStatus::Active if !active => sets.deactivate_then_release.push(unit),
                _ => {}
            }
        }
        sets
    }

    /// Guarded predicate call; a fault breaks the unit and counts as `false`.
    fn should_be_active(&self, unit: &Arc<Unit>, ctx: &Context) -> bool {
        if unit.status().is_broken() {
            return false;
        }
        match unit.evaluate(ctx) {
            Ok(active) => active,
            Err(raw) => {
                let fault = transform(raw, unit, FaultKind::Phase);
                let _ = self
                    .lifecycle
                    .fail(Arc::clone(unit), fault, FailureMode::Soft);
                false
            }
        }
    }

    /// Names whose predicate is true for `ctx`, without touching any status.
    pub async fn check_activity(&self, ctx: &Context) -> Vec<String> {
        self.registry
            .snapshot()
            .await
            .into_iter()
            .filter(|u| !u.status().is_broken() && matches!(u.evaluate(ctx), Ok(true)))
            .map(|u| u.name().to_string())
            .collect()
    }
}

fn abort(fault: Fault) -> OrchestratorError {
    OrchestratorError::PassAborted {
        reason: fault.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::faults::FaultHandlers;

    fn scheduler() -> Arc<Scheduler> {
        let bus = Bus::new(64);
        let releases = ReleaseRegistry::new();
        let lifecycle = Lifecycle::new(
            &Config::default(),
            bus.clone(),
            Arc::new(FaultHandlers::new(bus.clone())),
            Arc::clone(&releases),
        );
        Scheduler::new(Registry::new(), lifecycle, releases, bus)
    }

    #[tokio::test]
    async fn panicking_pass_still_serves_queued_callers() {
        let sched = scheduler();
        sched.state.lock().underway = true;
        let queued = sched.trigger(Context::new("/next"));

        let (tx, rx) = oneshot::channel();
        let seed = Waiter {
            tx,
            context: Context::empty(),
        };
        let work = async {
            if true {
                panic!("pass exploded");
            }
            Ok(true)
        }
        .boxed();
        Arc::clone(&sched)
            .settle_pass(vec![seed], Context::empty(), work)
            .await;

        match rx.await.unwrap() {
            Err(OrchestratorError::PassAborted { reason }) => {
                assert_eq!(reason, "pass panicked: pass exploded")
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(queued.await.unwrap(), Vec::<String>::new());
        assert!(!sched.state.lock().underway);
    }

    #[tokio::test]
    async fn idle_scheduler_resets_after_each_pass() {
        let sched = scheduler();
        assert!(sched.trigger(Context::empty()).await.unwrap().is_empty());
        assert!(!sched.state.lock().underway);
        assert!(sched.last_context().is_some());
    }
}
