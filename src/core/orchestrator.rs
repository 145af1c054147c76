//! # Orchestrator: registry, scheduler, fault handlers and event delivery in one handle.
//!
//! The [`Orchestrator`] owns the event bus, the unit registry, the release-dedup
//! registry and the scheduler. Callers register units, start the orchestrator and feed
//! it reevaluation triggers; the orchestrator keeps exactly the relevant units active.
//!
//! ## High-level architecture
//! ```text
//! register(UnitSpec) ──► Registry (top-level units, registration order)
//!
//! trigger(ctx) ──► Scheduler ──► partition by predicate + status
//!                      │             │
//!                      │             ▼
//!                      │        Lifecycle phases (watchdog-bounded, fault-transformed)
//!                      │             │
//!                      ▼             ▼
//!                 Bus.publish(BeforePass / StatusChanged / PassComplete / RoutingEvent ...)
//!                      │
//!                      └──► subscriber_listener ──► SubscriberSet::emit(&Event)
//!                                                    ┌─────────┬─────────┐
//!                                                    ▼         ▼         ▼
//!                                               [queue S1] [queue S2] [queue SN]
//!
//! release(name, opts) ──► ReleaseRegistry (one shared completion per name)
//! mount_child(source) ──► root ChildMap ──► child driver (load → init → activate)
//! ```
//!
//! ## Example
//! ```rust
//! use unitvisor::{Config, Context, Orchestrator, Phase, Props, Rejection, UnitExports, UnitSpec};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let orch = Orchestrator::builder(Config::default()).build();
//!
//!     let noop = || Phase::new(|_p: Props| async { Ok::<(), Rejection>(()) });
//!     let exports = UnitExports::new().init(noop()).activate(noop()).deactivate(noop());
//!     orch.register(UnitSpec::from_exports("settings", exports, |ctx: &Context| {
//!         Ok(ctx.get::<&'static str>().is_some_and(|p| p.starts_with("/settings")))
//!     }))
//!     .await?;
//!
//!     let active = orch.start(Context::new("/settings/profile")).await?;
//!     assert_eq!(active, vec!["settings"]);
//!
//!     orch.shutdown();
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::Config;
use crate::core::builder::OrchestratorBuilder;
use crate::core::lifecycle::{ChildHandle, FailureMode, Lifecycle};
use crate::core::outcome::Completion;
use crate::core::registry::Registry;
use crate::core::release::{ReleaseOptions, ReleaseRegistry};
use crate::core::scheduler::Scheduler;
use crate::error::{Fault, OrchestratorError};
use crate::events::{Bus, Event};
use crate::faults::{FaultHandlerId, FaultHandlers};
use crate::subscribers::SubscriberSet;
use crate::units::{ChildMap, ChildSource, Context, CustomProps, Role, Unit, UnitSpec, UnitStatus};

/// Coordinates unit lifecycles, reevaluation passes and event delivery.
pub struct Orchestrator {
    cfg: Config,
    bus: Bus,
    subs: Arc<SubscriberSet>,
    registry: Arc<Registry>,
    releases: Arc<ReleaseRegistry>,
    faults: Arc<FaultHandlers>,
    lifecycle: Arc<Lifecycle>,
    scheduler: Arc<Scheduler>,
    root: Arc<ChildMap>,
    runtime_token: CancellationToken,
}

impl Orchestrator {
    /// Starts building an orchestrator with the given configuration.
    pub fn builder(cfg: Config) -> OrchestratorBuilder {
        OrchestratorBuilder::new(cfg)
    }

    pub(crate) fn new_internal(cfg: Config, subs: Arc<SubscriberSet>, bus: Bus) -> Self {
        let faults = Arc::new(FaultHandlers::new(bus.clone()));
        let releases = ReleaseRegistry::new();
        let registry = Registry::new();
        let lifecycle = Lifecycle::new(&cfg, bus.clone(), Arc::clone(&faults), Arc::clone(&releases));
        let scheduler = Scheduler::new(
            Arc::clone(&registry),
            Arc::clone(&lifecycle),
            Arc::clone(&releases),
            bus.clone(),
        );

        Self {
            cfg,
            bus,
            subs,
            registry,
            releases,
            faults,
            lifecycle,
            scheduler,
            root: Arc::new(ChildMap::new(None)),
            runtime_token: CancellationToken::new(),
        }
    }

    /// Configuration this orchestrator was built with.
    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Registers a top-level unit in `Unloaded`.
    ///
    /// Registration does not trigger a pass.
    ///
    /// # Errors
    /// [`OrchestratorError::Validation`] for an empty or duplicate name.
    pub async fn register(&self, spec: UnitSpec) -> Result<(), OrchestratorError> {
        spec.validate()?;
        let (name, loader, predicate, custom) = spec.into_parts();
        let unit = Unit::new(
            self.lifecycle.next_id(),
            name.into(),
            Role::TopLevel { predicate },
            loader,
            custom,
            self.lifecycle.defaults(),
        );
        self.registry.insert(unit).await
    }

    /// Marks the orchestrator started and triggers a pass with `ctx`.
    ///
    /// Before `start`, passes only load units; initialization and activation are withheld.
    pub fn start(&self, ctx: Context) -> BoxFuture<'static, Result<Vec<String>, OrchestratorError>> {
        self.scheduler.mark_started();
        self.scheduler.trigger(ctx)
    }

    pub fn is_started(&self) -> bool {
        self.scheduler.is_started()
    }

    /// Requests a reevaluation pass with `ctx`.
    ///
    /// Resolves with the names of the active units once the pass that picked this call
    /// up has finished. Calls made while a pass is underway are coalesced into one
    /// follow-up pass and all resolve with the same list.
    pub fn trigger(&self, ctx: Context) -> BoxFuture<'static, Result<Vec<String>, OrchestratorError>> {
        self.scheduler.trigger(ctx)
    }

    /// Status of a registered unit.
    pub async fn status(&self, name: &str) -> Option<UnitStatus> {
        self.registry.find(name).await.map(|u| u.status())
    }

    /// Fault that broke a registered unit, if any.
    pub async fn fault(&self, name: &str) -> Option<Fault> {
        self.registry.find(name).await.and_then(|u| u.fault())
    }

    /// Names of all registered units, `Broken` ones included.
    pub async fn unit_names(&self) -> Vec<String> {
        self.registry.names().await
    }

    /// Names of the units currently `Active`.
    pub async fn active_units(&self) -> Vec<String> {
        self.registry.active_names().await
    }

    /// Names whose activation predicate holds for `ctx`. No status is touched.
    pub async fn check_activity(&self, ctx: &Context) -> Vec<String> {
        self.scheduler.check_activity(ctx).await
    }

    /// Requests that a registered unit be released back to `Unloaded`.
    ///
    /// Concurrent requests for one name share one [`Completion`]. With
    /// `wait_for_deactivate` the release happens in a later pass once the unit is no longer
    /// active; otherwise the unit is deactivated and released right away, and a pass with
    /// the most recent context follows.
    ///
    /// # Errors
    /// [`OrchestratorError::UnknownUnit`] if no unit has that name.
    pub async fn release(
        &self,
        name: &str,
        opts: ReleaseOptions,
    ) -> Result<Completion, OrchestratorError> {
        let unit = self
            .registry
            .find(name)
            .await
            .ok_or_else(|| OrchestratorError::UnknownUnit { name: name.into() })?;
        let (completion, _) = self.releases.request(&unit);

        if !opts.wait_for_deactivate {
            let lifecycle = Arc::clone(&self.lifecycle);
            let releases = Arc::clone(&self.releases);
            let scheduler = Arc::clone(&self.scheduler);
            tokio::spawn(async move {
                let released = match lifecycle.deactivate(unit, FailureMode::Soft).await {
                    Ok(unit) => lifecycle.release(unit, FailureMode::Soft).await,
                    Err(fault) => Err(fault),
                };
                // Soft mode never fails; a Broken unit still owes its waiters an outcome.
                if let Ok(unit) = released {
                    let res = match unit.fault() {
                        Some(fault) if unit.status().is_broken() => Err(fault),
                        _ => Ok(()),
                    };
                    releases.settle(&unit, res);
                }
                if let Some(ctx) = scheduler.last_context() {
                    let _ = scheduler.trigger(ctx);
                }
            });
        }
        Ok(completion)
    }

    /// Mounts a child unit owned by the orchestrator itself.
    pub fn mount_child(&self, source: impl Into<ChildSource>, custom: CustomProps) -> ChildHandle {
        self.lifecycle
            .mount_child(Arc::clone(&self.root), source.into(), custom)
    }

    /// Registers a fault handler; handlers run in registration order.
    pub fn add_fault_handler<F>(&self, handler: F) -> FaultHandlerId
    where
        F: Fn(&Fault) + Send + Sync + 'static,
    {
        self.faults.add(Arc::new(handler))
    }

    /// Removes a fault handler. Returns `false` if it was not registered.
    pub fn remove_fault_handler(&self, id: FaultHandlerId) -> bool {
        self.faults.remove(id)
    }

    /// Raw receiver of every runtime event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    /// Stops the background listener tasks.
    ///
    /// Units are left in their current status; in-flight phases run to completion.
    pub fn shutdown(&self) {
        self.runtime_token.cancel();
    }

    /// Subscribes to the bus and forwards events to the subscriber set (fire-and-forget).
    pub(crate) fn subscriber_listener(&self) {
        if self.subs.is_empty() {
            return;
        }
        let mut rx = self.bus.subscribe();
        let set = Arc::clone(&self.subs);
        let token = self.runtime_token.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    msg = rx.recv() => match msg {
                        Ok(ev) => set.emit(&ev),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "subscriber listener lagged behind the bus");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        });
    }

    /// Warns once if `start()` has not been called within the configured delay.
    pub(crate) fn start_warning(&self) {
        let Some(delay) = self.cfg.start_warning() else {
            return;
        };
        let scheduler = Arc::clone(&self.scheduler);
        let token = self.runtime_token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    if !scheduler.is_started() {
                        warn!(
                            delay_ms = delay.as_millis() as u64,
                            "start() has not been called {}; units can be registered and loaded, but not initialized or activated",
                            describe(delay)
                        );
                    }
                }
            }
        });
    }
}

fn describe(delay: Duration) -> String {
    format!("{}ms after the orchestrator was built", delay.as_millis())
}
