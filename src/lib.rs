//! # unitvisor
//!
//! **Unitvisor** is a lifecycle orchestration engine for independently loaded units.
//!
//! A host registers units, each with a code-loading operation and an activation
//! predicate. Whenever the host's context changes it triggers a reevaluation pass;
//! the orchestrator then loads, initializes, activates, deactivates and releases
//! units so that exactly the relevant ones are active. Units can mount child units
//! whose lifetime is bound to their owner.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │   UnitSpec   │   │   UnitSpec   │   │   UnitSpec   │
//!     │ (name, load, │   │ (name, load, │   │ (name, load, │
//!     │  predicate)  │   │  predicate)  │   │  predicate)  │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Orchestrator                                                     │
//! │  - Registry (top-level units, registration order)                 │
//! │  - Scheduler (one pass at a time, coalesced follow-ups)           │
//! │  - Lifecycle (phase functions under the watchdog)                 │
//! │  - ReleaseRegistry (one shared completion per release request)    │
//! │  - FaultHandlers (soft-mode fault delivery)                       │
//! └──────┬──────────────────┬──────────────────┬───────────────┬──────┘
//!        ▼                  ▼                  ▼               │
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐   │
//!     │     Unit     │   │     Unit     │   │  Child unit  │   │
//!     │  (status +   │   │  (status +   │   │ (ChildHandle,│   │
//!     │   phases)    │   │   phases)    │   │  hard mode)  │   │
//!     └┬─────────────┘   └┬─────────────┘   └┬─────────────┘   │
//!      │ StatusChanged    │ FaultReported    │ StatusChanged   │ BeforePass
//!      ▼                  ▼                  ▼                 ▼ PassComplete
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                        Bus (broadcast channel)                    │
//! │                     (capacity: Config::bus_capacity)              │
//! └─────────────────────────────────┬─────────────────────────────────┘
//!                                   ▼
//!                       ┌────────────────────────┐
//!                       │  subscriber_listener   │
//!                       └───────────┬────────────┘
//!                                   ▼
//!                             SubscriberSet
//!                        ┌─────────┼─────────┐
//!                        ▼         ▼         ▼
//!                     worker1   worker2   workerN
//! ```
//!
//! ### Lifecycle
//! ```text
//! Unloaded ─► LoadingCode ─► Uninitialized ─► Initializing ─► Inactive ─► Activating ─► Active
//!    ▲                                                          │  ▲                    │
//!    └──────────────────────── Releasing ◄──────────────────────┘  └─── Deactivating ◄──┘
//!
//! any phase fault ─► transform ─► Broken (terminal)
//!                                   ├─ soft mode (passes): fault handlers, pass continues
//!                                   └─ hard mode (child handles, update): returned to caller
//! ```
//!
//! ## Features
//! | Area              | Description                                                      | Key types / traits                          |
//! |-------------------|------------------------------------------------------------------|---------------------------------------------|
//! | **Orchestration** | Register units, trigger passes, release units.                   | [`Orchestrator`], [`UnitSpec`]              |
//! | **Unit code**     | Phase implementations and the capabilities handed to them.       | [`UnitExports`], [`Phase`], [`Props`]       |
//! | **Child units**   | Units mounted by other units, bound to their owner.              | [`ChildHandle`], [`ChildSource`]            |
//! | **Faults**        | Decorated faults and handler registration.                       | [`Fault`], [`FaultKind`], [`FaultHandlerId`]|
//! | **Timeouts**      | Per-phase bounds with global defaults and per-unit overrides.    | [`PhaseTimeout`], [`UnitTimeouts`]          |
//! | **Subscriber API**| Hook into runtime events (logging, metrics, custom subscribers). | [`Subscribe`], [`Event`]                    |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] _(demo/reference only)_.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use unitvisor::{Config, Context, Orchestrator, Phase, Props, Rejection, UnitExports, UnitSpec, UnitStatus};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     #[cfg(feature = "logging")]
//!     let subs: Vec<Arc<dyn unitvisor::Subscribe>> = vec![Arc::new(unitvisor::LogWriter::default())];
//!     #[cfg(not(feature = "logging"))]
//!     let subs: Vec<Arc<dyn unitvisor::Subscribe>> = Vec::new();
//!
//!     let orch = Orchestrator::builder(Config::default())
//!         .with_subscribers(subs)
//!         .build();
//!
//!     let noop = || Phase::new(|_p: Props| async { Ok::<(), Rejection>(()) });
//!     let exports = UnitExports::new().init(noop()).activate(noop()).deactivate(noop());
//!     orch.register(UnitSpec::from_exports("nav", exports, |_ctx: &Context| Ok(true)))
//!         .await?;
//!
//!     let active = orch.start(Context::new("/home")).await?;
//!     assert_eq!(active, vec!["nav"]);
//!     assert_eq!(orch.status("nav").await, Some(UnitStatus::Active));
//!     Ok(())
//! }
//! ```
mod config;
mod core;
mod error;
mod events;
mod faults;
mod subscribers;
mod units;

// ---- Public re-exports ----

pub use config::{Config, PhaseTimeout, TimeoutOverrides, UnitTimeouts};
pub use crate::core::{ChildHandle, Completion, Orchestrator, OrchestratorBuilder, ReleaseOptions};
pub use error::{Fault, FaultKind, FaultPayload, OrchestratorError, Rejection};
pub use events::{Bus, Event, EventKind};
pub use faults::{FaultHandler, FaultHandlerId};
pub use subscribers::{Subscribe, SubscriberSet};
pub use units::{
    ActivationPredicate, ChildSource, Context, CustomProps, Loader, Phase, PhaseKind, Props,
    Step, StepFuture, UnitExports, UnitId, UnitSpec, UnitStatus,
};

// Optional: expose a simple built-in logger subscriber (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
