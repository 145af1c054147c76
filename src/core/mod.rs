//! Runtime core: orchestration and lifecycle.
//!
//! This module contains the embedded implementation of the unitvisor runtime.
//! The public API from this module is [`Orchestrator`] (with its builder), the
//! [`ChildHandle`] returned by mount calls, and the [`Completion`] future.
//!
//! Internal modules:
//! - [`lifecycle`]: phase functions, fault surfacing, child units;
//! - [`scheduler`]: serialized and batched reevaluation passes;
//! - [`registry`]: top-level units in registration order;
//! - [`release`]: release-request dedup;
//! - [`watchdog`]: bounded waiting on phase implementations;
//! - [`outcome`]: settle-once shared results.

mod builder;
mod lifecycle;
mod orchestrator;
mod outcome;
mod registry;
mod release;
mod scheduler;
mod watchdog;

pub use builder::OrchestratorBuilder;
pub use lifecycle::ChildHandle;
pub use orchestrator::Orchestrator;
pub use outcome::Completion;
pub use release::ReleaseOptions;

pub(crate) use lifecycle::Lifecycle;
pub(crate) use outcome::Outcome;
