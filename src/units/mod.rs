//! # Unit data model.
//!
//! This module provides the types describing what the orchestrator drives:
//! - [`UnitStatus`] - the lifecycle state machine
//! - [`Phase`] - one phase implementation as a sequence of steps
//! - [`UnitExports`] - what a unit's code-loading operation resolves with
//! - [`UnitSpec`] - registration bundle for top-level units
//! - [`Context`] - opaque value passed to activation predicates
//! - [`Props`] - payload and capabilities handed to unit code

mod context;
mod exports;
mod phase;
mod props;
mod spec;
mod status;
mod unit;

pub use context::Context;
pub use exports::{ChildSource, Loader, UnitExports};
pub use phase::{Phase, PhaseKind, Step, StepFuture};
pub use props::Props;
pub use spec::UnitSpec;
pub use status::UnitStatus;
pub use unit::{ActivationPredicate, CustomProps, UnitId};

pub(crate) use exports::PhaseSet;
pub(crate) use unit::{ChildMap, Role, Unit};
