//! # Registration specification for top-level units.
//!
//! [`UnitSpec`] bundles what the orchestrator needs to manage a top-level unit:
//! - a unique name;
//! - a code-loading operation (or ready-made exports);
//! - an activation predicate evaluated against each pass context;
//! - optional custom props passed to every phase invocation.

use std::future::Future;
use std::sync::Arc;

use crate::error::{OrchestratorError, Rejection};
use crate::units::exports::{loader_fn, ready_loader};
use crate::units::{ActivationPredicate, Context, CustomProps, Loader, Props, UnitExports};

/// Specification for registering a top-level unit.
///
/// ## Example
/// ```rust
/// use unitvisor::{Context, Phase, Props, Rejection, UnitExports, UnitSpec};
///
/// let noop = || Phase::new(|_p: Props| async { Ok::<(), Rejection>(()) });
/// let spec = UnitSpec::from_exports(
///     "settings",
///     UnitExports::new().init(noop()).activate(noop()).deactivate(noop()),
///     |ctx: &Context| Ok(ctx.get::<&'static str>().is_some_and(|p| p.starts_with("/settings"))),
/// );
/// assert_eq!(spec.name(), "settings");
/// ```
#[derive(Clone)]
pub struct UnitSpec {
    name: String,
    loader: Loader,
    predicate: ActivationPredicate,
    custom: CustomProps,
}

impl UnitSpec {
    /// Unit whose code is resolved by `loader`.
    pub fn new<L, Fut, P>(name: impl Into<String>, loader: L, predicate: P) -> Self
    where
        L: Fn(Props) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<UnitExports, Rejection>> + Send + 'static,
        P: Fn(&Context) -> Result<bool, Rejection> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            loader: loader_fn(loader),
            predicate: Arc::new(predicate),
            custom: CustomProps::new(),
        }
    }

    /// Unit whose exports are already available.
    pub fn from_exports<P>(name: impl Into<String>, exports: UnitExports, predicate: P) -> Self
    where
        P: Fn(&Context) -> Result<bool, Rejection> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            loader: ready_loader(exports),
            predicate: Arc::new(predicate),
            custom: CustomProps::new(),
        }
    }

    /// Returns a new spec with the given custom props.
    pub fn with_props(mut self, custom: CustomProps) -> Self {
        self.custom = custom;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rejects empty names.
    pub(crate) fn validate(&self) -> Result<(), OrchestratorError> {
        if self.name.is_empty() {
            return Err(OrchestratorError::validation("unit name must be a non-empty string"));
        }
        Ok(())
    }

    pub(crate) fn into_parts(self) -> (String, Loader, ActivationPredicate, CustomProps) {
        (self.name, self.loader, self.predicate, self.custom)
    }
}
