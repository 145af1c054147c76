//! # Phase implementations as sequential step composition.
//!
//! A [`Phase`] is an ordered list of steps. Running it runs each step in turn and
//! short-circuits on the first rejection:
//!
//! ```text
//! run(props) ─► step[0](props) ─ Ok ─► step[1](props) ─ Ok ─► ... ─► Ok(())
//!                    │                      │
//!                   Err ───────────────────Err─────────────────────► Err(rejection)
//! ```
//!
//! Each step creates a **fresh** future per invocation; a step cannot hand back anything
//! other than a future, so "did not return an awaitable" is ruled out by the type.

use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::error::Rejection;
use crate::units::Props;

/// Future returned by one step.
pub type StepFuture = BoxFuture<'static, Result<(), Rejection>>;

/// Shared, type-erased step function.
pub type Step = Arc<dyn Fn(Props) -> StepFuture + Send + Sync>;

/// Which lifecycle phase a bound or implementation belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PhaseKind {
    Init,
    Activate,
    Update,
    Deactivate,
    Release,
}

impl PhaseKind {
    /// Lower-case phase name.
    pub fn as_str(self) -> &'static str {
        match self {
            PhaseKind::Init => "init",
            PhaseKind::Activate => "activate",
            PhaseKind::Update => "update",
            PhaseKind::Deactivate => "deactivate",
            PhaseKind::Release => "release",
        }
    }
}

/// Ordered sequence of steps making up one phase.
///
/// ## Example
/// ```
/// use unitvisor::{Phase, Props, Rejection};
///
/// let phase = Phase::new(|_p: Props| async { Ok::<(), Rejection>(()) })
///     .then(|_p: Props| async { Ok::<(), Rejection>(()) });
/// assert_eq!(phase.len(), 2);
/// ```
#[derive(Clone, Default)]
pub struct Phase {
    steps: Vec<Step>,
}

impl Phase {
    /// Phase made of a single step.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Props) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), Rejection>> + Send + 'static,
    {
        Self::empty().then(f)
    }

    /// Phase with no steps; running it resolves immediately.
    pub fn empty() -> Self {
        Self { steps: Vec::new() }
    }

    /// Appends a step.
    pub fn then<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Props) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), Rejection>> + Send + 'static,
    {
        self.steps.push(Arc::new(move |props| f(props).boxed()));
        self
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// True when the phase has no steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Runs the steps one after another, stopping at the first rejection.
    pub(crate) fn run(&self, props: Props) -> StepFuture {
        let steps = self.steps.clone();
        async move {
            for step in &steps {
                step(props.clone()).await?;
            }
            Ok(())
        }
        .boxed()
    }
}

impl std::fmt::Debug for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Phase").field("steps", &self.steps.len()).finish()
    }
}
