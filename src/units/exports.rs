//! # Unit exports and their validation.
//!
//! [`UnitExports`] is what a unit's code-loading operation resolves with: the phase
//! implementations plus optional timeout overrides (and, for child units, a name).
//! Loading validates the exports before anything is installed on the unit:
//!
//! - `init`, `activate`, `deactivate` must be present and non-empty;
//! - `release` is optional (missing = no-op);
//! - `update` is optional, but if given it must be non-empty.

use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::config::{PhaseTimeout, TimeoutOverrides};
use crate::error::Rejection;
use crate::units::{Phase, PhaseKind, Props};

/// Code-loading operation of a unit.
pub type Loader = Arc<dyn Fn(Props) -> BoxFuture<'static, Result<UnitExports, Rejection>> + Send + Sync>;

/// Erases a loader closure.
pub(crate) fn loader_fn<F, Fut>(f: F) -> Loader
where
    F: Fn(Props) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<UnitExports, Rejection>> + Send + 'static,
{
    Arc::new(move |props| f(props).boxed())
}

/// Loader that resolves with the same exports every time.
pub(crate) fn ready_loader(exports: UnitExports) -> Loader {
    Arc::new(move |_props| futures::future::ready(Ok(exports.clone())).boxed())
}

/// Phase implementations and settings exported by a unit's code.
///
/// ## Example
/// ```
/// use unitvisor::{Phase, PhaseKind, PhaseTimeout, Props, Rejection, UnitExports};
///
/// let noop = || Phase::new(|_p: Props| async { Ok::<(), Rejection>(()) });
/// let exports = UnitExports::new()
///     .init(noop())
///     .activate(noop())
///     .deactivate(noop())
///     .timeout(PhaseKind::Activate, PhaseTimeout::new(500, true).unwrap());
/// assert!(exports.has(PhaseKind::Activate));
/// assert!(!exports.has(PhaseKind::Update));
/// ```
#[derive(Clone, Default, Debug)]
pub struct UnitExports {
    pub(crate) name: Option<String>,
    pub(crate) init: Option<Phase>,
    pub(crate) activate: Option<Phase>,
    pub(crate) deactivate: Option<Phase>,
    pub(crate) release: Option<Phase>,
    pub(crate) update: Option<Phase>,
    pub(crate) timeouts: TimeoutOverrides,
}

impl UnitExports {
    /// Empty exports (invalid until init/activate/deactivate are set).
    pub fn new() -> Self {
        Self::default()
    }

    /// Name for a child unit; ignored for top-level units.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn init(mut self, phase: Phase) -> Self {
        self.init = Some(phase);
        self
    }

    pub fn activate(mut self, phase: Phase) -> Self {
        self.activate = Some(phase);
        self
    }

    pub fn deactivate(mut self, phase: Phase) -> Self {
        self.deactivate = Some(phase);
        self
    }

    pub fn release(mut self, phase: Phase) -> Self {
        self.release = Some(phase);
        self
    }

    /// Declares the update capability.
    pub fn update(mut self, phase: Phase) -> Self {
        self.update = Some(phase);
        self
    }

    /// Overrides the watchdog bound of one phase.
    pub fn timeout(mut self, kind: PhaseKind, timeout: PhaseTimeout) -> Self {
        self.timeouts = self.timeouts.with(kind, timeout);
        self
    }

    /// True when an implementation for `kind` was exported.
    pub fn has(&self, kind: PhaseKind) -> bool {
        match kind {
            PhaseKind::Init => self.init.is_some(),
            PhaseKind::Activate => self.activate.is_some(),
            PhaseKind::Deactivate => self.deactivate.is_some(),
            PhaseKind::Release => self.release.is_some(),
            PhaseKind::Update => self.update.is_some(),
        }
    }

    /// Checks the export shape and produces the installed phase set.
    ///
    /// The error is the reason, without the unit prefix.
    pub(crate) fn validate(&self) -> Result<PhaseSet, &'static str> {
        fn required(p: &Option<Phase>, missing: &'static str) -> Result<Phase, &'static str> {
            match p {
                Some(phase) if !phase.is_empty() => Ok(phase.clone()),
                _ => Err(missing),
            }
        }

        let init = required(
            &self.init,
            "does not export an init function or sequence of functions",
        )?;
        let activate = required(
            &self.activate,
            "does not export an activate function or sequence of functions",
        )?;
        let deactivate = required(
            &self.deactivate,
            "does not export a deactivate function or sequence of functions",
        )?;
        let update = match &self.update {
            None => None,
            Some(p) if p.is_empty() => return Err("exports an invalid update function"),
            Some(p) => Some(p.clone()),
        };
        if matches!(&self.name, Some(n) if n.is_empty()) {
            return Err("exports an empty name");
        }

        Ok(PhaseSet {
            init,
            activate,
            deactivate,
            release: self.release.clone().unwrap_or_default(),
            update,
        })
    }
}

/// Phase implementations installed on a loaded unit.
#[derive(Clone, Debug)]
pub(crate) struct PhaseSet {
    pub init: Phase,
    pub activate: Phase,
    pub deactivate: Phase,
    pub release: Phase,
    pub update: Option<Phase>,
}

impl PhaseSet {
    pub fn get(&self, kind: PhaseKind) -> Option<&Phase> {
        match kind {
            PhaseKind::Init => Some(&self.init),
            PhaseKind::Activate => Some(&self.activate),
            PhaseKind::Deactivate => Some(&self.deactivate),
            PhaseKind::Release => Some(&self.release),
            PhaseKind::Update => self.update.as_ref(),
        }
    }
}

/// Where a child unit's exports come from.
#[derive(Clone)]
pub enum ChildSource {
    /// Exports available up front.
    Ready(UnitExports),
    /// Exports resolved by a loading operation.
    Loader(Loader),
}

impl ChildSource {
    /// Wraps a loading closure.
    pub fn loader<F, Fut>(f: F) -> Self
    where
        F: Fn(Props) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<UnitExports, Rejection>> + Send + 'static,
    {
        ChildSource::Loader(loader_fn(f))
    }

    pub(crate) fn into_loader(self) -> Loader {
        match self {
            ChildSource::Ready(exports) => ready_loader(exports),
            ChildSource::Loader(loader) => loader,
        }
    }
}

impl From<UnitExports> for ChildSource {
    fn from(exports: UnitExports) -> Self {
        ChildSource::Ready(exports)
    }
}
