//! # Global runtime configuration.
//!
//! Provides [`Config`], the centralized settings for an orchestrator, plus the
//! per-phase watchdog bounds ([`PhaseTimeout`], [`UnitTimeouts`]).
//!
//! Config is used in two ways:
//! 1. **Orchestrator creation**: `Orchestrator::builder(config)`
//! 2. **Unit defaults**: `config.timeouts` is the base every unit's exported
//!    [`TimeoutOverrides`] are merged onto when the unit loads.
//!
//! ## Sentinel values
//! - `start_warning_delay = 0s` → never warn about a missing `start()`
//! - `bus_capacity = 0` → clamped to 1

use std::time::Duration;

use crate::error::OrchestratorError;
use crate::units::PhaseKind;

/// Watchdog bound for one phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PhaseTimeout {
    /// Longest the orchestrator waits quietly before giving up (fatal) or going silent (non-fatal).
    pub max: Duration,
    /// Reject the phase with a timeout fault once `max` elapses.
    pub fatal: bool,
}

impl PhaseTimeout {
    /// Creates a bound of `millis` milliseconds.
    ///
    /// # Errors
    /// Returns [`OrchestratorError::Validation`] unless `millis > 0`.
    ///
    /// # Example
    /// ```
    /// use unitvisor::PhaseTimeout;
    ///
    /// assert!(PhaseTimeout::new(0, true).is_err());
    /// let t = PhaseTimeout::new(50, true).unwrap();
    /// assert_eq!(t.max.as_millis(), 50);
    /// ```
    pub fn new(millis: u64, fatal: bool) -> Result<Self, OrchestratorError> {
        if millis == 0 {
            return Err(OrchestratorError::validation(
                "max time must be a positive integer number of milliseconds",
            ));
        }
        Ok(Self {
            max: Duration::from_millis(millis),
            fatal,
        })
    }

    const fn lenient(millis: u64) -> Self {
        Self {
            max: Duration::from_millis(millis),
            fatal: false,
        }
    }
}

/// Resolved per-phase bounds of a unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UnitTimeouts {
    pub init: PhaseTimeout,
    pub activate: PhaseTimeout,
    pub deactivate: PhaseTimeout,
    pub release: PhaseTimeout,
}

impl UnitTimeouts {
    /// Bound used for `kind`. Updates share the activate bound.
    pub fn get(&self, kind: PhaseKind) -> PhaseTimeout {
        match kind {
            PhaseKind::Init => self.init,
            PhaseKind::Activate | PhaseKind::Update => self.activate,
            PhaseKind::Deactivate => self.deactivate,
            PhaseKind::Release => self.release,
        }
    }

    /// Replaces the bound used for `kind`.
    pub fn set(&mut self, kind: PhaseKind, timeout: PhaseTimeout) {
        match kind {
            PhaseKind::Init => self.init = timeout,
            PhaseKind::Activate | PhaseKind::Update => self.activate = timeout,
            PhaseKind::Deactivate => self.deactivate = timeout,
            PhaseKind::Release => self.release = timeout,
        }
    }

    /// Returns a copy with every override in `overrides` applied.
    pub fn merged(mut self, overrides: &TimeoutOverrides) -> Self {
        if let Some(t) = overrides.init {
            self.init = t;
        }
        if let Some(t) = overrides.activate {
            self.activate = t;
        }
        if let Some(t) = overrides.deactivate {
            self.deactivate = t;
        }
        if let Some(t) = overrides.release {
            self.release = t;
        }
        self
    }
}

impl Default for UnitTimeouts {
    /// - `init = 4000ms`
    /// - `activate = 3000ms`
    /// - `deactivate = 3000ms`
    /// - `release = 3000ms`
    ///
    /// None of them fatal.
    fn default() -> Self {
        Self {
            init: PhaseTimeout::lenient(4000),
            activate: PhaseTimeout::lenient(3000),
            deactivate: PhaseTimeout::lenient(3000),
            release: PhaseTimeout::lenient(3000),
        }
    }
}

/// Partial bounds exported by a unit; unset phases keep the global default.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TimeoutOverrides {
    pub init: Option<PhaseTimeout>,
    pub activate: Option<PhaseTimeout>,
    pub deactivate: Option<PhaseTimeout>,
    pub release: Option<PhaseTimeout>,
}

impl TimeoutOverrides {
    /// Sets the override for `kind` (updates share the activate slot).
    pub fn with(mut self, kind: PhaseKind, timeout: PhaseTimeout) -> Self {
        let slot = match kind {
            PhaseKind::Init => &mut self.init,
            PhaseKind::Activate | PhaseKind::Update => &mut self.activate,
            PhaseKind::Deactivate => &mut self.deactivate,
            PhaseKind::Release => &mut self.release,
        };
        *slot = Some(timeout);
        self
    }
}

/// Global configuration for an orchestrator.
///
/// ## Field semantics
/// - `bus_capacity`: Event bus ring buffer size (min 1; clamped by Bus)
/// - `timeouts`: Default per-phase watchdog bounds
/// - `warning_period`: Cadence of "still waiting" warnings while a phase runs
/// - `start_warning_delay`: Warn if `start()` was not called by then (`0s` = never)
#[derive(Clone, Debug)]
pub struct Config {
    /// Capacity of the event bus broadcast channel ring buffer.
    ///
    /// Slow receivers that lag behind more than `bus_capacity` messages will
    /// receive `Lagged` and skip older items.
    pub bus_capacity: usize,

    /// Default watchdog bounds, overridable per unit through its exports.
    pub timeouts: UnitTimeouts,

    /// Interval between watchdog warnings for a phase that has not settled.
    pub warning_period: Duration,

    /// Delay after which a missing `start()` call is reported.
    pub start_warning_delay: Duration,
}

impl Config {
    /// Sets the default bound of one phase.
    pub fn set_phase_timeout(&mut self, kind: PhaseKind, timeout: PhaseTimeout) {
        self.timeouts.set(kind, timeout);
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Returns the start warning delay as an `Option`.
    ///
    /// - `None` → no warning
    /// - `Some(d)` → warn after `d` if not started
    #[inline]
    pub fn start_warning(&self) -> Option<Duration> {
        if self.start_warning_delay == Duration::ZERO {
            None
        } else {
            Some(self.start_warning_delay)
        }
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `bus_capacity = 1024`
    /// - `timeouts = UnitTimeouts::default()`
    /// - `warning_period = 1s`
    /// - `start_warning_delay = 5s`
    fn default() -> Self {
        Self {
            bus_capacity: 1024,
            timeouts: UnitTimeouts::default(),
            warning_period: Duration::from_millis(1000),
            start_warning_delay: Duration::from_millis(5000),
        }
    }
}
