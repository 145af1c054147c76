//! # Unit status state machine.
//!
//! ```text
//! Unloaded ─► LoadingCode ─► Uninitialized ─► Initializing ─► Inactive ─► Activating ─► Active
//!    ▲                                                          │  ▲                    │  ▲
//!    │                                                          │  └──── Deactivating ◄─┤  │
//!    └──────────────────────── Releasing ◄──────────────────────┘                       ▼  │
//!                                                                                    Updating
//! any ──► Broken (terminal)
//! ```
//!
//! Every phase function is guarded by its source status; see [`UnitStatus::permits`]
//! for the full edge list.

use std::fmt;

use serde::Serialize;

/// Lifecycle status of a unit.
///
/// Serializes to the same SCREAMING_SNAKE label as [`UnitStatus::as_label`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnitStatus {
    /// Code not loaded; no phase implementations.
    Unloaded,
    /// Code-loading operation in flight.
    LoadingCode,
    /// Loaded, init not run yet.
    Uninitialized,
    /// Init phase in flight.
    Initializing,
    /// Initialized and not active.
    Inactive,
    /// Activate phase in flight.
    Activating,
    /// Active and visible.
    Active,
    /// Update phase in flight.
    Updating,
    /// Deactivate phase in flight.
    Deactivating,
    /// Release phase in flight.
    Releasing,
    /// Terminal fault status; never scheduled again.
    Broken,
}

impl UnitStatus {
    /// Whether moving from `self` to `next` is an edge of the state machine.
    ///
    /// Redundant writes (`self == next`) are allowed. Any status may fall to `Broken`.
    pub fn permits(self, next: UnitStatus) -> bool {
        use UnitStatus::*;

        if self == next {
            return true;
        }
        if self == Broken {
            return false;
        }
        matches!(
            (self, next),
            (_, Broken)
                | (Unloaded, LoadingCode)
                | (LoadingCode, Uninitialized)
                | (Uninitialized, Initializing)
                | (Initializing, Inactive)
                | (Inactive, Activating)
                | (Inactive, Releasing)
                | (Activating, Active)
                | (Active, Updating)
                | (Active, Deactivating)
                | (Updating, Active)
                | (Deactivating, Inactive)
                | (Releasing, Unloaded)
        )
    }

    /// True for `Active`.
    pub fn is_active(self) -> bool {
        self == UnitStatus::Active
    }

    /// True for `Broken`.
    pub fn is_broken(self) -> bool {
        self == UnitStatus::Broken
    }

    /// Returns a stable label (SCREAMING_SNAKE) for logs.
    pub fn as_label(self) -> &'static str {
        match self {
            UnitStatus::Unloaded => "UNLOADED",
            UnitStatus::LoadingCode => "LOADING_CODE",
            UnitStatus::Uninitialized => "UNINITIALIZED",
            UnitStatus::Initializing => "INITIALIZING",
            UnitStatus::Inactive => "INACTIVE",
            UnitStatus::Activating => "ACTIVATING",
            UnitStatus::Active => "ACTIVE",
            UnitStatus::Updating => "UPDATING",
            UnitStatus::Deactivating => "DEACTIVATING",
            UnitStatus::Releasing => "RELEASING",
            UnitStatus::Broken => "BROKEN",
        }
    }
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}
