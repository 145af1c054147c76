//! # Runtime events emitted by the orchestrator.
//!
//! The [`EventKind`] enum classifies event types across three categories:
//! - **Pass notifications**: one reevaluation pass (before, complete, routing)
//! - **Unit events**: status writes, first activation, reported faults
//! - **Subscriber events**: panics and overflow in subscriber workers
//!
//! The [`Event`] struct carries additional metadata such as timestamps, unit name,
//! status, reasons, and the context that triggered the pass.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use unitvisor::{Event, EventKind, UnitStatus};
//!
//! let ev = Event::new(EventKind::StatusChanged)
//!     .with_unit("nav")
//!     .with_status(UnitStatus::Active);
//!
//! assert_eq!(ev.kind, EventKind::StatusChanged);
//! assert_eq!(ev.unit.as_deref(), Some("nav"));
//! assert_eq!(ev.status, Some(UnitStatus::Active));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

use crate::units::{Context, UnitStatus};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `unit`: subscriber name
    /// - `reason`: panic info/message
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `unit`: subscriber name
    /// - `reason`: reason string (e.g., "full", "closed")
    SubscriberOverflow,

    // === Pass notifications ===
    /// A started pass is about to partition and drive units.
    ///
    /// Sets:
    /// - `trigger`: context of the pass
    BeforePass,

    /// A pass finished all of its work.
    ///
    /// Sets:
    /// - `no_op`: `true` if no unit needed a transition
    /// - `trigger`: context of the pass
    PassComplete,

    /// Generic notification emitted after every completed pass.
    ///
    /// Sets:
    /// - `trigger`: context of the pass
    RoutingEvent,

    // === Unit events ===
    /// Fired once, right before the very first activation attempt.
    BeforeFirstActivation,

    /// Fired once, after the very first successful activation.
    ///
    /// Sets:
    /// - `unit`: the unit that activated
    FirstActivation,

    /// A unit's status was written.
    ///
    /// Sets:
    /// - `unit`: unit name
    /// - `status`: new status
    StatusChanged,

    /// A fault was delivered to the registered fault handlers.
    ///
    /// Sets:
    /// - `unit`: unit name
    /// - `reason`: fault message
    FaultReported,

    /// A fault was raised with no fault handler registered.
    ///
    /// Sets:
    /// - `unit`: unit name
    /// - `reason`: fault message
    FaultUnhandled,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Name of the unit (or subscriber), if applicable.
    pub unit: Option<Arc<str>>,
    /// Status written, for `StatusChanged`.
    pub status: Option<UnitStatus>,
    /// Human-readable reason (faults, overflow details, etc.).
    pub reason: Option<Arc<str>>,
    /// Whether the completed pass changed nothing.
    pub no_op: Option<bool>,
    /// Context the pass was triggered with.
    pub trigger: Option<Context>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            unit: None,
            status: None,
            reason: None,
            no_op: None,
            trigger: None,
        }
    }

    /// Attaches a unit name.
    #[inline]
    pub fn with_unit(mut self, unit: impl Into<Arc<str>>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// Attaches a status.
    #[inline]
    pub fn with_status(mut self, status: UnitStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Marks whether the pass was a no-op.
    #[inline]
    pub fn with_no_op(mut self, no_op: bool) -> Self {
        self.no_op = Some(no_op);
        self
    }

    /// Attaches the triggering context, if any.
    #[inline]
    pub fn with_trigger(mut self, trigger: Option<Context>) -> Self {
        self.trigger = trigger;
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_unit(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_unit(subscriber)
            .with_reason(info)
    }

    /// True for the three per-pass notifications.
    #[inline]
    pub fn is_pass_notification(&self) -> bool {
        matches!(
            self.kind,
            EventKind::BeforePass | EventKind::PassComplete | EventKind::RoutingEvent
        )
    }
}
