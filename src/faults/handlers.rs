//! # Fault handler registry.
//!
//! Soft-mode faults are delivered to every registered handler, in registration order.
//! When no handler is registered, the fault is raised from a freshly spawned task
//! instead, so the operation that produced it carries on undisturbed.
//!
//! ```text
//! report(fault) ─► handlers empty? ── no ──► h1(&fault), h2(&fault), ...   (+ FaultReported)
//!                        │
//!                       yes ──► tokio::spawn { error!(..) }                (+ FaultUnhandled)
//! ```
//!
//! A panicking handler is isolated; the remaining handlers still run.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tracing::error;

use crate::error::Fault;
use crate::events::{Bus, Event, EventKind};

/// Callback receiving reported faults.
pub type FaultHandler = Arc<dyn Fn(&Fault) + Send + Sync>;

/// Token returned by registration; used to remove the handler again.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FaultHandlerId(u64);

/// Ordered list of fault handlers.
pub(crate) struct FaultHandlers {
    handlers: RwLock<Vec<(FaultHandlerId, FaultHandler)>>,
    next_id: AtomicU64,
    bus: Bus,
}

impl FaultHandlers {
    pub fn new(bus: Bus) -> Self {
        Self {
            handlers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(0),
            bus,
        }
    }

    pub fn add(&self, handler: FaultHandler) -> FaultHandlerId {
        let id = FaultHandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers.write().push((id, handler));
        id
    }

    /// Returns `true` if a handler was removed.
    pub fn remove(&self, id: FaultHandlerId) -> bool {
        let mut handlers = self.handlers.write();
        let before = handlers.len();
        handlers.retain(|(h, _)| *h != id);
        handlers.len() != before
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    /// Delivers `fault` to every handler, or raises it asynchronously when there are none.
    pub fn report(&self, fault: Fault) {
        let handlers: Vec<FaultHandler> = self
            .handlers
            .read()
            .iter()
            .map(|(_, h)| Arc::clone(h))
            .collect();

        if handlers.is_empty() {
            let bus = self.bus.clone();
            tokio::spawn(async move {
                error!(unit = fault.unit(), kind = fault.as_label(), "{fault}");
                bus.publish(
                    Event::new(EventKind::FaultUnhandled)
                        .with_unit(fault.unit())
                        .with_reason(fault.to_string()),
                );
            });
            return;
        }

        self.bus.publish(
            Event::new(EventKind::FaultReported)
                .with_unit(fault.unit())
                .with_reason(fault.to_string()),
        );
        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(&fault))).is_err() {
                error!(unit = fault.unit(), "fault handler panicked");
            }
        }
    }
}
