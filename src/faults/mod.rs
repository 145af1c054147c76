//! Fault transformation and delivery.
//!
//! - [`transform`] decorates a raw rejection into a [`Fault`](crate::Fault);
//! - [`FaultHandlers`] delivers soft-mode faults to registered handlers.

mod handlers;
mod transform;

pub use handlers::{FaultHandler, FaultHandlerId};

pub(crate) use handlers::FaultHandlers;
pub(crate) use transform::transform;
