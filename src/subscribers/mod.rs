//! # Event subscribers.
//!
//! Events published on the [`Bus`](crate::events::Bus) are forwarded by the
//! orchestrator's listener to a [`SubscriberSet`], which fans each one out to every
//! registered [`Subscribe`] implementation through its own bounded queue.
//!
//! ```text
//! Lifecycle / Scheduler / FaultHandlers ── publish ──► Bus ──► listener ──► SubscriberSet
//!                                                                   ┌────────┼────────┐
//!                                                                   ▼        ▼        ▼
//!                                                               LogWriter  Metrics  Custom
//! ```

mod embedded;
mod set;
mod subscribe;

#[cfg(feature = "logging")]
pub use embedded::LogWriter;
pub use set::SubscriberSet;
pub use subscribe::Subscribe;
