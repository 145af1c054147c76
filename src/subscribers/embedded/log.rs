//! # LogWriter: event renderer on top of `tracing`
//!
//! A minimal subscriber that renders incoming [`Event`]s as one line each.
//! Unit events and pass notifications go to `info`/`debug`, faults and subscriber
//! trouble to `warn`/`error`.
//!
//! ## Example output
//! ```text
//! [status] unit="nav" status=LOADING_CODE
//! [status] unit="nav" status=UNINITIALIZED
//! [before-first-activation]
//! [first-activation] unit="nav"
//! [pass-complete] no_op=false
//! [fault-reported] unit="nav" reason="unit 'nav' died in status ACTIVATING: boom"
//! [subscriber-overflow] subscriber="metrics" reason="subscriber=metrics reason=full"
//! ```

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let unit = e.unit.as_deref().unwrap_or("unknown");
        let reason = e.reason.as_deref().unwrap_or("unknown");
        match e.kind {
            EventKind::StatusChanged => {
                let status = e.status.map(|s| s.as_label()).unwrap_or("unknown");
                info!("[status] unit={unit:?} status={status}");
            }
            EventKind::BeforePass => debug!("[before-pass]"),
            EventKind::PassComplete => {
                debug!("[pass-complete] no_op={}", e.no_op.unwrap_or(false));
            }
            EventKind::RoutingEvent => debug!("[routing-event]"),
            EventKind::BeforeFirstActivation => info!("[before-first-activation]"),
            EventKind::FirstActivation => info!("[first-activation] unit={unit:?}"),
            EventKind::FaultReported => warn!("[fault-reported] unit={unit:?} reason={reason:?}"),
            EventKind::FaultUnhandled => {
                error!("[fault-unhandled] unit={unit:?} reason={reason:?}");
            }
            EventKind::SubscriberOverflow => {
                warn!("[subscriber-overflow] subscriber={unit:?} reason={reason:?}");
            }
            EventKind::SubscriberPanicked => {
                error!("[subscriber-panicked] subscriber={unit} info={reason}");
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
