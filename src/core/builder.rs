use std::sync::Arc;

use crate::{
    config::Config,
    events::Bus,
    subscribers::{Subscribe, SubscriberSet},
};
use super::orchestrator::Orchestrator;

/// Builder for constructing an [`Orchestrator`] with optional subscribers.
pub struct OrchestratorBuilder {
    cfg: Config,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl OrchestratorBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
        }
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive runtime events (status changes, passes, faults)
    /// through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Builds and returns the Orchestrator instance.
    ///
    /// Must be called within a Tokio runtime: this spawns the subscriber listener
    /// and the start-warning timer.
    pub fn build(self) -> Arc<Orchestrator> {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let subs = Arc::new(SubscriberSet::new(self.subscribers, bus.clone()));

        let orch = Arc::new(Orchestrator::new_internal(self.cfg, subs, bus));
        orch.subscriber_listener();
        orch.start_warning();
        orch
    }
}
