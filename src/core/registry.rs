//! # Unit registry - the set of registered top-level units.
//!
//! The registry is an explicit object owned by the orchestrator and shared with the
//! scheduler. Units are never removed; releasing a unit only resets its status.
//!
//! ## Rules
//! - Names are unique among top-level units (duplicate → `Validation`).
//! - Iteration order is registration order.
//! - The lock is held only to copy `Arc`s in or out, never across a lifecycle phase.

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::error::OrchestratorError;
use crate::units::Unit;

/// Registered top-level units.
pub(crate) struct Registry {
    units: RwLock<Vec<Arc<Unit>>>,
}

impl Registry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            units: RwLock::new(Vec::new()),
        })
    }

    /// Adds a unit; rejects duplicate names.
    pub async fn insert(&self, unit: Arc<Unit>) -> Result<(), OrchestratorError> {
        let mut units = self.units.write().await;
        let name = unit.name();
        if units.iter().any(|u| u.name() == name) {
            return Err(OrchestratorError::validation(format!(
                "there is already a unit registered with the name '{name}'"
            )));
        }
        units.push(unit);
        Ok(())
    }

    /// Copies out the current units.
    pub async fn snapshot(&self) -> Vec<Arc<Unit>> {
        self.units.read().await.clone()
    }

    pub async fn find(&self, name: &str) -> Option<Arc<Unit>> {
        self.units
            .read()
            .await
            .iter()
            .find(|u| &*u.name() == name)
            .cloned()
    }

    /// Names in registration order.
    pub async fn names(&self) -> Vec<String> {
        self.units
            .read()
            .await
            .iter()
            .map(|u| u.name().to_string())
            .collect()
    }

    /// Names of units currently in `Active`.
    pub async fn active_names(&self) -> Vec<String> {
        self.units
            .read()
            .await
            .iter()
            .filter(|u| u.status().is_active())
            .map(|u| u.name().to_string())
            .collect()
    }
}
