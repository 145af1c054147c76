//! # Props: the payload and capabilities handed to unit code.
//!
//! Every loader and step invocation receives a [`Props`] value. Besides the unit's
//! name and custom props, it carries the operations unit code is allowed to perform
//! on the orchestrator:
//!
//! - [`Props::mount_child`] creates a child unit owned by the calling unit;
//! - [`Props::deactivate_self`] lets a child unit tear itself down.

use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;

use crate::core::{ChildHandle, Lifecycle};
use crate::error::OrchestratorError;
use crate::units::{ChildSource, CustomProps, Unit};

/// Invocation payload for loaders and phase steps.
#[derive(Clone)]
pub struct Props {
    name: Arc<str>,
    custom: Arc<CustomProps>,
    unit: Arc<Unit>,
    lifecycle: Arc<Lifecycle>,
}

impl Props {
    pub(crate) fn for_unit(unit: &Arc<Unit>, lifecycle: &Arc<Lifecycle>) -> Self {
        let (name, custom) = unit.with_state(|st| (st.name.clone(), st.custom.clone()));
        Self {
            name,
            custom,
            unit: Arc::clone(unit),
            lifecycle: Arc::clone(lifecycle),
        }
    }

    /// Name of the unit being driven.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Custom props of the unit.
    pub fn custom(&self) -> &CustomProps {
        &self.custom
    }

    /// Looks up one custom prop.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.custom.get(key)
    }

    /// Mounts a child unit owned by this unit.
    ///
    /// The child is loaded, initialized and activated in the background; the returned
    /// handle exposes the progress. When the owner deactivates, its children are
    /// deactivated first.
    pub fn mount_child(
        &self,
        source: impl Into<ChildSource>,
        custom: CustomProps,
    ) -> ChildHandle {
        self.lifecycle
            .mount_child(Arc::clone(self.unit.children()), source.into(), custom)
    }

    /// Deactivates this unit if it is a child unit.
    pub fn deactivate_self(&self) -> BoxFuture<'static, Result<(), OrchestratorError>> {
        if !self.unit.is_child() {
            let err = OrchestratorError::Unsupported {
                unit: self.name.to_string(),
                capability: "self-deactivation",
            };
            return futures::future::ready(Err(err)).boxed();
        }
        let lifecycle = Arc::clone(&self.lifecycle);
        let unit = Arc::clone(&self.unit);
        async move { lifecycle.deactivate_child(unit).await.map(|_| ()) }.boxed()
    }
}

impl std::fmt::Debug for Props {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Props")
            .field("name", &self.name)
            .field("custom", &self.custom)
            .finish()
    }
}
