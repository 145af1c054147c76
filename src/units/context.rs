//! Opaque reevaluation context.
//!
//! The orchestrator never inspects a [`Context`]; it passes it untouched to every
//! activation predicate and attaches it to pass notifications.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Cheaply cloneable, type-erased context value.
///
/// ## Example
/// ```
/// use unitvisor::Context;
///
/// let ctx = Context::new(String::from("/settings"));
/// assert_eq!(ctx.get::<String>().map(String::as_str), Some("/settings"));
/// assert!(ctx.get::<u32>().is_none());
/// ```
#[derive(Clone)]
pub struct Context(Arc<dyn Any + Send + Sync>);

impl Context {
    /// Wraps a value.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    /// Context carrying no information.
    pub fn empty() -> Self {
        Self::new(())
    }

    /// Borrows the value if it has type `T`.
    pub fn get<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Context(..)")
    }
}
