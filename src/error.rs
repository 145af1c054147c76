//! Error types used by the unitvisor runtime and by unit code.
//!
//! This module defines three layers:
//!
//! - [`Rejection`]: what a unit-supplied loader, step or predicate fails with.
//! - [`Fault`]: a rejection decorated by the fault transformer (unit tag, status prefix, kind).
//! - [`OrchestratorError`]: errors returned to callers of the orchestrator API.
//!
//! `Fault` and `OrchestratorError` provide `as_label` for logging/metrics.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::units::UnitStatus;

/// Value a unit's code rejects with.
///
/// Unit code is free to fail with a real error, with a plain serializable value,
/// or with something opaque. The fault transformer treats each shape differently.
#[derive(Clone, Debug)]
pub enum Rejection {
    /// Error-shaped rejection.
    Error(Arc<dyn std::error::Error + Send + Sync>),
    /// Non-error value that can be rendered as JSON.
    Value(serde_json::Value),
    /// Non-error value with no serialized form.
    Opaque(Arc<dyn Any + Send + Sync>),
}

impl Rejection {
    /// Wraps any error type.
    pub fn error<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Rejection::Error(Arc::new(err))
    }

    /// Builds an error-shaped rejection from a message.
    pub fn message(msg: impl Into<String>) -> Self {
        Rejection::Error(Arc::new(Message(msg.into())))
    }

    /// Rejects with a plain value.
    pub fn value(value: impl Into<serde_json::Value>) -> Self {
        Rejection::Value(value.into())
    }

    /// Rejects with a value that cannot be serialized.
    pub fn opaque<T: Any + Send + Sync>(value: T) -> Self {
        Rejection::Opaque(Arc::new(value))
    }

    /// True for error-shaped rejections.
    pub fn is_error(&self) -> bool {
        matches!(self, Rejection::Error(_))
    }
}

impl From<&str> for Rejection {
    fn from(msg: &str) -> Self {
        Rejection::message(msg)
    }
}

impl From<String> for Rejection {
    fn from(msg: String) -> Self {
        Rejection::message(msg)
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Error(err) => write!(f, "{err}"),
            Rejection::Value(v) => write!(f, "{v}"),
            Rejection::Opaque(_) => f.write_str("<opaque rejection>"),
        }
    }
}

/// Plain message error backing [`Rejection::message`].
#[derive(Debug, Error)]
#[error("{0}")]
struct Message(String);

/// Fault taxonomy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    /// Bad registration or configuration; never enters the state machine.
    Validation,
    /// Code resolution failed or the exports are malformed.
    Load,
    /// A phase implementation (or the activation predicate) faulted.
    Phase,
    /// A phase exceeded its bound with `fatal` set.
    Timeout,
    /// One or more child units failed to deactivate.
    AggregateChild,
}

impl FaultKind {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            FaultKind::Validation => "validation_fault",
            FaultKind::Load => "load_fault",
            FaultKind::Phase => "phase_fault",
            FaultKind::Timeout => "timeout_fault",
            FaultKind::AggregateChild => "aggregate_child_fault",
        }
    }
}

/// Body of a [`Fault`].
#[derive(Clone, Debug)]
pub enum FaultPayload {
    /// Prefixed, human-readable message.
    Message(Arc<str>),
    /// Raw rejection kept untouched because it could not be serialized.
    Raw(Rejection),
}

impl fmt::Display for FaultPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultPayload::Message(m) => f.write_str(m),
            FaultPayload::Raw(raw) => write!(f, "{raw}"),
        }
    }
}

/// Decorated fault record, tagged with the unit it belongs to.
///
/// Produced by [`transform`](crate::faults::transform); delivered to fault handlers in soft
/// mode and returned to the caller in hard mode.
#[derive(Clone, Debug, Error)]
#[error("{payload}")]
pub struct Fault {
    kind: FaultKind,
    unit: Arc<str>,
    payload: FaultPayload,
}

impl Fault {
    pub(crate) fn new(kind: FaultKind, unit: impl Into<Arc<str>>, payload: FaultPayload) -> Self {
        Self {
            kind,
            unit: unit.into(),
            payload,
        }
    }

    /// Fault classification.
    pub fn kind(&self) -> FaultKind {
        self.kind
    }

    /// Name of the unit the fault is tagged with.
    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// Fault body.
    pub fn payload(&self) -> &FaultPayload {
        &self.payload
    }

    /// Prefixed message, if the payload could be rendered.
    pub fn message(&self) -> Option<&str> {
        match &self.payload {
            FaultPayload::Message(m) => Some(m),
            FaultPayload::Raw(_) => None,
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        self.kind.as_label()
    }
}

/// # Errors returned by the orchestrator API.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum OrchestratorError {
    /// Invalid registration or configuration input.
    #[error("invalid input: {reason}")]
    Validation {
        /// What was wrong.
        reason: String,
    },

    /// No top-level unit with that name is registered.
    #[error("no unit named '{name}' has been registered")]
    UnknownUnit {
        /// Requested name.
        name: String,
    },

    /// The operation is not valid in the unit's current status.
    #[error("cannot {action} '{unit}' -- it is in status {status}")]
    InvalidStatus {
        /// Unit name.
        unit: String,
        /// Current status.
        status: UnitStatus,
        /// Attempted operation.
        action: &'static str,
    },

    /// The unit does not declare the requested capability.
    #[error("unit '{unit}' does not support {capability}")]
    Unsupported {
        /// Unit name.
        unit: String,
        /// Missing capability.
        capability: &'static str,
    },

    /// A lifecycle phase faulted (hard failure mode).
    #[error(transparent)]
    Fault(#[from] Fault),

    /// The pass this caller was waiting on was aborted.
    #[error("reevaluation pass aborted: {reason}")]
    PassAborted {
        /// Cause of the abort.
        reason: String,
    },
}

impl OrchestratorError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use unitvisor::OrchestratorError;
    ///
    /// let err = OrchestratorError::UnknownUnit { name: "nav".into() };
    /// assert_eq!(err.as_label(), "unknown_unit");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            OrchestratorError::Validation { .. } => "validation_fault",
            OrchestratorError::UnknownUnit { .. } => "unknown_unit",
            OrchestratorError::InvalidStatus { .. } => "invalid_status",
            OrchestratorError::Unsupported { .. } => "unsupported",
            OrchestratorError::Fault(f) => f.as_label(),
            OrchestratorError::PassAborted { .. } => "pass_aborted",
        }
    }

    /// Returns the underlying fault, if any.
    pub fn fault(&self) -> Option<&Fault> {
        match self {
            OrchestratorError::Fault(f) => Some(f),
            _ => None,
        }
    }

    pub(crate) fn validation(reason: impl Into<String>) -> Self {
        OrchestratorError::Validation {
            reason: reason.into(),
        }
    }
}

/// Extracts the message of a caught panic payload.
pub(crate) fn panic_message(any: &(dyn Any + Send)) -> String {
    if let Some(msg) = any.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = any.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fault_kind_serializes_snake_case() {
        let json = serde_json::to_string(&FaultKind::AggregateChild).unwrap();
        assert_eq!(json, r#""aggregate_child""#);
    }

    #[test]
    fn panic_payloads_render_their_message() {
        let payload = std::panic::catch_unwind(|| {
            if true {
                panic!("loader {}", 7);
            }
        })
        .unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "loader 7");
        let payload = std::panic::catch_unwind(|| {
            if true {
                std::panic::panic_any(42u8);
            }
        })
        .unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }

    #[test]
    fn message_rejection_is_error_shaped() {
        let r = Rejection::from("boom");
        assert!(r.is_error());
        assert_eq!(r.to_string(), "boom");
    }

    #[test]
    fn value_rejection_renders_json() {
        let r = Rejection::value(serde_json::json!({"code": 7}));
        assert!(!r.is_error());
        assert_eq!(r.to_string(), r#"{"code":7}"#);
    }

    #[test]
    fn fault_display_uses_payload() {
        let f = Fault::new(
            FaultKind::Phase,
            "nav",
            FaultPayload::Message("unit 'nav' died in status ACTIVATING: boom".into()),
        );
        assert_eq!(f.to_string(), "unit 'nav' died in status ACTIVATING: boom");
        assert_eq!(f.unit(), "nav");
        assert_eq!(f.as_label(), "phase_fault");

        let err: OrchestratorError = f.into();
        assert_eq!(err.as_label(), "phase_fault");
        assert!(err.fault().is_some());
    }
}
