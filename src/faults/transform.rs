//! # Fault transformer.
//!
//! Turns a raw [`Rejection`] coming out of unit code into a [`Fault`] tagged with the
//! unit's name and prefixed with where it died:
//!
//! ```text
//! Error-shaped  ─► "<kind> '<name>' died in status <STATUS>: <error message>"
//! Value         ─► "<kind> '<name>' died in status <STATUS>: <value as JSON>"   (+ warning)
//! Opaque        ─► raw rejection kept untouched                               (+ warning)
//! ```
//!
//! `<kind>` is `child-unit` for child units and `unit` for top-level units.

use tracing::warn;

use crate::error::{Fault, FaultKind, FaultPayload, Rejection};
use crate::units::{Unit, UnitStatus};

/// Decorates `raw` with the unit's identity and current status.
pub(crate) fn transform(raw: Rejection, unit: &Unit, kind: FaultKind) -> Fault {
    let (name, status) = unit.with_state(|st| (st.name.clone(), st.status));
    decorate(raw, unit.kind_label(), &name, status, kind)
}

fn decorate(
    raw: Rejection,
    label: &str,
    name: &str,
    status: UnitStatus,
    kind: FaultKind,
) -> Fault {
    let prefix = format!("{label} '{name}' died in status {status}: ");

    let payload = match raw {
        Rejection::Error(err) => FaultPayload::Message(format!("{prefix}{err}").into()),
        other => {
            warn!(
                unit = name,
                %status,
                "'{name}' rejected its lifecycle function with a non-error value"
            );
            match serialize(&other) {
                Some(json) => FaultPayload::Message(format!("{prefix}{json}").into()),
                None => FaultPayload::Raw(other),
            }
        }
    };
    Fault::new(kind, name, payload)
}

fn serialize(raw: &Rejection) -> Option<String> {
    match raw {
        Rejection::Value(v) => serde_json::to_string(v).ok(),
        Rejection::Error(_) | Rejection::Opaque(_) => None,
    }
}
