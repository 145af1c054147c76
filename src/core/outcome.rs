//! # Shared one-shot outcomes.
//!
//! An [`Outcome`] is settled at most once by the engine and observed by any number of
//! waiters through [`Completion`]s. All completions of one outcome poll the same shared
//! future, so they compare equal under [`Completion::ptr_eq`].
//!
//! ```text
//! Outcome::settle(res) ─► oneshot ─► Shared<BoxFuture> ─┬─► Completion #1
//!                                                       ├─► Completion #2
//!                                                       └─► ...
//! ```
//!
//! ## Rules
//! - Only the first `settle` is delivered; later calls return `false`.
//! - If the outcome is dropped unsettled, waiters observe a phase fault instead of hanging.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::error::{Fault, FaultKind, FaultPayload};

type SharedResult = Shared<BoxFuture<'static, Result<(), Fault>>>;

struct Inner {
    tx: Mutex<Option<oneshot::Sender<Result<(), Fault>>>>,
    fut: SharedResult,
}

/// Settle-once result shared between the engine and its waiters.
#[derive(Clone)]
pub(crate) struct Outcome {
    inner: Arc<Inner>,
}

impl Outcome {
    /// Creates an unsettled outcome for `unit`.
    pub fn new(unit: Arc<str>) -> Self {
        let (tx, rx) = oneshot::channel::<Result<(), Fault>>();
        let fut = rx
            .map(move |res| match res {
                Ok(res) => res,
                Err(_) => Err(Fault::new(
                    FaultKind::Phase,
                    unit.clone(),
                    FaultPayload::Message(format!("'{unit}' was dropped before settling").into()),
                )),
            })
            .boxed()
            .shared();
        Self {
            inner: Arc::new(Inner {
                tx: Mutex::new(Some(tx)),
                fut,
            }),
        }
    }

    /// Delivers `res` to all waiters. Returns `false` if already settled.
    pub fn settle(&self, res: Result<(), Fault>) -> bool {
        match self.inner.tx.lock().take() {
            Some(tx) => {
                let _ = tx.send(res);
                true
            }
            None => false,
        }
    }

    #[cfg(test)]
    pub fn is_settled(&self) -> bool {
        self.inner.tx.lock().is_none()
    }

    /// New waiter on this outcome.
    pub fn completion(&self) -> Completion {
        Completion {
            fut: self.inner.fut.clone(),
        }
    }
}

/// Future resolving when an engine-side operation settles.
///
/// Cloning a `Completion` yields another waiter on the same operation.
#[derive(Clone)]
#[must_use = "a completion does nothing unless awaited"]
pub struct Completion {
    fut: SharedResult,
}

impl Completion {
    /// True when both completions observe the same underlying operation.
    pub fn ptr_eq(&self, other: &Completion) -> bool {
        self.fut.ptr_eq(&other.fut)
    }
}

impl Future for Completion {
    type Output = Result<(), Fault>;

    fn poll(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        self.get_mut().fut.poll_unpin(cx)
    }
}

impl std::fmt::Debug for Completion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completion").finish_non_exhaustive()
    }
}
