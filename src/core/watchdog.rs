//! # Watchdog: bounded wait on a phase operation.
//!
//! [`bounded_wait`] races the operation's own settlement against two timers:
//!
//! ```text
//! t = 0 ──── period ──── 2·period ──── ... ──── max
//!            warn #1      warn #2                │
//!                                                ├─ fatal     ─► Err(TimedOut), op keeps running detached
//!                                                └─ non-fatal ─► error!, keep waiting for op
//! ```
//!
//! ## Rules
//! - The operation is spawned; timing out only stops the *wait*, never the work.
//! - If the operation settles first, its result is forwarded untouched.
//! - Warnings repeat every `warning_period` while the next one would still land before `max`.
//! - A non-fatal timeout never synthesizes a rejection.

use std::time::Duration;

use tokio::time::{self, Instant};
use tracing::{error, warn};

use crate::config::PhaseTimeout;
use crate::error::{FaultKind, Rejection};
use crate::units::StepFuture;

/// Why a bounded operation did not succeed.
#[derive(Debug)]
pub(crate) enum PhaseFailure {
    /// The operation itself rejected (or panicked).
    Rejected(Rejection),
    /// `max` elapsed with `fatal` set.
    TimedOut { description: String, max: Duration },
}

impl PhaseFailure {
    /// Splits into the fault kind and the raw rejection handed to the transformer.
    pub fn into_parts(self) -> (FaultKind, Rejection) {
        match self {
            PhaseFailure::Rejected(raw) => (FaultKind::Phase, raw),
            PhaseFailure::TimedOut { description, max } => (
                FaultKind::Timeout,
                Rejection::message(timeout_message(&description, max)),
            ),
        }
    }
}

fn timeout_message(description: &str, max: Duration) -> String {
    format!(
        "{description} did not resolve or reject for {} ms",
        max.as_millis()
    )
}

/// Offsets from the start at which a still-pending operation is warned about.
fn warning_offsets(period: Duration, max: Duration) -> impl Iterator<Item = Duration> + Send {
    let period = period.max(Duration::from_millis(1));
    (1u32..)
        .map(move |n| period * n)
        .take_while(move |at| *at < max)
}

/// Waits for `op` under the bound `timeout`, warning every `warning_period`.
pub(crate) async fn bounded_wait(
    op: StepFuture,
    description: &str,
    timeout: PhaseTimeout,
    warning_period: Duration,
) -> Result<(), PhaseFailure> {
    let started = Instant::now();
    let mut task = tokio::spawn(op);

    let deadline = time::sleep(timeout.max);
    tokio::pin!(deadline);
    let mut expired = false;

    let mut offsets = warning_offsets(warning_period, timeout.max);
    let mut warnings: u32 = 0;
    let mut next_warning = offsets.next().map(|at| started + at);

    loop {
        let at = next_warning;
        let warning_tick = async move {
            match at {
                Some(at) => time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            joined = &mut task => {
                return match joined {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(raw)) => Err(PhaseFailure::Rejected(raw)),
                    Err(join_err) => Err(PhaseFailure::Rejected(Rejection::message(format!(
                        "{description} panicked: {join_err}"
                    )))),
                };
            }
            _ = &mut deadline, if !expired => {
                expired = true;
                next_warning = None;
                if timeout.fatal {
                    return Err(PhaseFailure::TimedOut {
                        description: description.to_string(),
                        max: timeout.max,
                    });
                }
                error!("{}", timeout_message(description, timeout.max));
            }
            _ = warning_tick => {
                warnings += 1;
                warn!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "{description} has not settled after {} warning(s)",
                    warnings
                );
                next_warning = offsets.next().map(|at| started + at);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn bound(millis: u64, fatal: bool) -> PhaseTimeout {
        PhaseTimeout::new(millis, fatal).unwrap()
    }

    fn sleeping(millis: u64, done: Arc<AtomicBool>) -> StepFuture {
        async move {
            time::sleep(Duration::from_millis(millis)).await;
            done.store(true, Ordering::SeqCst);
            Ok(())
        }
        .boxed()
    }

    #[tokio::test(start_paused = true)]
    async fn forwards_settlement_that_wins() {
        let done = Arc::new(AtomicBool::new(false));
        let res = bounded_wait(
            sleeping(10, done.clone()),
            "init",
            bound(50, true),
            Duration::from_millis(1000),
        )
        .await;
        assert!(res.is_ok());
        assert!(done.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn forwards_rejection_untouched() {
        let op: StepFuture = async { Err(Rejection::message("boom")) }.boxed();
        let res = bounded_wait(op, "init", bound(50, true), Duration::from_millis(1000)).await;
        match res {
            Err(PhaseFailure::Rejected(raw)) => assert_eq!(raw.to_string(), "boom"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_timeout_rejects_and_leaves_op_running() {
        let done = Arc::new(AtomicBool::new(false));
        let start = Instant::now();
        let res = bounded_wait(
            sleeping(200, done.clone()),
            "activate for unit 'D'",
            bound(50, true),
            Duration::from_millis(1000),
        )
        .await;

        assert_eq!(start.elapsed(), Duration::from_millis(50));
        let (kind, raw) = res.unwrap_err().into_parts();
        assert_eq!(kind, FaultKind::Timeout);
        assert_eq!(
            raw.to_string(),
            "activate for unit 'D' did not resolve or reject for 50 ms"
        );

        assert!(!done.load(Ordering::SeqCst));
        time::sleep(Duration::from_millis(200)).await;
        assert!(done.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn non_fatal_timeout_keeps_waiting() {
        let done = Arc::new(AtomicBool::new(false));
        let start = Instant::now();
        let res = bounded_wait(
            sleeping(2500, done.clone()),
            "deactivate",
            bound(1500, false),
            Duration::from_millis(1000),
        )
        .await;

        assert!(res.is_ok());
        assert!(done.load(Ordering::SeqCst));
        assert_eq!(start.elapsed(), Duration::from_millis(2500));
    }

    #[test]
    fn warnings_stop_before_the_bound() {
        let second = Duration::from_millis(1000);
        let offsets: Vec<_> = warning_offsets(second, Duration::from_millis(2500)).collect();
        assert_eq!(offsets, vec![second, second * 2]);

        assert_eq!(warning_offsets(second, Duration::from_millis(800)).count(), 0);
        assert_eq!(warning_offsets(second, Duration::from_millis(2000)).count(), 1);
        assert_eq!(warning_offsets(Duration::ZERO, Duration::from_millis(3)).count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn panic_in_operation_becomes_rejection() {
        let op: StepFuture = async {
            if true {
                panic!("kaput");
            }
            Ok(())
        }
        .boxed();
        let res = bounded_wait(op, "init", bound(50, false), Duration::from_millis(10)).await;
        assert!(matches!(res, Err(PhaseFailure::Rejected(_))));
    }
}
