//! Condition polling against an eventually-consistent cluster
//!
//! [`poll_until`] evaluates a predicate on a fixed interval until it reports
//! the expected answer, the deadline passes, or the cancellation token fires.
//!
//! Predicates return `Ok(true)` / `Ok(false)` for a definite observation and
//! classify failures themselves:
//! - [`PredicateError::NotYet`] - expected absence or lag, retried
//! - [`PredicateError::Terminal`] - bad request, forbidden, broken contract;
//!   aborts the poll immediately
//!
//! # Example
//!
//! ```ignore
//! use pipelines_e2e::poll::{poll_until, PollSpec, PredicateError};
//!
//! let spec = PollSpec::new("deployment/ns/smee").preset(timeouts.resource());
//! poll_until(&cancel, &spec, || async {
//!     match api.get_opt("smee").await {
//!         Ok(found) => Ok(found.is_some()),
//!         Err(e) => Err(PredicateError::Terminal(e.to_string())),
//!     }
//! })
//! .await?;
//! ```

use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::Preset;
use crate::wait::WaitError;

/// How a predicate failed to produce an observation
#[derive(Debug, Clone, thiserror::Error)]
pub enum PredicateError {
    /// Not there yet; retry on the next tick
    #[error("not yet: {0}")]
    NotYet(String),

    /// Will never succeed; stop polling
    #[error("{0}")]
    Terminal(String),
}

/// Errors returned by [`poll_until`]
#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("polling {target} aborted after {elapsed:?}: {reason}")]
    Terminal {
        target: String,
        reason: String,
        elapsed: Duration,
    },

    #[error("{0}")]
    Timeout(WaitError),

    #[error("polling {target} cancelled after {elapsed:?}")]
    Cancelled { target: String, elapsed: Duration },

    #[error("invalid poll spec for {target}: {reason}")]
    InvalidSpec { target: String, reason: String },
}

impl PollError {
    /// True for deadline failures
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// True for cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Parameters for one [`poll_until`] call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollSpec {
    /// Identity of the thing being polled, for logs and errors
    pub target: String,
    /// Time between evaluations
    pub interval: Duration,
    /// Overall deadline, measured from the start of the call
    pub timeout: Duration,
    /// Evaluate once before the first interval elapses
    pub immediate: bool,
    /// Succeed when the predicate reports `false`
    pub negate: bool,
}

impl PollSpec {
    /// Create a spec with a 1s interval, 60s timeout, delayed first poll
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            interval: Duration::from_secs(1),
            timeout: Duration::from_secs(60),
            immediate: false,
            negate: false,
        }
    }

    /// Take interval and timeout from a preset
    #[must_use]
    pub fn preset(mut self, preset: Preset) -> Self {
        self.interval = preset.interval;
        self.timeout = preset.timeout;
        self
    }

    /// Set the polling interval
    #[must_use]
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the timeout
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Evaluate immediately instead of after one interval
    #[must_use]
    pub fn immediate(mut self, immediate: bool) -> Self {
        self.immediate = immediate;
        self
    }

    /// Invert success polarity (wait for absence)
    #[must_use]
    pub fn negate(mut self, negate: bool) -> Self {
        self.negate = negate;
        self
    }
}

/// Poll `predicate` until it reports the expected answer
///
/// Evaluations happen at `k * interval` from the start (`k >= 0` when
/// `immediate`, `k >= 1` otherwise) while that time is within `timeout`.
/// If no tick fits inside the deadline, one evaluation runs at the deadline,
/// so a spec with `timeout < interval` always evaluates exactly once.
///
/// Evaluations never overlap. Both the wait and the predicate future are
/// raced against `cancel`.
///
/// # Errors
///
/// - [`PollError::Terminal`] when the predicate returns a terminal error
/// - [`PollError::Timeout`] when the deadline passes without success
/// - [`PollError::Cancelled`] when `cancel` fires
/// - [`PollError::InvalidSpec`] for a zero interval
pub async fn poll_until<F, Fut>(
    cancel: &CancellationToken,
    spec: &PollSpec,
    mut predicate: F,
) -> Result<(), PollError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, PredicateError>>,
{
    if spec.interval.is_zero() {
        return Err(PollError::InvalidSpec {
            target: spec.target.clone(),
            reason: "interval must be greater than zero".to_string(),
        });
    }

    let start = Instant::now();
    let deadline = instant_after(start, spec.timeout);
    let mut next = if spec.immediate {
        start
    } else if spec.interval > spec.timeout {
        deadline
    } else {
        instant_after(start, spec.interval)
    };
    let mut attempts = 0u32;
    let mut last_state = "not evaluated".to_string();

    debug!(
        target_ref = %spec.target,
        interval = ?spec.interval,
        timeout = ?spec.timeout,
        immediate = spec.immediate,
        negate = spec.negate,
        "Starting poll"
    );

    loop {
        if next > start {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    return Err(cancelled(spec, start));
                }
                () = sleep_until(next) => {}
            }
        } else if cancel.is_cancelled() {
            return Err(cancelled(spec, start));
        }

        attempts += 1;
        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                return Err(cancelled(spec, start));
            }
            outcome = predicate() => outcome,
        };

        match outcome {
            Ok(satisfied) if satisfied != spec.negate => {
                debug!(
                    target_ref = %spec.target,
                    attempts = attempts,
                    elapsed = ?start.elapsed(),
                    "Poll condition met"
                );
                return Ok(());
            }
            Ok(_) => {
                last_state = if spec.negate {
                    "still present".to_string()
                } else {
                    "condition not met".to_string()
                };
            }
            Err(PredicateError::NotYet(state)) => {
                last_state = state;
            }
            Err(PredicateError::Terminal(reason)) => {
                return Err(PollError::Terminal {
                    target: spec.target.clone(),
                    reason,
                    elapsed: start.elapsed(),
                });
            }
        }

        info!(
            target_ref = %spec.target,
            attempt = attempts,
            state = %last_state,
            elapsed = ?start.elapsed(),
            "Waiting for {}",
            spec.target
        );

        next = instant_after(next, spec.interval);
        if next > deadline {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    return Err(cancelled(spec, start));
                }
                () = sleep_until(deadline) => {}
            }
            return Err(PollError::Timeout(
                WaitError::new(spec.target.clone(), spec.timeout, start.elapsed())
                    .with_state(last_state)
                    .with_attempts(attempts),
            ));
        }
    }
}

/// Longest wait the poller schedules; larger offsets are clamped to it
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

fn instant_after(base: Instant, offset: Duration) -> Instant {
    base.checked_add(offset.min(FAR_FUTURE)).unwrap_or(base)
}

fn cancelled(spec: &PollSpec, start: Instant) -> PollError {
    PollError::Cancelled {
        target: spec.target.clone(),
        elapsed: start.elapsed(),
    }
}

/// Wait until `predicate` reports presence
pub async fn wait_for_presence<F, Fut>(
    cancel: &CancellationToken,
    spec: &PollSpec,
    predicate: F,
) -> Result<(), PollError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, PredicateError>>,
{
    let spec = spec.clone().negate(false);
    poll_until(cancel, &spec, predicate).await
}

/// Wait until `predicate` (which reports presence) reports absence
pub async fn wait_for_absence<F, Fut>(
    cancel: &CancellationToken,
    spec: &PollSpec,
    predicate: F,
) -> Result<(), PollError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, PredicateError>>,
{
    let spec = spec.clone().negate(true);
    poll_until(cancel, &spec, predicate).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    type Outcome = Result<bool, PredicateError>;

    fn counting(
        counter: &Arc<AtomicU32>,
        f: impl Fn(u32) -> Outcome,
    ) -> impl FnMut() -> std::future::Ready<Outcome> {
        let counter = counter.clone();
        move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(f(n))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_on_third_tick() {
        let counter = Arc::new(AtomicU32::new(0));
        let spec = PollSpec::new("thing")
            .interval(Duration::from_millis(10))
            .timeout(Duration::from_secs(1));

        let start = Instant::now();
        let result = poll_until(
            &CancellationToken::new(),
            &spec,
            counting(&counter, |n| Ok(n >= 2)),
        )
        .await;

        assert!(result.is_ok());
        assert!(start.elapsed() >= Duration::from_millis(20));
        assert!(counter.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_evaluates_without_waiting() {
        let counter = Arc::new(AtomicU32::new(0));
        let spec = PollSpec::new("thing")
            .interval(Duration::from_secs(10))
            .timeout(Duration::from_secs(60))
            .immediate(true);

        let start = Instant::now();
        poll_until(&CancellationToken::new(), &spec, counting(&counter, |_| Ok(true)))
            .await
            .unwrap();

        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_first_poll_waits_one_interval() {
        let spec = PollSpec::new("thing")
            .interval(Duration::from_secs(3))
            .timeout(Duration::from_secs(60));

        let start = Instant::now();
        poll_until(&CancellationToken::new(), &spec, || async { Ok(true) })
            .await
            .unwrap();

        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_timeout_polls_normally() {
        let counter = Arc::new(AtomicU32::new(0));
        let spec = PollSpec::new("thing")
            .interval(Duration::from_millis(10))
            .timeout(Duration::MAX);

        let start = Instant::now();
        poll_until(
            &CancellationToken::new(),
            &spec,
            counting(&counter, |n| Ok(n >= 1)),
        )
        .await
        .unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(start.elapsed(), Duration::from_millis(20));
    }

    #[test]
    fn test_instant_after_clamps_huge_offsets() {
        let base = Instant::now();

        assert_eq!(instant_after(base, Duration::MAX), base + FAR_FUTURE);
        assert_eq!(
            instant_after(base, Duration::from_secs(1)),
            base + Duration::from_secs(1)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_below_interval_evaluates_once() {
        for immediate in [false, true] {
            let counter = Arc::new(AtomicU32::new(0));
            let spec = PollSpec::new("thing")
                .interval(Duration::from_secs(10))
                .timeout(Duration::from_secs(1))
                .immediate(immediate);

            let result = poll_until(
                &CancellationToken::new(),
                &spec,
                counting(&counter, |_| Ok(false)),
            )
            .await;

            assert!(result.unwrap_err().is_timeout());
            assert_eq!(counter.load(Ordering::SeqCst), 1, "immediate={immediate}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_carries_diagnostics() {
        let spec = PollSpec::new("deployment/ns/app")
            .interval(Duration::from_millis(100))
            .timeout(Duration::from_millis(350));

        let err = poll_until(&CancellationToken::new(), &spec, || async {
            Err(PredicateError::NotYet("0/1 available".to_string()))
        })
        .await
        .unwrap_err();

        match err {
            PollError::Timeout(wait) => {
                assert_eq!(wait.target, "deployment/ns/app");
                assert_eq!(wait.last_state, "0/1 available");
                assert_eq!(wait.attempts, 3);
                assert!(wait.elapsed >= Duration::from_millis(350));
            }
            other => panic!("expected Timeout, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_error_stops_immediately() {
        let counter = Arc::new(AtomicU32::new(0));
        let spec = PollSpec::new("thing")
            .interval(Duration::from_millis(10))
            .timeout(Duration::from_secs(5));

        let err = poll_until(
            &CancellationToken::new(),
            &spec,
            counting(&counter, |n| {
                if n == 1 {
                    Err(PredicateError::Terminal("forbidden".to_string()))
                } else {
                    Ok(false)
                }
            }),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, PollError::Terminal { ref reason, .. } if reason == "forbidden"));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_yet_is_retried_in_both_polarities() {
        for negate in [false, true] {
            let counter = Arc::new(AtomicU32::new(0));
            let spec = PollSpec::new("thing")
                .interval(Duration::from_millis(10))
                .timeout(Duration::from_secs(1))
                .negate(negate);

            poll_until(
                &CancellationToken::new(),
                &spec,
                counting(&counter, move |n| {
                    if n < 2 {
                        Err(PredicateError::NotYet("missing".to_string()))
                    } else {
                        Ok(!negate)
                    }
                }),
            )
            .await
            .unwrap();

            assert_eq!(counter.load(Ordering::SeqCst), 3);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_negate_matches_inverted_predicate() {
        let outcomes: [fn(u32) -> bool; 3] = [|n| n >= 4, |_| false, |_| true];

        for outcome in outcomes {
            let spec = PollSpec::new("thing")
                .interval(Duration::from_millis(10))
                .timeout(Duration::from_millis(100));

            let plain = {
                let counter = Arc::new(AtomicU32::new(0));
                poll_until(
                    &CancellationToken::new(),
                    &spec,
                    counting(&counter, move |n| Ok(!outcome(n))),
                )
                .await
            };
            let negated = {
                let counter = Arc::new(AtomicU32::new(0));
                poll_until(
                    &CancellationToken::new(),
                    &spec.clone().negate(true),
                    counting(&counter, move |n| Ok(outcome(n))),
                )
                .await
            };

            assert_eq!(plain.is_ok(), negated.is_ok());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_start_fails_even_when_satisfied() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let spec = PollSpec::new("thing")
            .interval(Duration::from_secs(1))
            .timeout(Duration::from_secs(60))
            .immediate(true);

        let err = poll_until(&cancel, &spec, || async { Ok(true) })
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_wait_returns_promptly() {
        let cancel = CancellationToken::new();
        let spec = PollSpec::new("thing")
            .interval(Duration::from_secs(5))
            .timeout(Duration::from_secs(600));

        let child = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            child.cancel();
        });

        let start = Instant::now();
        let err = poll_until(&cancel, &spec, || async { Ok(false) })
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_slow_predicate() {
        let cancel = CancellationToken::new();
        let spec = PollSpec::new("thing")
            .interval(Duration::from_secs(1))
            .timeout(Duration::from_secs(60))
            .immediate(true);

        let child = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            child.cancel();
        });

        let err = poll_until(&cancel, &spec, || async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(true)
        })
        .await
        .unwrap_err();

        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn test_zero_interval_is_rejected() {
        let spec = PollSpec::new("thing").interval(Duration::ZERO);

        let err = poll_until(&CancellationToken::new(), &spec, || async { Ok(true) })
            .await
            .unwrap_err();

        assert!(matches!(err, PollError::InvalidSpec { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_absence_succeeds_when_gone() {
        let counter = Arc::new(AtomicU32::new(0));
        let spec = PollSpec::new("thing")
            .interval(Duration::from_millis(10))
            .timeout(Duration::from_secs(1));

        wait_for_absence(
            &CancellationToken::new(),
            &spec,
            counting(&counter, |n| Ok(n < 1)),
        )
        .await
        .unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_presence_ignores_negate_on_spec() {
        let spec = PollSpec::new("thing")
            .interval(Duration::from_millis(10))
            .timeout(Duration::from_millis(50))
            .negate(true);

        let result = wait_for_presence(&CancellationToken::new(), &spec, || async { Ok(true) }).await;
        assert!(result.is_ok());
    }

    #[test]
    fn test_spec_preset() {
        let spec = PollSpec::new("thing").preset(Preset {
            interval: Duration::from_secs(2),
            timeout: Duration::from_secs(20),
        });

        assert_eq!(spec.interval, Duration::from_secs(2));
        assert_eq!(spec.timeout, Duration::from_secs(20));
        assert!(!spec.immediate);
        assert!(!spec.negate);
    }

    #[test]
    fn test_poll_error_display_includes_target() {
        let err = PollError::Terminal {
            target: "sa/ns/pipeline".to_string(),
            reason: "forbidden".to_string(),
            elapsed: Duration::from_secs(2),
        };
        let msg = err.to_string();
        assert!(msg.contains("sa/ns/pipeline"));
        assert!(msg.contains("2s"));
    }
}
