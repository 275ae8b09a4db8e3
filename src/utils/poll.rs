//! Condition polling for asynchronous provisioning APIs
//!
//! Cluster imports, image downloads and machine provisioning all complete
//! asynchronously: the create call returns immediately and the caller has to
//! re-fetch the resource until its status reaches the desired state. This
//! module provides the single polling primitive every check uses instead of
//! hand-rolled sleep loops:
//!
//! ```ignore
//! use drover::utils::poll::{await_condition, Observation, PollOpts};
//!
//! let outcome = await_condition(
//!     fetch_cluster,
//!     |_, body| body.pointer("/status/ready").and_then(|v| v.as_bool()) == Some(true),
//!     PollOpts::new(Duration::from_secs(600), Duration::from_secs(5)),
//! )
//! .await?;
//! ```
//!
//! Timing rules:
//! - The first fetch always runs, even with a zero timeout.
//! - The loop never sleeps past the deadline; when the remaining budget is
//!   shorter than the interval it sleeps only the remainder and then reports
//!   `TimedOut` instead of fetching again. An interval longer than the
//!   timeout therefore still gets exactly one fetch, and a timed-out wait
//!   finishes within one interval of the requested timeout.
//! - A ready result returns immediately, with no trailing sleep.

use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};

/// One observed state of the remote resource: HTTP status plus parsed body.
///
/// The poller never interprets the body; it only hands it to the caller's
/// predicates and carries the last one seen into the outcome.
#[derive(Debug, Clone)]
pub struct Observation {
    pub code: u16,
    pub body: Value,
}

impl Observation {
    pub fn new(code: u16, body: Value) -> Self {
        Self { code, body }
    }
}

/// Boxed fetch future, for fetch closures built outside a generic context.
pub type FetchFuture = Pin<Box<dyn Future<Output = Result<Observation, FetchError>> + Send>>;

/// Errors a fetch closure can report.
///
/// Transient failures (transport hiccups, malformed bodies) are absorbed
/// into the retry loop; authentication rejections abort the poll at once
/// since retrying an invalid token never helps.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("transient fetch failure: {0}")]
    Transient(String),

    #[error("authentication rejected (status {code})")]
    Auth { code: u16 },
}

impl FetchError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, FetchError::Auth { .. })
    }
}

/// A transient fetch failure recorded during a poll, in observation order.
#[derive(Debug, Clone)]
pub struct TransientFailure {
    pub at: SystemTime,
    pub message: String,
}

/// Terminal outcome of a wait.
#[derive(Debug)]
pub enum PollOutcome {
    /// The ready predicate matched; carries the matching observation.
    Ready(Observation),
    /// The fail-fast predicate matched; the resource is in a state from
    /// which the awaited condition can no longer be reached.
    Failed(Observation),
    /// The deadline passed. Carries the last successful observation (None
    /// if every fetch errored) and the transient failures seen on the way,
    /// so the caller can build a diagnostic without re-fetching.
    TimedOut {
        last: Option<Observation>,
        errors: Vec<TransientFailure>,
    },
    /// The caller's cancel flag was raised before the deadline.
    Cancelled,
}

impl PollOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, PollOutcome::Ready(_))
    }

    pub fn into_ready(self) -> Option<Observation> {
        match self {
            PollOutcome::Ready(obs) => Some(obs),
            _ => None,
        }
    }

    /// Short human-readable description of the last known state, for
    /// failure messages.
    pub fn describe(&self) -> String {
        match self {
            PollOutcome::Ready(obs) => format!("ready (status {}): {}", obs.code, obs.body),
            PollOutcome::Failed(obs) => format!("failed (status {}): {}", obs.code, obs.body),
            PollOutcome::TimedOut {
                last: Some(obs),
                errors,
            } => format!(
                "timed out; last seen status {}: {} ({} transient errors)",
                obs.code,
                obs.body,
                errors.len()
            ),
            PollOutcome::TimedOut { last: None, errors } => format!(
                "timed out with no successful fetch ({} transient errors)",
                errors.len()
            ),
            PollOutcome::Cancelled => "cancelled".to_string(),
        }
    }
}

/// Options for a single wait: deadline budget, poll interval and an
/// optional cancel flag shared with the surrounding run.
///
/// Built once per call site and discarded after the wait returns.
#[derive(Debug, Clone)]
pub struct PollOpts {
    pub timeout: Duration,
    pub interval: Duration,
    cancel: Option<Arc<AtomicBool>>,
}

impl Default for PollOpts {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            interval: Duration::from_secs(5),
            cancel: None,
        }
    }
}

impl PollOpts {
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self {
            timeout,
            interval,
            cancel: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Share a cancel flag with the caller. The poller checks it before
    /// every fetch and after every sleep and returns `Cancelled` promptly
    /// instead of waiting out the deadline.
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(false)
    }
}

/// Poll `fetch` until `is_ready` matches, the deadline passes, or the wait
/// is cancelled.
///
/// Transient fetch errors are recorded and retried; an authentication
/// rejection is returned as `Err` immediately. Predicates must be pure over
/// (status, body); a panicking predicate is a caller bug and propagates.
pub async fn await_condition<F, Fut, R>(
    fetch: F,
    is_ready: R,
    opts: PollOpts,
) -> Result<PollOutcome, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Observation, FetchError>>,
    R: FnMut(u16, &Value) -> bool,
{
    await_condition_or_fail(fetch, is_ready, |_, _| false, opts).await
}

/// Like [`await_condition`], with a fail-fast predicate evaluated before
/// the ready predicate on every observation. When it matches, the wait
/// returns `Failed` with the offending observation and stops fetching,
/// regardless of remaining budget.
pub async fn await_condition_or_fail<F, Fut, R, X>(
    mut fetch: F,
    mut is_ready: R,
    mut is_failed: X,
    opts: PollOpts,
) -> Result<PollOutcome, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Observation, FetchError>>,
    R: FnMut(u16, &Value) -> bool,
    X: FnMut(u16, &Value) -> bool,
{
    let deadline = Instant::now() + opts.timeout;
    let mut last: Option<Observation> = None;
    let mut errors: Vec<TransientFailure> = Vec::new();
    let mut first = true;

    loop {
        if opts.cancelled() {
            return Ok(PollOutcome::Cancelled);
        }
        // The first check always runs; afterwards a passed deadline ends
        // the wait without another fetch.
        if !first && Instant::now() >= deadline {
            return Ok(PollOutcome::TimedOut { last, errors });
        }
        first = false;

        match fetch().await {
            Ok(obs) => {
                if is_failed(obs.code, &obs.body) {
                    debug!(status = obs.code, "fail-fast predicate matched");
                    return Ok(PollOutcome::Failed(obs));
                }
                if is_ready(obs.code, &obs.body) {
                    return Ok(PollOutcome::Ready(obs));
                }
                last = Some(obs);
            }
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                warn!(error = %err, "transient fetch failure, retrying");
                errors.push(TransientFailure {
                    at: SystemTime::now(),
                    message: err.to_string(),
                });
            }
        }

        let now = Instant::now();
        if now >= deadline {
            return Ok(PollOutcome::TimedOut { last, errors });
        }
        // Never sleep past the deadline.
        let nap = opts.interval.min(deadline - now);
        tokio::time::sleep(nap).await;
        if opts.cancelled() {
            return Ok(PollOutcome::Cancelled);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant as StdInstant;

    fn counting_fetch(
        counter: Arc<AtomicUsize>,
        response: impl Fn(usize) -> Result<Observation, FetchError> + Clone + 'static,
    ) -> impl FnMut() -> std::pin::Pin<Box<dyn Future<Output = Result<Observation, FetchError>>>>
    {
        move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            let response = response.clone();
            Box::pin(async move { response(n) })
        }
    }

    #[tokio::test]
    async fn zero_timeout_fetches_exactly_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let fetch = counting_fetch(calls.clone(), |_| Ok(Observation::new(200, json!({}))));

        let outcome = await_condition(
            fetch,
            |_, _| false,
            PollOpts::new(Duration::ZERO, Duration::from_secs(1)),
        )
        .await
        .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        match outcome {
            PollOutcome::TimedOut { last, .. } => assert_eq!(last.unwrap().body, json!({})),
            other => panic!("expected TimedOut, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn ready_on_first_fetch_returns_without_sleeping() {
        let calls = Arc::new(AtomicUsize::new(0));
        let fetch = counting_fetch(calls.clone(), |_| {
            Ok(Observation::new(200, json!({"status": {"ready": true}})))
        });

        let started = StdInstant::now();
        let outcome = await_condition(
            fetch,
            |_, body| body.pointer("/status/ready").and_then(Value::as_bool) == Some(true),
            PollOpts::new(Duration::from_secs(30), Duration::from_secs(10)),
        )
        .await
        .unwrap();

        assert!(outcome.is_ready());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn interval_longer_than_timeout_fetches_once_and_times_out_at_timeout() {
        let calls = Arc::new(AtomicUsize::new(0));
        let fetch = counting_fetch(calls.clone(), |_| Ok(Observation::new(200, json!({}))));

        let started = StdInstant::now();
        let outcome = await_condition(
            fetch,
            |_, _| false,
            PollOpts::new(Duration::from_millis(50), Duration::from_secs(60)),
        )
        .await
        .unwrap();

        let elapsed = started.elapsed();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(outcome, PollOutcome::TimedOut { .. }));
        assert!(elapsed >= Duration::from_millis(50));
        assert!(elapsed < Duration::from_secs(2), "overshot: {elapsed:?}");
    }

    #[tokio::test]
    async fn timeout_elapsed_is_within_one_interval_of_budget() {
        let calls = Arc::new(AtomicUsize::new(0));
        let fetch = counting_fetch(calls.clone(), |_| Ok(Observation::new(200, json!({}))));

        let started = StdInstant::now();
        let outcome = await_condition(
            fetch,
            |_, _| false,
            PollOpts::new(Duration::from_millis(100), Duration::from_millis(40)),
        )
        .await
        .unwrap();

        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed < Duration::from_millis(500), "overshot: {elapsed:?}");
        assert!(calls.load(Ordering::SeqCst) >= 2);
        match outcome {
            PollOutcome::TimedOut { last, .. } => {
                let last = last.unwrap();
                assert_eq!(last.code, 200);
                assert_eq!(last.body, json!({}));
            }
            other => panic!("expected TimedOut, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn progress_sequence_returns_ready_with_final_body() {
        let calls = Arc::new(AtomicUsize::new(0));
        let fetch = counting_fetch(calls.clone(), |n| {
            let progress = [50, 80, 100][n.min(2)];
            Ok(Observation::new(200, json!({"status": {"progress": progress}})))
        });

        let outcome = await_condition(
            fetch,
            |_, body| body.pointer("/status/progress").and_then(Value::as_u64) == Some(100),
            PollOpts::new(Duration::from_secs(30), Duration::from_millis(10)),
        )
        .await
        .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let obs = outcome.into_ready().unwrap();
        assert_eq!(obs.body.pointer("/status/progress"), Some(&json!(100)));
    }

    #[tokio::test]
    async fn fail_fast_stops_after_matching_fetch() {
        let calls = Arc::new(AtomicUsize::new(0));
        let fetch = counting_fetch(calls.clone(), |n| {
            let phase = if n == 0 { "Provisioning" } else { "Error" };
            Ok(Observation::new(200, json!({"status": {"phase": phase}})))
        });

        let outcome = await_condition_or_fail(
            fetch,
            |_, _| false,
            |_, body| body.pointer("/status/phase").and_then(Value::as_str) == Some("Error"),
            PollOpts::new(Duration::from_secs(60), Duration::from_millis(10)),
        )
        .await
        .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        match outcome {
            PollOutcome::Failed(obs) => {
                assert_eq!(
                    obs.body.pointer("/status/phase"),
                    Some(&json!("Error"))
                );
            }
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn transient_errors_are_retried_then_recorded() {
        let calls = Arc::new(AtomicUsize::new(0));
        let fetch = counting_fetch(calls.clone(), |n| {
            if n == 0 {
                Err(FetchError::Transient("connection reset".into()))
            } else {
                Ok(Observation::new(200, json!({"status": {"ready": true}})))
            }
        });

        let outcome = await_condition(
            fetch,
            |_, body| body.pointer("/status/ready").and_then(Value::as_bool) == Some(true),
            PollOpts::new(Duration::from_secs(30), Duration::from_millis(10)),
        )
        .await
        .unwrap();

        assert!(outcome.is_ready());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn transient_errors_show_up_in_timeout_outcome() {
        let calls = Arc::new(AtomicUsize::new(0));
        let fetch = counting_fetch(calls.clone(), |_| {
            Err(FetchError::Transient("503 from ingress".into()))
        });

        let outcome = await_condition(
            fetch,
            |_, _| true,
            PollOpts::new(Duration::from_millis(30), Duration::from_millis(10)),
        )
        .await
        .unwrap();

        match outcome {
            PollOutcome::TimedOut { last, errors } => {
                assert!(last.is_none());
                assert!(!errors.is_empty());
                assert!(errors[0].message.contains("503"));
            }
            other => panic!("expected TimedOut, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn auth_rejection_aborts_immediately() {
        let calls = Arc::new(AtomicUsize::new(0));
        let fetch = counting_fetch(calls.clone(), |_| Err(FetchError::Auth { code: 401 }));

        let result = await_condition(
            fetch,
            |_, _| true,
            PollOpts::new(Duration::from_secs(60), Duration::from_secs(1)),
        )
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(FetchError::Auth { code: 401 })));
    }

    #[tokio::test]
    async fn raised_cancel_flag_short_circuits() {
        let cancel = Arc::new(AtomicBool::new(true));
        let calls = Arc::new(AtomicUsize::new(0));
        let fetch = counting_fetch(calls.clone(), |_| Ok(Observation::new(200, json!({}))));

        let outcome = await_condition(
            fetch,
            |_, _| false,
            PollOpts::new(Duration::from_secs(600), Duration::from_secs(5))
                .with_cancel_flag(cancel),
        )
        .await
        .unwrap();

        assert!(matches!(outcome, PollOutcome::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancellation_observed_at_sleep_boundary_not_deadline() {
        let cancel = Arc::new(AtomicBool::new(false));
        let calls = Arc::new(AtomicUsize::new(0));
        let fetch = counting_fetch(calls.clone(), |_| Ok(Observation::new(200, json!({}))));

        let flag = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            flag.store(true, Ordering::Relaxed);
        });

        let started = StdInstant::now();
        let outcome = await_condition(
            fetch,
            |_, _| false,
            PollOpts::new(Duration::from_secs(600), Duration::from_millis(20))
                .with_cancel_flag(cancel),
        )
        .await
        .unwrap();

        assert!(matches!(outcome, PollOutcome::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn describe_covers_all_outcomes() {
        let ready = PollOutcome::Ready(Observation::new(200, json!({"a": 1})));
        assert!(ready.describe().contains("ready"));

        let timed_out = PollOutcome::TimedOut {
            last: None,
            errors: vec![],
        };
        assert!(timed_out.describe().contains("no successful fetch"));

        assert_eq!(PollOutcome::Cancelled.describe(), "cancelled");
    }
}
