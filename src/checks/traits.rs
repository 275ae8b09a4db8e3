//! Check trait and supporting types
//!
//! The `Check` trait defines the interface for the end-to-end stages. Each
//! check runs a sequence of API calls and waits, records a `StepResult`
//! per step, and returns a `CheckResult`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::client::{ApiResponse, HarvesterClient, RancherClient};
use crate::utils::poll::{FetchError, Observation, PollOpts, PollOutcome};

/// Errors that can occur during check execution
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("client error: {0}")]
    Client(#[from] crate::client::ClientError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Failed(String),

    #[error("fetch aborted: {0}")]
    Fetch(#[from] FetchError),

    #[error("check cancelled")]
    Cancelled,
}

/// Result of a single step within a check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    /// Step name (e.g. "create-mgmt-cluster", "await-ready")
    pub step: String,
    /// Whether this step passed
    pub passed: bool,
    /// Error message if it failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Additional details (step-specific)
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub details: HashMap<String, serde_json::Value>,
}

impl StepResult {
    pub fn passed(step: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            passed: true,
            error: None,
            details: HashMap::new(),
        }
    }

    pub fn failed(step: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            passed: false,
            error: Some(error.into()),
            details: HashMap::new(),
        }
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.details.insert(key.into(), v);
        }
        self
    }
}

/// Overall result of a check execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    /// Name of the check
    pub check_name: String,
    /// Whether all steps passed
    pub passed: bool,
    /// Individual step results, in execution order
    pub steps: Vec<StepResult>,
    /// How long the check took
    pub duration: Duration,
    /// Summary message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CheckResult {
    pub fn new(check_name: impl Into<String>, steps: Vec<StepResult>, duration: Duration) -> Self {
        let passed = steps.iter().all(|s| s.passed);
        Self {
            check_name: check_name.into(),
            passed,
            steps,
            duration,
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Configuration options for a check
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckOptions {
    /// Budget for each wait in this check
    #[serde(
        default,
        with = "humantime_serde",
        skip_serializing_if = "Option::is_none"
    )]
    pub timeout: Option<Duration>,

    /// Delay between poll attempts
    #[serde(
        default,
        with = "humantime_serde",
        skip_serializing_if = "Option::is_none"
    )]
    pub interval: Option<Duration>,

    /// Check-specific options (arbitrary key-value pairs)
    #[serde(default, flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl CheckOptions {
    pub fn timeout_or(&self, default: Duration) -> Duration {
        self.timeout.unwrap_or(default)
    }

    pub fn interval_or(&self, default: Duration) -> Duration {
        self.interval.unwrap_or(default)
    }

    /// Get an extra option as a specific type
    pub fn get_extra<T: for<'de> Deserialize<'de>>(&self, key: &str) -> Option<T> {
        self.extra
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

/// Names every created resource derives from, matching the conventions
/// of the Harvester e2e suites.
#[derive(Debug, Clone)]
pub struct Names {
    unique: String,
}

impl Names {
    pub fn new(unique: impl Into<String>) -> Self {
        Self {
            unique: unique.into(),
        }
    }

    /// Base name: cloud credential, secret, machine config, network, image.
    pub fn unique(&self) -> &str {
        &self.unique
    }

    /// The pseudo-cluster importing Harvester into Rancher.
    pub fn harvester_cluster(&self) -> String {
        format!("{}-harv", self.unique)
    }

    /// The RKE2 guest cluster.
    pub fn rke2_cluster(&self) -> String {
        format!("{}-rke2", self.unique)
    }
}

/// Context provided to checks during execution
#[derive(Clone)]
pub struct CheckContext {
    pub rancher: Arc<RancherClient>,
    pub harvester: Arc<HarvesterClient>,
    pub names: Names,
    pub kubernetes_version: String,
    /// Run-wide default wait budget
    pub wait_timeout: Duration,
    /// Run-wide default poll interval
    pub poll_interval: Duration,
    /// Raised by the runner's watchdog; every poll observes it.
    pub cancel: Arc<AtomicBool>,
}

impl CheckContext {
    /// Poll options for a wait in this check: per-check overrides over the
    /// run-wide defaults, sharing the run's cancel flag.
    pub fn poll_opts(&self, opts: &CheckOptions) -> PollOpts {
        PollOpts::new(
            opts.timeout_or(self.wait_timeout),
            opts.interval_or(self.poll_interval),
        )
        .with_cancel_flag(self.cancel.clone())
    }
}

/// Trait for implementing end-to-end checks
///
/// Checks are registered in the `CHECKS` registry in execution order;
/// later stages depend on the resources earlier stages created.
#[async_trait]
pub trait Check: Send + Sync {
    /// Unique name for this check (used in CLI and config)
    fn name(&self) -> &'static str;

    /// Human-readable description
    fn description(&self) -> &'static str;

    /// Run the check
    async fn run(&self, ctx: &CheckContext, opts: &CheckOptions)
        -> Result<CheckResult, CheckError>;

    /// Default options for this check
    fn default_options(&self) -> CheckOptions {
        CheckOptions::default()
    }
}

/// Convert a poll outcome into the awaited observation, or a descriptive
/// failure carrying the last observed status and body.
pub fn expect_ready(outcome: PollOutcome, what: &str) -> Result<Observation, CheckError> {
    match outcome {
        PollOutcome::Ready(obs) => Ok(obs),
        PollOutcome::Cancelled => Err(CheckError::Cancelled),
        other => Err(CheckError::Failed(format!(
            "waiting for {what}: {}",
            other.describe()
        ))),
    }
}

/// Require a specific status code from a write, or fail the step with the
/// response body in the message.
pub fn expect_status(resp: &ApiResponse, want: u16, what: &str) -> Result<(), CheckError> {
    if resp.code == want {
        Ok(())
    } else {
        Err(CheckError::Failed(format!(
            "{what}: expected status {want}, got {}: {}",
            resp.code, resp.body
        )))
    }
}

/// A check error tagged with the step it occurred in.
#[derive(Debug)]
pub struct StepFailure {
    pub step: String,
    pub error: CheckError,
}

/// Attach a step label to an error, for the per-step result report.
pub trait InStep<T> {
    fn in_step(self, step: &str) -> Result<T, StepFailure>;
}

impl<T, E: Into<CheckError>> InStep<T> for Result<T, E> {
    fn in_step(self, step: &str) -> Result<T, StepFailure> {
        self.map_err(|error| StepFailure {
            step: step.to_string(),
            error: error.into(),
        })
    }
}

/// Common check epilogue: fold the flow outcome into a `CheckResult`,
/// recording the failing step, and keep cancellation a hard error so the
/// runner stops the whole run.
pub fn finish_check(
    name: &str,
    mut steps: Vec<StepResult>,
    duration: Duration,
    flow: Result<String, StepFailure>,
) -> Result<CheckResult, CheckError> {
    match flow {
        Ok(message) => Ok(CheckResult::new(name, steps, duration).with_message(message)),
        Err(failure) => {
            if matches!(failure.error, CheckError::Cancelled) {
                return Err(CheckError::Cancelled);
            }
            tracing::warn!(
                check = name,
                step = %failure.step,
                error = %failure.error,
                "step failed"
            );
            steps.push(StepResult::failed(failure.step, failure.error.to_string()));
            Ok(CheckResult::new(name, steps, duration))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn names_derive_cluster_names() {
        let names = Names::new("ci-417");
        assert_eq!(names.unique(), "ci-417");
        assert_eq!(names.harvester_cluster(), "ci-417-harv");
        assert_eq!(names.rke2_cluster(), "ci-417-rke2");
    }

    #[test]
    fn check_result_passes_only_when_all_steps_pass() {
        let steps = vec![
            StepResult::passed("a"),
            StepResult::failed("b", "boom"),
        ];
        let result = CheckResult::new("test", steps, Duration::from_secs(1));
        assert!(!result.passed);

        let result = CheckResult::new(
            "test",
            vec![StepResult::passed("a")],
            Duration::from_secs(1),
        );
        assert!(result.passed);
    }

    #[test]
    fn expect_ready_maps_outcomes() {
        let ready = PollOutcome::Ready(Observation::new(200, json!({"ok": true})));
        assert!(expect_ready(ready, "cluster").is_ok());

        let timed_out = PollOutcome::TimedOut {
            last: Some(Observation::new(200, json!({"status": {}}))),
            errors: vec![],
        };
        match expect_ready(timed_out, "cluster readiness") {
            Err(CheckError::Failed(msg)) => {
                assert!(msg.contains("cluster readiness"));
                assert!(msg.contains("200"));
            }
            other => panic!("expected Failed, got {other:?}"),
        }

        assert!(matches!(
            expect_ready(PollOutcome::Cancelled, "x"),
            Err(CheckError::Cancelled)
        ));
    }

    #[test]
    fn expect_status_includes_body_on_mismatch() {
        let resp = ApiResponse {
            code: 409,
            body: json!({"message": "already exists"}),
        };
        match expect_status(&resp, 201, "create secret") {
            Err(CheckError::Failed(msg)) => {
                assert!(msg.contains("409"));
                assert!(msg.contains("already exists"));
            }
            other => panic!("expected Failed, got {other:?}"),
        }
        assert!(expect_status(
            &ApiResponse {
                code: 201,
                body: json!({})
            },
            201,
            "create secret"
        )
        .is_ok());
    }

    #[test]
    fn finish_check_records_failing_step() {
        let flow: Result<String, StepFailure> =
            Err(CheckError::Failed("expected status 201, got 409".into()))
                .in_step("create-secret")
                .map(|()| unreachable!());
        let result = finish_check(
            "provision",
            vec![StepResult::passed("create-kubeconfig")],
            Duration::from_secs(2),
            flow,
        )
        .unwrap();

        assert!(!result.passed);
        assert_eq!(result.steps.len(), 2);
        assert_eq!(result.steps[1].step, "create-secret");
        assert!(result.steps[1].error.as_deref().unwrap().contains("409"));
    }

    #[test]
    fn finish_check_propagates_cancellation() {
        let flow: Result<String, StepFailure> =
            Err(CheckError::Cancelled).in_step("await-ready").map(|()| unreachable!());
        assert!(matches!(
            finish_check("import", Vec::new(), Duration::ZERO, flow),
            Err(CheckError::Cancelled)
        ));
    }

    #[test]
    fn options_extra_lookup() {
        let mut extra = HashMap::new();
        extra.insert("vlan".to_string(), json!(7));
        let opts = CheckOptions {
            timeout: None,
            interval: None,
            extra,
        };
        assert_eq!(opts.get_extra::<u16>("vlan"), Some(7));
        assert_eq!(opts.get_extra::<u16>("missing"), None);
    }
}
