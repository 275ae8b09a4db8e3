//! Harvester import check
//!
//! Imports the Harvester cluster into Rancher and waits until Rancher
//! reports it ready.
//!
//! ## Steps
//!
//! 1. Create the provisioning.cattle.io pseudo-cluster labelled as a
//!    Harvester provider
//! 2. Wait for Rancher to assign `status.clusterName`
//! 3. Wait for the cluster registration token's `manifestUrl`
//! 4. Push the manifest URL into Harvester's `cluster-registration-url`
//!    setting
//! 5. Wait for `status.ready`
//!
//! ## Options
//!
//! - `timeout`: budget per wait (default: run-wide `wait_timeout`)
//! - `interval`: poll delay (default: run-wide `poll_interval`)

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use super::traits::{
    expect_ready, expect_status, finish_check, Check, CheckContext, CheckError, CheckOptions,
    CheckResult, InStep, StepFailure, StepResult,
};
use crate::client::RancherClient;
use crate::utils::poll::{await_condition, FetchError, FetchFuture, Observation};

/// Harvester-to-Rancher import check
pub struct ImportHarvesterCheck;

/// Fetch closure for a provisioning cluster object, shared with the
/// provisioning check.
pub(crate) fn mgmt_cluster_fetch(
    rancher: Arc<RancherClient>,
    name: String,
) -> impl FnMut() -> FetchFuture {
    move || {
        let rancher = rancher.clone();
        let name = name.clone();
        Box::pin(async move {
            rancher
                .mgmt_clusters()
                .get(&name)
                .await
                .map(Observation::from)
                .map_err(FetchError::from)
        })
    }
}

/// Read `status.clusterName` from a provisioning cluster body. Absent
/// means Rancher has not assigned the downstream cluster yet.
pub(crate) fn cluster_name(body: &Value) -> Option<&str> {
    body.pointer("/status/clusterName").and_then(Value::as_str)
}

#[async_trait]
impl Check for ImportHarvesterCheck {
    fn name(&self) -> &'static str {
        "import"
    }

    fn description(&self) -> &'static str {
        "Import the Harvester cluster into Rancher"
    }

    async fn run(
        &self,
        ctx: &CheckContext,
        opts: &CheckOptions,
    ) -> Result<CheckResult, CheckError> {
        let start = Instant::now();
        let mut steps = Vec::new();
        let flow = self.flow(ctx, opts, &mut steps).await;
        finish_check(self.name(), steps, start.elapsed(), flow)
    }
}

impl ImportHarvesterCheck {
    async fn flow(
        &self,
        ctx: &CheckContext,
        opts: &CheckOptions,
        steps: &mut Vec<StepResult>,
    ) -> Result<String, StepFailure> {
        let poll = ctx.poll_opts(opts);
        let harv = ctx.names.harvester_cluster();

        // Best-effort version probe, diagnostic only.
        if let Ok(resp) = ctx.rancher.settings().get("server-version").await {
            debug!(version = ?resp.body.get("value"), "rancher server version");
        }

        info!(cluster = %harv, "creating mgmt cluster for harvester import");
        let resp = ctx
            .rancher
            .mgmt_clusters()
            .create(&harv, json!({}), json!({"provider.cattle.io": "harvester"}))
            .await
            .in_step("create-mgmt-cluster")?;
        expect_status(&resp, 201, "create mgmt cluster").in_step("create-mgmt-cluster")?;
        steps.push(StepResult::passed("create-mgmt-cluster").with_detail("status", resp.code));

        // Missing clusterName reads as not-assigned-yet, not as an error.
        let outcome = await_condition(
            mgmt_cluster_fetch(ctx.rancher.clone(), harv.clone()),
            |_, body| cluster_name(body).is_some(),
            poll.clone(),
        )
        .await
        .in_step("await-cluster-name")?;
        let obs = expect_ready(outcome, "mgmt cluster clusterName").in_step("await-cluster-name")?;
        let downstream = cluster_name(&obs.body)
            .ok_or_else(|| CheckError::Failed("clusterName vanished from ready body".into()))
            .in_step("await-cluster-name")?
            .to_string();
        steps.push(
            StepResult::passed("await-cluster-name").with_detail("cluster_name", &downstream),
        );
        info!(cluster = %harv, downstream = %downstream, "downstream cluster assigned");

        // Token bodies without a manifestUrl read as not-minted-yet.
        let rancher = ctx.rancher.clone();
        let token_cluster = downstream.clone();
        let outcome = await_condition(
            move || {
                let rancher = rancher.clone();
                let cluster = token_cluster.clone();
                Box::pin(async move {
                    rancher
                        .cluster_registration_tokens()
                        .get(&cluster)
                        .await
                        .map(Observation::from)
                        .map_err(FetchError::from)
                }) as FetchFuture
            },
            |code, body| {
                code == 200
                    && body
                        .get("manifestUrl")
                        .and_then(Value::as_str)
                        .is_some_and(|u| !u.is_empty())
            },
            poll.clone(),
        )
        .await
        .in_step("await-registration-token")?;
        let obs =
            expect_ready(outcome, "registration token manifestUrl").in_step("await-registration-token")?;
        let manifest_url = obs.body["manifestUrl"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        steps.push(
            StepResult::passed("await-registration-token")
                .with_detail("manifest_url", &manifest_url),
        );

        info!(url = %manifest_url, "registering harvester against rancher");
        let resp = ctx
            .harvester
            .settings()
            .update("cluster-registration-url", json!({"value": manifest_url}))
            .await
            .in_step("update-registration-url")?;
        expect_status(&resp, 200, "update cluster-registration-url")
            .in_step("update-registration-url")?;
        steps.push(StepResult::passed("update-registration-url"));

        let outcome = await_condition(
            mgmt_cluster_fetch(ctx.rancher.clone(), harv.clone()),
            |_, body| body.pointer("/status/ready").and_then(Value::as_bool) == Some(true),
            poll,
        )
        .await
        .in_step("await-ready")?;
        expect_ready(outcome, "mgmt cluster readiness").in_step("await-ready")?;
        steps.push(StepResult::passed("await-ready"));

        info!(cluster = %harv, "harvester import complete");
        Ok(format!("{harv} imported and ready (downstream {downstream})"))
    }
}
