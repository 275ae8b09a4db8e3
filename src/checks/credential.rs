//! Cloud credential check
//!
//! Creates the Harvester-driver cloud credential the RKE2 provisioning
//! flow authenticates with.
//!
//! ## Steps
//!
//! 1. Resolve the imported cluster's downstream name
//! 2. Generate a kubeconfig from the Harvester side
//! 3. Create the cloud credential holding it
//! 4. Verify the credential shows up in the listing

use async_trait::async_trait;
use serde_json::Value;
use std::time::Instant;
use tracing::info;

use super::import::cluster_name;
use super::traits::{
    expect_status, finish_check, Check, CheckContext, CheckError, CheckOptions, CheckResult,
    InStep, StepFailure, StepResult,
};

/// Cloud credential creation check
pub struct CloudCredentialCheck;

/// Find a cloud credential by its display name in a v3 collection body,
/// returning its id.
pub(crate) fn find_credential_id<'a>(listing: &'a Value, name: &str) -> Option<&'a str> {
    listing
        .get("data")?
        .as_array()?
        .iter()
        .find(|c| c.get("name").and_then(Value::as_str) == Some(name))?
        .get("id")?
        .as_str()
}

#[async_trait]
impl Check for CloudCredentialCheck {
    fn name(&self) -> &'static str {
        "credential"
    }

    fn description(&self) -> &'static str {
        "Create the Harvester cloud credential"
    }

    async fn run(
        &self,
        ctx: &CheckContext,
        _opts: &CheckOptions,
    ) -> Result<CheckResult, CheckError> {
        let start = Instant::now();
        let mut steps = Vec::new();
        let flow = self.flow(ctx, &mut steps).await;
        finish_check(self.name(), steps, start.elapsed(), flow)
    }
}

impl CloudCredentialCheck {
    async fn flow(
        &self,
        ctx: &CheckContext,
        steps: &mut Vec<StepResult>,
    ) -> Result<String, StepFailure> {
        let harv = ctx.names.harvester_cluster();
        let unique = ctx.names.unique().to_string();

        let resp = ctx
            .rancher
            .mgmt_clusters()
            .get(&harv)
            .await
            .in_step("resolve-cluster")?;
        let downstream = cluster_name(&resp.body)
            .ok_or_else(|| {
                CheckError::Failed(format!(
                    "mgmt cluster {harv} has no clusterName yet (status {}): {}",
                    resp.code, resp.body
                ))
            })
            .in_step("resolve-cluster")?
            .to_string();
        steps.push(StepResult::passed("resolve-cluster").with_detail("cluster_name", &downstream));

        let (code, kubeconfig) = ctx
            .harvester
            .generate_kubeconfig()
            .await
            .in_step("generate-kubeconfig")?;
        if !(200..300).contains(&code) {
            return Err(CheckError::Failed(format!(
                "kubeconfig generation failed with status {code}"
            )))
            .in_step("generate-kubeconfig");
        }
        steps.push(StepResult::passed("generate-kubeconfig"));

        info!(name = %unique, cluster = %downstream, "creating cloud credential");
        let resp = ctx
            .rancher
            .cloud_credentials()
            .create(&unique, &downstream, &kubeconfig)
            .await
            .in_step("create-credential")?;
        expect_status(&resp, 201, "create cloud credential").in_step("create-credential")?;
        steps.push(StepResult::passed("create-credential").with_detail("status", resp.code));

        let listing = ctx
            .rancher
            .cloud_credentials()
            .list()
            .await
            .in_step("verify-credential")?;
        let id = find_credential_id(&listing.body, &unique)
            .ok_or_else(|| {
                CheckError::Failed(format!(
                    "cloud credential {unique} not found in listing: {}",
                    listing.body
                ))
            })
            .in_step("verify-credential")?
            .to_string();
        steps.push(StepResult::passed("verify-credential").with_detail("credential_id", &id));

        Ok(format!("cloud credential {unique} created as {id}"))
    }
}
