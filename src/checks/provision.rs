//! RKE2 provisioning check
//!
//! Provisions an RKE2 guest cluster on the imported Harvester cluster and
//! waits for it to come up.
//!
//! ## Steps
//!
//! 1. Resolve the imported cluster's downstream name
//! 2. Generate the cloud-provider kubeconfig through Rancher
//! 3. Store it as a provisioning-authorized secret
//! 4. Create the Harvester machine config for the node pool
//! 5. Look up the cloud credential created earlier
//! 6. Create the RKE2 provisioning cluster
//! 7. Wait for readiness, failing fast if provisioning stalls
//!
//! ## Options
//!
//! - `cpu_count` / `disk_size` / `memory_size`: VM shape (defaults: 2
//!   cores, 40 GiB disk, 4 GiB memory; string-typed like the node driver
//!   API)
//! - `spec_overrides`: JSON object merged over the generated cluster spec
//! - `timeout`: budget for the readiness wait (default: 30m)

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tracing::info;

use super::credential::find_credential_id;
use super::import::{cluster_name, mgmt_cluster_fetch};
use super::traits::{
    expect_ready, expect_status, finish_check, Check, CheckContext, CheckError, CheckOptions,
    CheckResult, InStep, StepFailure, StepResult,
};
use crate::client::{unescape_kubeconfig, MachineSpec, DEFAULT_NAMESPACE, FLEET_NAMESPACE};
use crate::utils::json::merge;
use crate::utils::poll::await_condition_or_fail;

/// Cloud-init applied to every guest VM: test password login.
const CLOUD_INIT: &str = "\
#cloud-config
password: test
chpasswd:
    expire: false
ssh_pwauth: true
";

/// RKE2 guest cluster provisioning check
pub struct ProvisionRke2Check;

/// `status.ready == true` on the provisioning cluster object.
pub(crate) fn cluster_ready(body: &Value) -> bool {
    body.pointer("/status/ready").and_then(Value::as_bool) == Some(true)
}

/// A `Stalled` condition gone `True` means the provisioning controller
/// gave up; waiting longer cannot succeed.
pub(crate) fn cluster_stalled(body: &Value) -> bool {
    body.pointer("/status/conditions")
        .and_then(Value::as_array)
        .map(|conditions| {
            conditions.iter().any(|c| {
                c.get("type").and_then(Value::as_str) == Some("Stalled")
                    && c.get("status").and_then(Value::as_str) == Some("True")
            })
        })
        .unwrap_or(false)
}

/// Build the provisioning spec for an RKE2 cluster backed by Harvester
/// machine pools, mirroring what the Rancher UI submits.
pub fn rke2_cluster_spec(
    cluster_name: &str,
    machine_config_name: &str,
    kubernetes_version: &str,
    credential_id: &str,
) -> Value {
    json!({
        "rkeConfig": {
            "chartValues": {
                "rke2-calico": {},
                "harvester-cloud-provider": {
                    "clusterName": cluster_name,
                    "cloudConfigPath": "/var/lib/rancher/rke2/etc/config-files/cloud-provider-config",
                },
            },
            "upgradeStrategy": {
                "controlPlaneConcurrency": "1",
                "controlPlaneDrainOptions": drain_options(),
                "workerConcurrency": "1",
                "workerDrainOptions": drain_options(),
            },
            "machineGlobalConfig": {
                "cni": "calico",
                "disable-kube-proxy": false,
                "etcd-expose-metrics": false,
                "profile": null,
            },
            "machineSelectorConfig": [
                {
                    "config": {
                        "cloud-provider-config":
                            format!("secret://{FLEET_NAMESPACE}:{machine_config_name}"),
                        "cloud-provider-name": "harvester",
                        "protect-kernel-defaults": false,
                    },
                },
            ],
            "etcd": {
                "disableSnapshots": false,
                "s3": null,
                "snapshotRetention": 5,
                "snapshotScheduleCron": "0 */5 * * *",
            },
            "registries": {
                "configs": {},
                "mirrors": {},
            },
            "machinePools": [
                {
                    "name": "pool1",
                    "etcdRole": true,
                    "controlPlaneRole": true,
                    "workerRole": true,
                    "hostnamePrefix": format!("{machine_config_name}-"),
                    "labels": {},
                    "quantity": 1,
                    "unhealthyNodeTimeout": "0m",
                    "machineConfigRef": {
                        "kind": "HarvesterConfig",
                        "name": machine_config_name,
                    },
                },
            ],
        },
        "machineSelectorConfig": [
            {"config": {}},
        ],
        "kubernetesVersion": kubernetes_version,
        "defaultPodSecurityPolicyTemplateName": "",
        "cloudCredentialSecretName": credential_id,
        "localClusterAuthEndpoint": {
            "enabled": false,
            "caCerts": "",
            "fqdn": "",
        },
    })
}

fn drain_options() -> Value {
    json!({
        "deleteEmptyDirData": true,
        "disableEviction": false,
        "enabled": false,
        "force": false,
        "gracePeriod": -1,
        "ignoreDaemonSets": true,
        "ignoreErrors": false,
        "skipWaitForDeleteTimeoutSeconds": 0,
        "timeout": 120,
    })
}

#[async_trait]
impl Check for ProvisionRke2Check {
    fn name(&self) -> &'static str {
        "provision"
    }

    fn description(&self) -> &'static str {
        "Provision an RKE2 guest cluster on Harvester"
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

    fn default_options(&self) -> CheckOptions {
        CheckOptions {
            timeout: Some(Duration::from_secs(1800)),
            interval: None,
            extra: Default::default(),
        }
    }
}

impl ProvisionRke2Check {
    async fn flow(
        &self,
        ctx: &CheckContext,
        opts: &CheckOptions,
        steps: &mut Vec<StepResult>,
    ) -> Result<String, StepFailure> {
        let unique = ctx.names.unique().to_string();
        let rke2 = ctx.names.rke2_cluster();
        let harv = ctx.names.harvester_cluster();

        let resp = ctx
            .rancher
            .mgmt_clusters()
            .get(&harv)
            .await
            .in_step("resolve-cluster")?;
        let downstream = cluster_name(&resp.body)
            .ok_or_else(|| {
                CheckError::Failed(format!(
                    "mgmt cluster {harv} has no clusterName (status {}): {}",
                    resp.code, resp.body
                ))
            })
            .in_step("resolve-cluster")?
            .to_string();
        steps.push(StepResult::passed("resolve-cluster").with_detail("cluster_name", &downstream));

        let (code, raw) = ctx
            .rancher
            .kube_configs()
            .create(&rke2, &downstream)
            .await
            .in_step("create-kubeconfig")?;
        if code != 200 {
            return Err(CheckError::Failed(format!(
                "kubeconfig generation failed with status {code}: {raw}"
            )))
            .in_step("create-kubeconfig");
        }
        let kubeconfig = unescape_kubeconfig(&raw);
        steps.push(StepResult::passed("create-kubeconfig"));

        let resp = ctx
            .rancher
            .secrets()
            .create(
                &unique,
                FLEET_NAMESPACE,
                json!({"credential": BASE64.encode(kubeconfig.as_bytes())}),
                json!({
                    "v2prov-secret-authorized-for-cluster": rke2,
                    "v2prov-authorized-secret-deletes-on-cluster-removal": "true",
                }),
            )
            .await
            .in_step("create-secret")?;
        expect_status(&resp, 201, "create cloud-provider secret").in_step("create-secret")?;
        steps.push(StepResult::passed("create-secret"));

        let machine = MachineSpec {
            cpu_count: opts.get_extra("cpu_count").unwrap_or_else(|| "2".into()),
            disk_size: opts.get_extra("disk_size").unwrap_or_else(|| "40".into()),
            memory_size: opts.get_extra("memory_size").unwrap_or_else(|| "4".into()),
            image_name: format!("{DEFAULT_NAMESPACE}/{unique}"),
            network_name: unique.clone(),
            user_data: BASE64.encode(CLOUD_INIT.as_bytes()),
        };
        let resp = ctx
            .rancher
            .harvester_configs()
            .create(&unique, &machine)
            .await
            .in_step("create-machine-config")?;
        expect_status(&resp, 201, "create machine config").in_step("create-machine-config")?;
        steps.push(StepResult::passed("create-machine-config"));

        let listing = ctx
            .rancher
            .cloud_credentials()
            .list()
            .await
            .in_step("find-credential")?;
        let credential_id = find_credential_id(&listing.body, &unique)
            .ok_or_else(|| {
                CheckError::Failed(format!("cloud credential {unique} not found in listing"))
            })
            .in_step("find-credential")?
            .to_string();
        steps.push(
            StepResult::passed("find-credential").with_detail("credential_id", &credential_id),
        );

        let mut spec = rke2_cluster_spec(&rke2, &unique, &ctx.kubernetes_version, &credential_id);
        if let Some(overrides) = opts.get_extra::<Value>("spec_overrides") {
            merge(&mut spec, &overrides);
        }

        info!(cluster = %rke2, version = %ctx.kubernetes_version, "creating rke2 cluster");
        let resp = ctx
            .rancher
            .mgmt_clusters()
            .create(&rke2, spec, json!({}))
            .await
            .in_step("create-cluster")?;
        expect_status(&resp, 201, "create rke2 cluster").in_step("create-cluster")?;
        steps.push(StepResult::passed("create-cluster").with_detail("status", resp.code));

        let outcome = await_condition_or_fail(
            mgmt_cluster_fetch(ctx.rancher.clone(), rke2.clone()),
            |_, body| cluster_ready(body),
            |_, body| cluster_stalled(body),
            ctx.poll_opts(opts),
        )
        .await
        .in_step("await-provisioned")?;
        expect_ready(outcome, "rke2 cluster readiness").in_step("await-provisioned")?;
        steps.push(StepResult::passed("await-provisioned"));

        info!(cluster = %rke2, "rke2 cluster provisioned");
        Ok(format!("{rke2} provisioned on {harv}"))
    }
}
