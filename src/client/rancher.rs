//! Rancher management API client
//!
//! Thin typed wrappers over the Rancher REST surface used for importing a
//! Harvester cluster and provisioning RKE2 guest clusters on top of it.
//! Each resource family gets a manager view carrying its path constants
//! and payload builders; request plumbing lives in [`RestClient`].
//!
//! Paths mix Rancher's Steve (`v1/...`), Norman (`v3/...`) and plain
//! Kubernetes aggregated (`apis/...`) endpoints, matching what the Rancher
//! UI itself calls for these flows.

use serde_json::{json, Value};

use super::http::{ApiResponse, ClientResult, RestClient};

/// Namespace Harvester resources (VMs, images, networks) live in.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Namespace Rancher's provisioning objects live in.
pub const FLEET_NAMESPACE: &str = "fleet-default";

/// Client for a Rancher management server.
#[derive(Debug, Clone)]
pub struct RancherClient {
    rest: RestClient,
}

impl RancherClient {
    pub fn new(base_url: &str, token: &str, insecure: bool) -> ClientResult<Self> {
        Ok(Self {
            rest: RestClient::new(base_url, token, insecure)?,
        })
    }

    pub fn base_url(&self) -> &url::Url {
        self.rest.base_url()
    }

    pub fn mgmt_clusters(&self) -> MgmtClusters<'_> {
        MgmtClusters { rest: &self.rest }
    }

    pub fn cluster_registration_tokens(&self) -> ClusterRegistrationTokens<'_> {
        ClusterRegistrationTokens { rest: &self.rest }
    }

    pub fn cloud_credentials(&self) -> CloudCredentials<'_> {
        CloudCredentials { rest: &self.rest }
    }

    pub fn kube_configs(&self) -> KubeConfigs<'_> {
        KubeConfigs { rest: &self.rest }
    }

    pub fn secrets(&self) -> Secrets<'_> {
        Secrets { rest: &self.rest }
    }

    pub fn harvester_configs(&self) -> HarvesterConfigs<'_> {
        HarvesterConfigs { rest: &self.rest }
    }

    pub fn settings(&self) -> Settings<'_> {
        Settings { rest: &self.rest }
    }
}

/// provisioning.cattle.io clusters: both the pseudo-cluster created to
/// import Harvester and the RKE2 guest cluster definition.
pub struct MgmtClusters<'a> {
    rest: &'a RestClient,
}

impl MgmtClusters<'_> {
    const CREATE_PATH: &'static str = "v1/provisioning.cattle.io.clusters";

    fn get_path(name: &str) -> String {
        format!("apis/provisioning.cattle.io/v1/namespaces/{FLEET_NAMESPACE}/clusters/{name}")
    }

    fn delete_path(name: &str) -> String {
        format!("v1/provisioning.cattle.io.clusters/{FLEET_NAMESPACE}/{name}")
    }

    pub fn create_data(name: &str, spec: Value, labels: Value) -> Value {
        json!({
            "type": "provisioning.cattle.io.cluster",
            "metadata": {
                "namespace": FLEET_NAMESPACE,
                "labels": labels,
                "name": name,
            },
            "spec": spec,
        })
    }

    pub async fn create(&self, name: &str, spec: Value, labels: Value) -> ClientResult<ApiResponse> {
        self.rest
            .post(Self::CREATE_PATH, &Self::create_data(name, spec, labels))
            .await
    }

    pub async fn get(&self, name: &str) -> ClientResult<ApiResponse> {
        self.rest.get(&Self::get_path(name)).await
    }

    pub async fn delete(&self, name: &str) -> ClientResult<ApiResponse> {
        self.rest.delete(&Self::delete_path(name)).await
    }
}

/// Registration tokens minted by Rancher for an imported cluster; the
/// token's `manifestUrl` is what the downstream cluster has to apply.
pub struct ClusterRegistrationTokens<'a> {
    rest: &'a RestClient,
}

impl ClusterRegistrationTokens<'_> {
    fn get_path(cluster_id: &str) -> String {
        format!("v3/clusterRegistrationTokens/{cluster_id}:default-token")
    }

    pub async fn get(&self, cluster_id: &str) -> ClientResult<ApiResponse> {
        self.rest.get(&Self::get_path(cluster_id)).await
    }
}

/// Harvester-driver cloud credentials holding the kubeconfig Rancher uses
/// to reach the imported Harvester cluster.
pub struct CloudCredentials<'a> {
    rest: &'a RestClient,
}

impl CloudCredentials<'_> {
    const PATH: &'static str = "v3/cloudcredentials";

    pub fn create_data(name: &str, cluster_id: &str, kubeconfig: &str) -> Value {
        json!({
            "type": "provisioning.cattle.io/cloud-credential",
            "metadata": {
                "generateName": "cc-",
                "namespace": FLEET_NAMESPACE,
            },
            "_name": name,
            "annotations": {
                "provisioning.cattle.io/driver": "harvester",
            },
            "harvestercredentialConfig": {
                "clusterType": "imported",
                "clusterId": cluster_id,
                "kubeconfigContent": kubeconfig,
            },
            "_type": "provisioning.cattle.io/cloud-credential",
            "name": name,
        })
    }

    pub async fn create(
        &self,
        name: &str,
        cluster_id: &str,
        kubeconfig: &str,
    ) -> ClientResult<ApiResponse> {
        self.rest
            .post(Self::PATH, &Self::create_data(name, cluster_id, kubeconfig))
            .await
    }

    pub async fn list(&self) -> ClientResult<ApiResponse> {
        self.rest.get(Self::PATH).await
    }
}

/// Kubeconfig generation for the Harvester cloud provider running inside
/// a guest cluster.
pub struct KubeConfigs<'a> {
    rest: &'a RestClient,
}

impl KubeConfigs<'_> {
    fn create_path(cluster_id: &str) -> String {
        format!("k8s/clusters/{cluster_id}/v1/harvester/kubeconfig")
    }

    pub fn create_data(service_account: &str) -> Value {
        json!({
            "clusterRoleName": "harvesterhci.io:cloudprovider",
            "namespace": DEFAULT_NAMESPACE,
            "serviceAccountName": service_account,
        })
    }

    /// Returns the raw response text: the endpoint answers with a
    /// JSON-quoted YAML document, not a JSON object. See
    /// [`unescape_kubeconfig`] for turning it into usable YAML.
    pub async fn create(
        &self,
        service_account: &str,
        cluster_id: &str,
    ) -> ClientResult<(u16, String)> {
        self.rest
            .post_raw(
                &Self::create_path(cluster_id),
                &Self::create_data(service_account),
            )
            .await
    }
}

/// Strip the surrounding quotes and unescape the newlines of a kubeconfig
/// returned as a JSON-quoted string.
pub fn unescape_kubeconfig(raw: &str) -> String {
    let unescaped = raw.replace("\\n", "\n");
    let trimmed = unescaped.trim();
    trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(trimmed)
        .to_string()
}

/// Plain Kubernetes secrets, used to hand the generated kubeconfig to the
/// RKE2 provisioning machinery.
pub struct Secrets<'a> {
    rest: &'a RestClient,
}

impl Secrets<'_> {
    const PATH: &'static str = "v1/secrets";

    pub fn create_data(name: &str, namespace: &str, data: Value, annotations: Value) -> Value {
        json!({
            "type": "secret",
            "metadata": {
                "namespace": namespace,
                "name": name,
                "annotations": annotations,
            },
            "data": data,
        })
    }

    pub async fn create(
        &self,
        name: &str,
        namespace: &str,
        data: Value,
        annotations: Value,
    ) -> ClientResult<ApiResponse> {
        self.rest
            .post(Self::PATH, &Self::create_data(name, namespace, data, annotations))
            .await
    }
}

/// Node-driver machine configs (rke-machine-config.cattle.io) describing
/// the Harvester VMs backing an RKE2 machine pool.
pub struct HarvesterConfigs<'a> {
    rest: &'a RestClient,
}

/// VM shape for a Harvester machine config. Sizes are strings because the
/// node driver API takes them that way (cpu in cores, disk and memory in
/// gigabytes).
#[derive(Debug, Clone)]
pub struct MachineSpec {
    pub cpu_count: String,
    pub disk_size: String,
    pub memory_size: String,
    pub image_name: String,
    pub network_name: String,
    pub user_data: String,
}

impl HarvesterConfigs<'_> {
    const PATH: &'static str = "v1/rke-machine-config.cattle.io.harvesterconfigs/fleet-default";

    pub fn create_data(name: &str, spec: &MachineSpec) -> Value {
        json!({
            "cpuCount": spec.cpu_count,
            "diskSize": spec.disk_size,
            "imageName": spec.image_name,
            "memorySize": spec.memory_size,
            "metadata": {
                "name": name,
                "namespace": FLEET_NAMESPACE,
            },
            "networkName": spec.network_name,
            "sshUser": "ubuntu",
            "userData": spec.user_data,
            "vmNamespace": DEFAULT_NAMESPACE,
            "type": "rke-machine-config.cattle.io.harvesterconfig",
        })
    }

    pub async fn create(&self, name: &str, spec: &MachineSpec) -> ClientResult<ApiResponse> {
        self.rest
            .post(Self::PATH, &Self::create_data(name, spec))
            .await
    }
}

/// management.cattle.io settings, read-only here (server-version probe).
pub struct Settings<'a> {
    rest: &'a RestClient,
}

impl Settings<'_> {
    fn get_path(name: &str) -> String {
        format!("apis/management.cattle.io/v3/settings/{name}")
    }

    pub async fn get(&self, name: &str) -> ClientResult<ApiResponse> {
        self.rest.get(&Self::get_path(name)).await
    }
}
