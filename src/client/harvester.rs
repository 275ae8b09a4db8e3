//! Harvester API client
//!
//! The import and provisioning flows also drive the Harvester side: the
//! registration URL setting, VM images, VLAN networks and cloud-provider
//! kubeconfig generation. Same manager-view pattern as the Rancher client.

use serde_json::{json, Value};

use super::http::{ApiResponse, ClientResult, RestClient};
use super::rancher::DEFAULT_NAMESPACE;
use crate::utils::json::merge;

/// Client for a Harvester cluster's API.
#[derive(Debug, Clone)]
pub struct HarvesterClient {
    rest: RestClient,
}

impl HarvesterClient {
    pub fn new(base_url: &str, token: &str, insecure: bool) -> ClientResult<Self> {
        Ok(Self {
            rest: RestClient::new(base_url, token, insecure)?,
        })
    }

    pub fn base_url(&self) -> &url::Url {
        self.rest.base_url()
    }

    pub fn settings(&self) -> HarvesterSettings<'_> {
        HarvesterSettings { rest: &self.rest }
    }

    pub fn images(&self) -> Images<'_> {
        Images { rest: &self.rest }
    }

    pub fn networks(&self) -> Networks<'_> {
        Networks { rest: &self.rest }
    }

    /// Generate a kubeconfig for reaching this Harvester cluster, used as
    /// the content of the Rancher cloud credential.
    pub async fn generate_kubeconfig(&self) -> ClientResult<(u16, String)> {
        self.rest
            .post_raw("v1/harvester/kubeconfig", &json!({}))
            .await
    }
}

/// harvesterhci.io settings. Updates are read-modify-write: the current
/// object is fetched, the patch merged in, and the result PUT back.
pub struct HarvesterSettings<'a> {
    rest: &'a RestClient,
}

impl HarvesterSettings<'_> {
    fn path(name: &str) -> String {
        format!("v1/harvester/harvesterhci.io.settings/{name}")
    }

    pub async fn get(&self, name: &str) -> ClientResult<ApiResponse> {
        self.rest.get(&Self::path(name)).await
    }

    pub async fn update(&self, name: &str, patch: Value) -> ClientResult<ApiResponse> {
        let current = self.rest.get(&Self::path(name)).await?;
        if !current.is_success() {
            return Ok(current);
        }
        let mut body = current.body;
        merge(&mut body, &patch);
        self.rest.put(&Self::path(name), &body).await
    }
}

/// Virtual machine images (harvesterhci.io VirtualMachineImage).
pub struct Images<'a> {
    rest: &'a RestClient,
}

impl Images<'_> {
    const PATH: &'static str = "v1/harvester/harvesterhci.io.virtualmachineimages";

    fn get_path(name: &str) -> String {
        format!("{}/{DEFAULT_NAMESPACE}/{name}", Self::PATH)
    }

    pub fn create_data(name: &str, url: &str) -> Value {
        json!({
            "apiVersion": "harvesterhci.io/v1beta1",
            "kind": "VirtualMachineImage",
            "metadata": {
                "name": name,
                "namespace": DEFAULT_NAMESPACE,
            },
            "spec": {
                "displayName": name,
                "sourceType": "download",
                "url": url,
            },
        })
    }

    /// Start a download-sourced image import. Completion is asynchronous;
    /// poll `get` until `status.progress` reaches 100.
    pub async fn create_by_url(&self, name: &str, url: &str) -> ClientResult<ApiResponse> {
        self.rest
            .post(Self::PATH, &Self::create_data(name, url))
            .await
    }

    pub async fn get(&self, name: &str) -> ClientResult<ApiResponse> {
        self.rest.get(&Self::get_path(name)).await
    }
}

/// VLAN networks (NetworkAttachmentDefinition on the harvester bridge).
pub struct Networks<'a> {
    rest: &'a RestClient,
}

impl Networks<'_> {
    const PATH: &'static str = "v1/harvester/k8s.cni.cncf.io.network-attachment-definitions";

    pub fn create_data(name: &str, vlan_id: u16) -> Value {
        // The CNI config is carried as an embedded JSON string.
        let config = json!({
            "cniVersion": "0.3.1",
            "name": name,
            "type": "bridge",
            "bridge": "harvester-br0",
            "promiscMode": true,
            "vlan": vlan_id,
            "ipam": {},
        });

        json!({
            "apiVersion": "k8s.cni.cncf.io/v1",
            "kind": "NetworkAttachmentDefinition",
            "metadata": {
                "name": name,
                "namespace": DEFAULT_NAMESPACE,
            },
            "spec": {
                "config": config.to_string(),
            },
        })
    }

    pub async fn create(&self, name: &str, vlan_id: u16) -> ClientResult<ApiResponse> {
        self.rest
            .post(Self::PATH, &Self::create_data(name, vlan_id))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_path() {
        assert_eq!(
            HarvesterSettings::path("cluster-registration-url"),
            "v1/harvester/harvesterhci.io.settings/cluster-registration-url"
        );
    }

    #[test]
    fn image_create_data_shape() {
        let data = Images::create_data("focal", "http://example.com/focal.img");
        assert_eq!(data["kind"], "VirtualMachineImage");
        assert_eq!(data["metadata"]["namespace"], DEFAULT_NAMESPACE);
        assert_eq!(data["spec"]["sourceType"], "download");
        assert_eq!(data["spec"]["url"], "http://example.com/focal.img");
        assert_eq!(data["spec"]["displayName"], "focal");
    }

    #[test]
    fn image_get_path_is_namespaced() {
        assert_eq!(
            Images::get_path("focal"),
            "v1/harvester/harvesterhci.io.virtualmachineimages/default/focal"
        );
    }

    #[test]
    fn network_create_data_embeds_cni_config() {
        let data = Networks::create_data("vlan1", 1);
        assert_eq!(data["kind"], "NetworkAttachmentDefinition");

        let config: Value =
            serde_json::from_str(data["spec"]["config"].as_str().unwrap()).unwrap();
        assert_eq!(config["type"], "bridge");
        assert_eq!(config["bridge"], "harvester-br0");
        assert_eq!(config["vlan"], 1);
        assert_eq!(config["name"], "vlan1");
    }
}
