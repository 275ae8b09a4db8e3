//! HTTP clients for the Rancher and Harvester APIs
//!
//! - [`http`] - shared token-authenticated REST plumbing
//! - [`rancher`] - Rancher management API (clusters, credentials, secrets,
//!   kubeconfigs, machine configs, settings)
//! - [`harvester`] - Harvester API (settings, images, networks, kubeconfig
//!   generation)

pub mod harvester;
pub mod http;
pub mod rancher;

pub use harvester::HarvesterClient;
pub use http::{ApiResponse, ClientError, ClientResult, RestClient};
pub use rancher::{
    unescape_kubeconfig, MachineSpec, RancherClient, DEFAULT_NAMESPACE, FLEET_NAMESPACE,
};
