//! Canned resource bodies
//!
//! JSON bodies shaped like the Rancher and Harvester API objects the
//! checks poll: provisioning clusters in their various phases,
//! registration tokens, and VM images mid-import. Only the fields the
//! readiness predicates read are populated.

use serde_json::{json, Value};

/// A provisioning cluster Rancher has accepted but not yet wired to a
/// downstream cluster.
pub fn cluster_pending() -> Value {
    json!({
        "metadata": {"name": "test-harv", "namespace": "fleet-default"},
        "status": {"ready": false}
    })
}

/// A provisioning cluster with its downstream cluster assigned.
pub fn cluster_named() -> Value {
    json!({
        "metadata": {"name": "test-harv", "namespace": "fleet-default"},
        "status": {"clusterName": "c-m-abc123", "ready": false}
    })
}

/// A fully ready provisioning cluster.
pub fn cluster_ready() -> Value {
    json!({
        "metadata": {"name": "test-harv", "namespace": "fleet-default"},
        "status": {"clusterName": "c-m-abc123", "ready": true}
    })
}

/// A provisioning cluster whose controller has given up.
pub fn cluster_stalled() -> Value {
    json!({
        "metadata": {"name": "test-rke2", "namespace": "fleet-default"},
        "status": {
            "ready": false,
            "conditions": [
                {"type": "Stalled", "status": "True", "message": "insufficient quota"}
            ]
        }
    })
}

/// A minted cluster registration token.
pub fn registration_token() -> Value {
    json!({
        "id": "c-m-abc123:default-token",
        "clusterId": "c-m-abc123",
        "manifestUrl": "https://rancher.local/v3/import/abcdef.yaml"
    })
}

/// A registration token Rancher has created but not yet minted.
pub fn registration_token_pending() -> Value {
    json!({
        "id": "c-m-abc123:default-token",
        "clusterId": "c-m-abc123",
        "manifestUrl": ""
    })
}

/// A VM image part way through its download.
pub fn image_progress(progress: u64) -> Value {
    json!({
        "metadata": {"name": "test-image", "namespace": "default"},
        "status": {
            "progress": progress,
            "conditions": [
                {"type": "Imported", "status": "Unknown", "reason": "Importing"}
            ]
        }
    })
}

/// A VM image whose import failed terminally.
pub fn image_failed() -> Value {
    json!({
        "metadata": {"name": "test-image", "namespace": "default"},
        "status": {
            "progress": 30,
            "conditions": [
                {"type": "Imported", "status": "False", "reason": "ImportFailed",
                 "message": "404 from upstream"}
            ]
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cluster_phases_are_distinct() {
        assert_eq!(cluster_pending()["status"].get("clusterName"), None);
        assert_eq!(cluster_named()["status"]["clusterName"], "c-m-abc123");
        assert_eq!(cluster_ready()["status"]["ready"], true);
        assert_eq!(
            cluster_stalled()["status"]["conditions"][0]["type"],
            "Stalled"
        );
    }

    #[test]
    fn image_progress_carries_value() {
        assert_eq!(image_progress(80)["status"]["progress"], 80);
        assert_eq!(
            image_failed()["status"]["conditions"][0]["reason"],
            "ImportFailed"
        );
    }
}
