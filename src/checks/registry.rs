//! Check registry
//!
//! Central registry of all available checks. New checks should be registered here.
//!
//! ## Check Ordering
//!
//! Checks are registered in dependency order and the runner executes them
//! sequentially:
//! 1. **import** makes the Harvester cluster known to Rancher; everything
//!    else targets it.
//! 2. **credential**, **network**, **image** stage the pieces provisioning
//!    consumes (cloud credential, guest VLAN, VM image).
//! 3. **provision** builds the RKE2 guest cluster from those pieces.
//!
//! Running a later check without its predecessors against a fresh setup
//! will fail on missing resources.

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use std::sync::Arc;

use super::traits::Check;
use super::{
    CloudCredentialCheck, ImageUploadCheck, ImportHarvesterCheck, ProvisionRke2Check,
    VlanNetworkCheck,
};

/// Global registry of all available checks
///
/// Uses IndexMap to preserve insertion order; the runner walks this map in
/// order, so registration order IS execution order.
pub static CHECKS: Lazy<IndexMap<&'static str, Arc<dyn Check>>> = Lazy::new(|| {
    let mut m: IndexMap<&'static str, Arc<dyn Check>> = IndexMap::new();

    // Stage 1: make the Harvester cluster visible to Rancher
    m.insert("import", Arc::new(ImportHarvesterCheck));

    // Stage 2: resources the provisioning flow consumes
    m.insert("credential", Arc::new(CloudCredentialCheck));
    m.insert("network", Arc::new(VlanNetworkCheck));
    m.insert("image", Arc::new(ImageUploadCheck));

    // Stage 3: the actual guest cluster
    m.insert("provision", Arc::new(ProvisionRke2Check));

    m
});

/// Get a check by name
pub fn get_check(name: &str) -> Option<Arc<dyn Check>> {
    CHECKS.get(name).cloned()
}

/// List all available check names in execution order
pub fn list_checks() -> Vec<&'static str> {
    CHECKS.keys().copied().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_checks_registered() {
        for name in ["import", "credential", "network", "image", "provision"] {
            assert!(CHECKS.contains_key(name), "{name} missing from registry");
        }
    }

    #[test]
    fn registry_keys_match_check_names() {
        for (key, check) in CHECKS.iter() {
            assert_eq!(*key, check.name());
        }
    }

    #[test]
    fn execution_order_is_dependency_order() {
        let names = list_checks();
        assert_eq!(
            names,
            vec!["import", "credential", "network", "image", "provision"]
        );
    }

    #[test]
    fn get_check_by_name() {
        let check = get_check("import");
        assert!(check.is_some());
        assert_eq!(check.unwrap().name(), "import");

        assert!(get_check("nonexistent").is_none());
    }
}
