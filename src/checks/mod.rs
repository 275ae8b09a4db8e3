//! Check implementations for the Rancher/Harvester e2e flow
//!
//! This module provides the `Check` trait and the checks that together
//! exercise a full Harvester import and RKE2 provisioning cycle.
//!
//! ## Check Stages
//!
//! - **Import**: import (Harvester into Rancher)
//! - **Staging**: credential, network, image
//! - **Provisioning**: provision (RKE2 guest cluster)
//!
//! ## Adding New Checks
//!
//! 1. Create a new file in `src/checks/` (e.g., `mycheck.rs`)
//! 2. Implement the `Check` trait
//! 3. Register in `registry.rs` at the right stage
//! 4. Add to `mod.rs` exports

mod credential;
mod image;
mod import;
mod network;
mod provision;
pub mod registry;
mod traits;

pub use credential::CloudCredentialCheck;
pub use image::ImageUploadCheck;
pub use import::ImportHarvesterCheck;
pub use network::VlanNetworkCheck;
pub use provision::{rke2_cluster_spec, ProvisionRke2Check};
pub use registry::CHECKS;
pub use traits::*;
