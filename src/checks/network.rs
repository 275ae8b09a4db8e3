//! VLAN network check
//!
//! Creates the VLAN network the RKE2 guest VMs attach to.
//!
//! ## Options
//!
//! - `vlan`: VLAN id for the network (default: 1)

use async_trait::async_trait;
use std::time::Instant;
use tracing::info;

use super::traits::{
    expect_status, finish_check, Check, CheckContext, CheckError, CheckOptions, CheckResult,
    InStep, StepFailure, StepResult,
};

const DEFAULT_VLAN_ID: u16 = 1;

/// VLAN network creation check
pub struct VlanNetworkCheck;

#[async_trait]
impl Check for VlanNetworkCheck {
    fn name(&self) -> &'static str {
        "network"
    }

    fn description(&self) -> &'static str {
        "Create the VLAN network for guest cluster VMs"
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

impl VlanNetworkCheck {
    async fn flow(
        &self,
        ctx: &CheckContext,
        opts: &CheckOptions,
        steps: &mut Vec<StepResult>,
    ) -> Result<String, StepFailure> {
        let name = ctx.names.unique().to_string();
        let vlan_id: u16 = opts.get_extra("vlan").unwrap_or(DEFAULT_VLAN_ID);

        info!(network = %name, vlan = vlan_id, "creating vlan network");
        let resp = ctx
            .harvester
            .networks()
            .create(&name, vlan_id)
            .await
            .in_step("create-network")?;
        expect_status(&resp, 201, "create vlan network").in_step("create-network")?;
        steps.push(
            StepResult::passed("create-network")
                .with_detail("vlan", vlan_id)
                .with_detail("status", resp.code),
        );

        Ok(format!("network {name} created on vlan {vlan_id}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_metadata() {
        let check = VlanNetworkCheck;
        assert_eq!(check.name(), "network");
        assert!(!check.description().is_empty());
    }
}
