//! Drover - Rancher/Harvester e2e Test Client
//!
//! Drover herds a Harvester cluster into Rancher and provisions an RKE2
//! guest cluster on top of it, verifying every stage along the way.
//!
//! ## Architecture
//!
//! The run is a sequence of dependent checks: import the Harvester cluster,
//! stage the cloud credential, VLAN network and VM image, then provision
//! the guest cluster. Every wait goes through one shared poll primitive
//! with a fixed timing contract ([`utils::poll`]).
//!
//! ## Modules
//!
//! - [`client`] - HTTP clients for the Rancher and Harvester APIs
//! - `checks` - Check implementations (import, credential, network, image, provision)
//! - `config` - Configuration parsing (endpoints, run settings, per-check overrides)
//! - `utils` - The poll primitive and JSON helpers

pub mod checks;
pub mod client;
pub mod config;
pub mod utils;
