//! Configuration parsing
//!
//! YAML run configuration: API endpoints, run-wide naming and wait
//! defaults, per-check overrides.

mod targets;

pub use targets::{CheckConfig, Config, ConfigError, EndpointConfig, RunConfig};
