//! Drover Test Kit
//!
//! Test infrastructure for drover: scripted fetch sequences and canned
//! Rancher/Harvester resource bodies.
//!
//! This crate provides:
//! - [`script::Script`] - a queue of scripted responses with call counting,
//!   for driving polls through a fixed sequence of observations
//! - [`bodies`] - canned JSON bodies shaped like the real API objects
//!
//! # Example
//!
//! ```rust
//! use drover_testkit::script::{Script, Scripted};
//! use drover_testkit::bodies;
//!
//! let script = Script::new(vec![
//!     Scripted::body(200, bodies::cluster_pending()),
//!     Scripted::body(200, bodies::cluster_ready()),
//! ]);
//!
//! assert!(matches!(script.next(), Scripted::Body(200, _)));
//! assert_eq!(script.calls(), 1);
//! ```

pub mod bodies;
pub mod script;

pub use script::{Script, Scripted};
