//! Utility modules for drover
//!
//! Shared primitives used across the client and the checks.

pub mod json;
pub mod poll;

pub use poll::{
    await_condition, await_condition_or_fail, FetchError, Observation, PollOpts, PollOutcome,
};
