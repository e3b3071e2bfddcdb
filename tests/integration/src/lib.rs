//! End-to-end tests for the switchyard control plane.
//!
//! Run with: `cargo test --package switchyard-integration-tests`

#[cfg(test)]
mod load_tests;
#[cfg(test)]
mod pipeline_tests;
#[cfg(test)]
mod scenario_tests;
