//! Test utilities for the stripebench crates.
//!
//! This crate provides utilities to facilitate testing the benchmarks and the uploader. See the
//! modules for all available utilities.

pub mod fixtures;
pub mod store;
pub mod tracing;
