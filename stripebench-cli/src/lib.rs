//! Command line front end of the stripebench tools.
//!
//! Wires configuration, logging and the async runtime around the benchmarks in
//! [`stripebench_io`] and the uploader in [`stripebench_upload`].

pub mod cli;
pub mod config;
pub mod observability;
pub mod output;
