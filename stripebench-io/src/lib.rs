//! Parallel range-partitioned file I/O benchmarks.
//!
//! This crate splits an extent of a file into per-worker ranges ([`PartitionPlan`]), moves every
//! range with one of three strategies ([`StrategyKind`]) on its own blocking thread, and derives
//! aggregate and per-storage-target bandwidth from the timings ([`Benchmark`], [`BandwidthReport`]).
//!
//! The stripe layout of files on Lustre is recovered through a [`TopologyProvider`], and processes
//! started by a job launcher find their share of a file through [`JobShard`].
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod buffer;
pub mod direct;
mod engine;
mod error;
pub mod fanout;
pub mod partition;
pub mod pattern;
pub mod shard;
pub mod stats;
pub mod topology;
pub mod transfer;

pub use direct::check_direct_io;
pub use engine::{Benchmark, BenchmarkBuilder, RunReport, SyncPolicy};
pub use error::{Error, Result};
pub use fanout::TaskGroup;
pub use partition::{Assignment, ByteRange, PartitionPlan};
pub use shard::JobShard;
pub use stats::{BandwidthReport, Summary};
pub use topology::{
    LfsTopology, StaticTopology, StorageUnitIndex, StripeLayout, TopologyProvider,
};
pub use transfer::{Mode, StrategyKind, Transfer, TransferResult, TransferStrategy};
