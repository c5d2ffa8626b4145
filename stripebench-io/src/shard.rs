//! Splitting a file between processes started by a job launcher.
//!
//! When several copies of the benchmark are launched together, each process reads only its own
//! shard of the file. The launcher tells every process its rank and the total number of processes
//! through environment variables.

use crate::error::{Error, Result};
use crate::partition::ByteRange;

/// Rank and world size variables, in order of preference.
const LAUNCHER_VARS: &[(&str, &str)] = &[
    ("SLURM_PROCID", "SLURM_NTASKS"),
    ("OMPI_COMM_WORLD_RANK", "OMPI_COMM_WORLD_SIZE"),
    ("PMI_RANK", "PMI_SIZE"),
];

/// The position of this process among all processes of a job.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct JobShard {
    rank: u32,
    world_size: u32,
}

impl JobShard {
    /// A job consisting of this process only.
    pub const fn single() -> Self {
        Self {
            rank: 0,
            world_size: 1,
        }
    }

    /// Creates a shard, checking that `rank` is within `world_size`.
    pub fn new(rank: u32, world_size: u32) -> Result<Self> {
        if world_size == 0 {
            return Err(Error::invalid("world size must be at least 1"));
        }
        if rank >= world_size {
            return Err(Error::invalid(format!(
                "rank {rank} is out of range for a world of size {world_size}"
            )));
        }
        Ok(Self { rank, world_size })
    }

    /// Discovers the shard from the launcher's environment variables.
    ///
    /// Falls back to [`single`](Self::single) if no launcher is detected.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Discovers the shard using `lookup` to resolve variable names.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        for (rank_var, size_var) in LAUNCHER_VARS {
            let Some(rank) = lookup(rank_var) else {
                continue;
            };
            let size = lookup(size_var).ok_or_else(|| {
                Error::invalid(format!("{rank_var} is set but {size_var} is not"))
            })?;

            let shard = Self::new(parse_var(rank_var, &rank)?, parse_var(size_var, &size)?)?;
            tracing::debug!(rank = shard.rank, world_size = shard.world_size, "detected job launcher");
            return Ok(shard);
        }

        Ok(Self::single())
    }

    /// The rank of this process, starting at `0`.
    pub fn rank(&self) -> u32 {
        self.rank
    }

    /// The number of processes in the job.
    pub fn world_size(&self) -> u32 {
        self.world_size
    }

    /// Returns `true` if more than one process shares the file.
    pub fn is_distributed(&self) -> bool {
        self.world_size > 1
    }

    /// The part of a `total`-byte file owned by this process.
    ///
    /// Every rank gets `total / world_size` bytes, the last one also takes the remainder.
    pub fn range(&self, total: u64) -> ByteRange {
        let world = self.world_size as u64;
        let share = total / world;
        let offset = self.rank as u64 * share;
        if self.rank + 1 == self.world_size {
            ByteRange::new(offset, total - offset)
        } else {
            ByteRange::new(offset, share)
        }
    }
}

impl Default for JobShard {
    fn default() -> Self {
        Self::single()
    }
}

/// The number of stripes touched by `len` bytes, rounding up.
pub fn stripes_in(len: u64, stripe_size: u64) -> u64 {
    if stripe_size == 0 {
        return 0;
    }
    len.div_ceil(stripe_size)
}

fn parse_var(name: &str, value: &str) -> Result<u32> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::invalid(format!("invalid value for {name}: {value:?}")))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn defaults_to_single_process() {
        let shard = JobShard::from_lookup(env(&[])).unwrap();
        assert_eq!(shard, JobShard::single());
        assert!(!shard.is_distributed());
    }

    #[test]
    fn reads_slurm_variables() {
        let shard =
            JobShard::from_lookup(env(&[("SLURM_PROCID", "2"), ("SLURM_NTASKS", "4")])).unwrap();
        assert_eq!(shard.rank(), 2);
        assert_eq!(shard.world_size(), 4);
    }

    #[test]
    fn falls_through_to_other_launchers() {
        let shard = JobShard::from_lookup(env(&[("PMI_RANK", "1"), ("PMI_SIZE", "3")])).unwrap();
        assert_eq!(shard, JobShard::new(1, 3).unwrap());
    }

    #[test]
    fn rejects_invalid_variables() {
        let err = JobShard::from_lookup(env(&[("SLURM_PROCID", "x"), ("SLURM_NTASKS", "4")]));
        assert!(matches!(err, Err(Error::InvalidArgument(_))));

        let err = JobShard::from_lookup(env(&[("SLURM_PROCID", "4"), ("SLURM_NTASKS", "4")]));
        assert!(matches!(err, Err(Error::InvalidArgument(_))));

        let err = JobShard::from_lookup(env(&[("SLURM_PROCID", "0")]));
        assert!(matches!(err, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn last_rank_takes_remainder() {
        let ranges: Vec<_> = (0..3)
            .map(|rank| JobShard::new(rank, 3).unwrap().range(100))
            .collect();
        assert_eq!(
            ranges,
            [
                ByteRange::new(0, 33),
                ByteRange::new(33, 33),
                ByteRange::new(66, 34),
            ]
        );
    }

    #[test]
    fn counts_partial_stripes() {
        assert_eq!(stripes_in(0, 1 << 20), 0);
        assert_eq!(stripes_in(1 << 20, 1 << 20), 1);
        assert_eq!(stripes_in((1 << 20) + 1, 1 << 20), 2);
    }
}
