//! Stripe layout of files on a striped filesystem.
//!
//! The benchmark only needs three facts about a file: its stripe size, its stripe count and the
//! storage target holding each stripe. [`LfsTopology`] recovers them from the `lfs getstripe`
//! command, [`StaticTopology`] returns a fixed layout for filesystems that are not striped.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::partition::ByteRange;
use crate::shard;

/// The index of a storage target (OST) holding stripes of a file.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct StorageUnitIndex(pub u32);

impl fmt::Display for StorageUnitIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// How a file is striped across storage targets.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StripeLayout {
    stripe_size: u64,
    stripe_count: u32,
    unit_indices: Vec<StorageUnitIndex>,
}

impl StripeLayout {
    /// Creates a layout, checking that there is one unit index per stripe.
    pub fn new(
        stripe_size: u64,
        stripe_count: u32,
        unit_indices: Vec<StorageUnitIndex>,
    ) -> Result<Self> {
        if stripe_size == 0 {
            return Err(Error::Topology("stripe size is zero".into()));
        }
        if stripe_count == 0 {
            return Err(Error::Topology("stripe count is zero".into()));
        }
        if unit_indices.len() != stripe_count as usize {
            return Err(Error::Topology(format!(
                "expected {stripe_count} storage targets, found {}",
                unit_indices.len()
            )));
        }

        Ok(Self {
            stripe_size,
            stripe_count,
            unit_indices,
        })
    }

    /// Size of a single stripe in bytes.
    pub fn stripe_size(&self) -> u64 {
        self.stripe_size
    }

    /// Number of stripes per stripe row.
    pub fn stripe_count(&self) -> u32 {
        self.stripe_count
    }

    /// The storage target of every stripe, in stripe order.
    pub fn unit_indices(&self) -> &[StorageUnitIndex] {
        &self.unit_indices
    }

    /// The storage targets of the stripes touched by `range`, in file order.
    ///
    /// Stripes are assigned to targets round-robin, so a range starting in the middle of the file
    /// starts in the middle of the target list.
    pub fn units_for(&self, range: ByteRange) -> Vec<StorageUnitIndex> {
        let first = range.offset / self.stripe_size;
        let count = shard::stripes_in(range.length, self.stripe_size);
        (first..first + count)
            .map(|stripe| self.unit_indices[(stripe % self.stripe_count as u64) as usize])
            .collect()
    }
}

/// Looks up the stripe layout of a path.
pub trait TopologyProvider: fmt::Debug + Send + Sync {
    /// Returns the layout of `path`, failing with [`Error::Topology`] if it has none.
    fn layout(&self, path: &Path) -> Result<StripeLayout>;
}

/// Queries layouts by running `lfs getstripe`.
#[derive(Clone, Debug)]
pub struct LfsTopology {
    command: PathBuf,
}

impl LfsTopology {
    /// Uses the `lfs` binary found at `command`.
    pub fn new(command: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl LfsTopology {
    /// Creates an empty file at `path` striped over `stripe_count` targets in `stripe_size` chunks.
    ///
    /// Fails if the file already exists.
    pub fn create_striped(&self, path: &Path, stripe_size: u64, stripe_count: u32) -> Result<()> {
        let output = Command::new(&self.command)
            .arg("setstripe")
            .arg("-S")
            .arg(stripe_size.to_string())
            .arg("-c")
            .arg(stripe_count.to_string())
            .arg(path)
            .output()
            .map_err(Error::io(format!(
                "failed to run {} setstripe",
                self.command.display()
            )))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Topology(format!(
                "{} setstripe {} failed ({}): {}",
                self.command.display(),
                path.display(),
                output.status,
                stderr.trim()
            )));
        }

        tracing::debug!(path = %path.display(), stripe_size, stripe_count, "created striped file");
        Ok(())
    }
}

impl Default for LfsTopology {
    fn default() -> Self {
        Self::new("lfs")
    }
}

impl TopologyProvider for LfsTopology {
    fn layout(&self, path: &Path) -> Result<StripeLayout> {
        tracing::debug!(command = %self.command.display(), path = %path.display(), "querying layout");

        let output = Command::new(&self.command)
            .arg("getstripe")
            .arg(path)
            .output()
            .map_err(Error::io(format!(
                "failed to run {} getstripe",
                self.command.display()
            )))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Topology(format!(
                "{} getstripe {} failed ({}): {}",
                self.command.display(),
                path.display(),
                output.status,
                stderr.trim()
            )));
        }

        parse_getstripe(&String::from_utf8_lossy(&output.stdout))
    }
}

/// A provider returning the same layout for every path.
#[derive(Clone, Debug)]
pub struct StaticTopology {
    layout: StripeLayout,
}

impl StaticTopology {
    /// Returns `layout` for every path.
    pub fn new(layout: StripeLayout) -> Self {
        Self { layout }
    }
}

impl TopologyProvider for StaticTopology {
    fn layout(&self, _path: &Path) -> Result<StripeLayout> {
        Ok(self.layout.clone())
    }
}

/// Parses the output of `lfs getstripe <file>`.
///
/// Composite layouts list several components; only the first one is used.
pub fn parse_getstripe(output: &str) -> Result<StripeLayout> {
    let mut stripe_count = None;
    let mut stripe_size = None;
    let mut indices = Vec::new();
    let mut in_objects = false;

    for line in output.lines() {
        let line = line.trim();

        if in_objects {
            let Some(first) = line.split_whitespace().next() else {
                break;
            };
            match first.parse::<u32>() {
                Ok(index) => {
                    indices.push(StorageUnitIndex(index));
                    continue;
                }
                Err(_) => break,
            }
        }

        if let Some(value) = line.strip_prefix("lmm_stripe_count:") {
            if stripe_count.is_some() {
                break;
            }
            stripe_count = Some(parse_field("lmm_stripe_count", value)?);
        } else if let Some(value) = line.strip_prefix("lmm_stripe_size:") {
            stripe_size = Some(parse_field("lmm_stripe_size", value)?);
        } else if line.starts_with("obdidx") {
            in_objects = true;
        }
    }

    let stripe_count = stripe_count
        .ok_or_else(|| Error::Topology("no lmm_stripe_count in getstripe output".into()))?;
    let stripe_size = stripe_size
        .ok_or_else(|| Error::Topology("no lmm_stripe_size in getstripe output".into()))?;

    let stripe_count = u32::try_from(stripe_count).map_err(|_| {
        Error::Topology(format!("lmm_stripe_count {stripe_count} is out of range"))
    })?;

    StripeLayout::new(stripe_size, stripe_count, indices)
}

fn parse_field(name: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Topology(format!("invalid {name}: {:?}", value.trim())))
}
