//! Text rendering of benchmark and upload results.
//!
//! Everything here ends up on stdout. Bandwidth-only output is a single number per line so that
//! results of many processes can be collected with standard tools.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use bytesize::ByteSize;
use stripebench_io::{PartitionPlan, StrategyKind, StripeLayout};

/// The description of a read run printed before it starts.
#[derive(Debug)]
pub struct ReadHeader<'a> {
    /// The file being read.
    pub path: &'a Path,
    /// Size of the whole file.
    pub file_size: u64,
    /// Layout of the file.
    pub layout: &'a StripeLayout,
    /// The plan the workers follow.
    pub plan: &'a PartitionPlan,
    /// The transfer strategy.
    pub strategy: StrategyKind,
}

impl fmt::Display for ReadHeader<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let divisor = self.plan.divisor();
        writeln!(f, "File:         {}", self.path.display())?;
        writeln!(
            f,
            "File size:    {} bytes ({})",
            self.file_size,
            ByteSize(self.file_size)
        )?;
        writeln!(f, "Stripe count: {}", self.layout.stripe_count())?;
        writeln!(f, "Stripe size:  {}", self.layout.stripe_size())?;
        writeln!(f, "# threads:    {}", self.plan.worker_count())?;
        if divisor > 1 {
            writeln!(
                f,
                "Read factor:  1/{divisor} (~{} bytes, {} bytes per thread)",
                self.plan.transfer_extent(),
                self.plan.part_size() / divisor as u64
            )?;
        }
        writeln!(f, "Read mode:    {}", self.strategy)
    }
}

/// The aggregate bandwidth line of a run.
#[derive(Debug)]
pub struct Bandwidth {
    /// Aggregate bandwidth in GiB/s, zero if the run was too short to measure.
    pub gibps: f64,
    /// Wall-clock time of the run.
    pub elapsed: Duration,
    /// Print the bare number only.
    pub brief: bool,
    /// Also print the elapsed time.
    pub with_elapsed: bool,
}

impl fmt::Display for Bandwidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.gibps == 0.0 {
            return writeln!(f, "Elapsed time < 1ms");
        }

        if self.brief {
            return writeln!(f, "{}", self.gibps);
        }

        writeln!(f, "Bandwidth: {} GiB/s", self.gibps)?;
        if self.with_elapsed {
            writeln!(f, "Elapsed time: {:.3} s", self.elapsed.as_secs_f64())?;
        }
        writeln!(f)
    }
}

/// The stripe layout of a file, one OST per line.
#[derive(Debug)]
pub struct Layout<'a>(pub &'a StripeLayout);

impl fmt::Display for Layout<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Stripe size: {}", self.0.stripe_size())?;
        writeln!(f, "Stripe count: {}", self.0.stripe_count())?;
        for (stripe, unit) in self.0.unit_indices().iter().enumerate() {
            writeln!(f, "Stripe {stripe}: OST {unit}")?;
        }
        Ok(())
    }
}

/// The result of an upload.
#[derive(Debug)]
pub struct Uploaded<'a> {
    /// The ETag of the final object.
    pub etag: &'a str,
    /// Number of parts that had to be sent again.
    pub retries: u32,
}

impl fmt::Display for Uploaded<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.etag)?;
        if self.retries > 0 {
            writeln!(f, "Num retries: {}", self.retries)?;
        }
        Ok(())
    }
}
