//! Splitting a byte extent into per-worker ranges.
//!
//! A [`PartitionPlan`] covers `[0, total_extent)` with one [`ByteRange`] per worker. All ranges but
//! the last share one uniform size; the last range absorbs the remainder so that no byte is dropped.
//!
//! A plan may carry a *divisor*, which samples only the first `length / divisor` bytes of every
//! range. This is meant for quick diagnostic sweeps and intentionally leaves the rest of each range
//! untouched.

use std::fmt;

use crate::error::{Error, Result};

/// A contiguous region of a file or buffer.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct ByteRange {
    /// Offset of the first byte.
    pub offset: u64,
    /// Number of bytes in the range.
    pub length: u64,
}

impl ByteRange {
    /// Creates a range starting at `offset` spanning `length` bytes.
    pub const fn new(offset: u64, length: u64) -> Self {
        Self { offset, length }
    }

    /// The offset one past the last byte of this range.
    pub const fn end(&self) -> u64 {
        self.offset + self.length
    }

    /// Returns this range moved forward by `by` bytes.
    pub const fn translate(self, by: u64) -> Self {
        Self::new(self.offset + by, self.length)
    }

    /// Returns the leading `1 / divisor` part of this range.
    pub const fn sample(self, divisor: u32) -> Self {
        Self::new(self.offset, self.length / divisor as u64)
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.offset, self.end())
    }
}

/// The work assigned to a single worker of a plan.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Assignment {
    /// Position of the worker within the plan.
    pub index: usize,
    /// The worker's region of the local extent, which is also its region of the shared buffer.
    pub region: ByteRange,
    /// The bytes the worker actually transfers, in absolute file offsets.
    pub file_range: ByteRange,
}

/// An ordered list of ranges covering an extent exactly once.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PartitionPlan {
    total_extent: u64,
    divisor: u32,
    ranges: Vec<ByteRange>,
}

impl PartitionPlan {
    /// Splits `total_extent` bytes across `worker_count` workers.
    pub fn new(total_extent: u64, worker_count: u32) -> Result<Self> {
        Self::with_divisor(total_extent, worker_count, 1)
    }

    /// Splits `total_extent` bytes across `worker_count` workers, sampling `1 / divisor` of each.
    ///
    /// Fails if `worker_count` or `divisor` is zero, or if a sampling divisor exceeds the uniform
    /// part size: a part smaller than one division unit cannot be split further.
    pub fn with_divisor(total_extent: u64, worker_count: u32, divisor: u32) -> Result<Self> {
        let part_size = validate(total_extent, worker_count, divisor)?;
        Ok(Self::build(total_extent, worker_count, part_size, divisor))
    }

    /// Splits like [`with_divisor`](Self::with_divisor), but every range starts on a multiple of
    /// `page_size`.
    ///
    /// The uniform part size is rounded up to a whole number of pages and the worker count is
    /// reduced until all parts fit into the extent. Work that no longer fits is merged into the
    /// last worker, so the resulting plan may have fewer ranges than requested.
    pub fn page_aligned(
        total_extent: u64,
        worker_count: u32,
        divisor: u32,
        page_size: u64,
    ) -> Result<Self> {
        validate(total_extent, worker_count, divisor)?;
        if page_size == 0 {
            return Err(Error::invalid("page size must be at least 1"));
        }

        let mut part_size = total_extent / worker_count as u64;
        if part_size % page_size != 0 {
            part_size = (part_size / page_size + 1) * page_size;
        }

        let mut workers = worker_count;
        while workers > 1 && part_size * workers as u64 > total_extent {
            workers -= 1;
        }

        if divisor > 1 && workers > 1 && divisor as u64 > part_size {
            return Err(Error::invalid(format!(
                "divisor {divisor} exceeds the per-worker part size of {part_size} bytes"
            )));
        }

        Ok(Self::build(total_extent, workers, part_size, divisor))
    }

    fn build(total_extent: u64, worker_count: u32, part_size: u64, divisor: u32) -> Self {
        let last = worker_count as u64 - 1;
        let ranges = (0..worker_count as u64)
            .map(|index| {
                let offset = part_size * index;
                let length = if index == last {
                    total_extent - offset
                } else {
                    part_size
                };
                ByteRange::new(offset, length)
            })
            .collect();

        Self {
            total_extent,
            divisor,
            ranges,
        }
    }

    /// The number of bytes covered by this plan.
    pub fn total_extent(&self) -> u64 {
        self.total_extent
    }

    /// The number of bytes actually transferred when the divisor is applied.
    pub fn transfer_extent(&self) -> u64 {
        self.total_extent / self.divisor as u64
    }

    /// The number of ranges, and thus workers, in this plan.
    pub fn worker_count(&self) -> u32 {
        self.ranges.len() as u32
    }

    /// The sampling divisor; `1` transfers everything.
    pub fn divisor(&self) -> u32 {
        self.divisor
    }

    /// The uniform size shared by all ranges but the last.
    pub fn part_size(&self) -> u64 {
        self.ranges.first().map_or(0, |range| range.length)
    }

    /// The ordered, contiguous ranges of this plan.
    pub fn ranges(&self) -> &[ByteRange] {
        &self.ranges
    }

    /// Yields one [`Assignment`] per range, translating file ranges by `global_offset`.
    ///
    /// The plan itself always describes the local extent. The global offset is where that extent
    /// starts within the file, for example the shard owned by this process.
    pub fn assignments(&self, global_offset: u64) -> impl Iterator<Item = Assignment> + '_ {
        self.ranges
            .iter()
            .enumerate()
            .map(move |(index, region)| Assignment {
                index,
                region: *region,
                file_range: region.sample(self.divisor).translate(global_offset),
            })
    }
}

fn validate(total_extent: u64, worker_count: u32, divisor: u32) -> Result<u64> {
    if worker_count == 0 {
        return Err(Error::invalid("worker count must be at least 1"));
    }
    if divisor == 0 {
        return Err(Error::invalid("divisor must be at least 1"));
    }

    let part_size = total_extent / worker_count as u64;
    if divisor > 1 && divisor as u64 > part_size {
        return Err(Error::invalid(format!(
            "divisor {divisor} exceeds the per-worker part size of {part_size} bytes"
        )));
    }

    Ok(part_size)
}
