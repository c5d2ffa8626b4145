//! The shared transfer buffer and its per-worker views.
//!
//! A benchmark allocates one buffer for the whole local extent. For reads it is split into disjoint,
//! owned [`BytesMut`] regions that are handed to the workers and stitched back together afterwards.
//! For writes it is frozen into [`Bytes`] and sliced, so every worker holds a read-only view into the
//! same allocation.

use bytes::{Buf, Bytes, BytesMut};

use crate::partition::PartitionPlan;

/// Fallback when the page size cannot be queried.
const DEFAULT_PAGE_SIZE: u64 = 4096;

/// Returns the memory page size of this system.
pub fn page_size() -> u64 {
    match nix::unistd::sysconf(nix::unistd::SysconfVar::PAGE_SIZE) {
        Ok(Some(size)) if size > 0 => size as u64,
        _ => DEFAULT_PAGE_SIZE,
    }
}

/// Allocates a zeroed buffer of `len` bytes.
///
/// With `page_aligned`, the first byte of the returned buffer lies on a page boundary.
pub fn allocate(len: usize, page_aligned: bool) -> BytesMut {
    if !page_aligned {
        return BytesMut::zeroed(len);
    }

    let page = page_size() as usize;
    let mut buffer = BytesMut::zeroed(len + page);
    let padding = buffer.as_ptr().align_offset(page);
    if padding > page {
        // alignment could not be computed, the buffer is still large enough
        buffer.truncate(len);
        return buffer;
    }

    buffer.advance(padding);
    buffer.truncate(len);
    buffer
}

/// Splits `buffer` into one owned region per range of `plan`.
///
/// The regions are views into the same allocation and never overlap. `buffer` must be exactly as
/// long as the plan's extent.
pub fn split_regions(mut buffer: BytesMut, plan: &PartitionPlan) -> Vec<BytesMut> {
    debug_assert_eq!(buffer.len() as u64, plan.total_extent());

    let mut regions = Vec::with_capacity(plan.ranges().len());
    for range in plan.ranges() {
        regions.push(buffer.split_to(range.length as usize));
    }
    regions
}

/// Joins regions produced by [`split_regions`] back into a single buffer.
///
/// Regions must be passed in their original order, in which case no data is copied.
pub fn join_regions(regions: impl IntoIterator<Item = BytesMut>) -> BytesMut {
    let mut regions = regions.into_iter();
    let Some(mut joined) = regions.next() else {
        return BytesMut::new();
    };
    for region in regions {
        joined.unsplit(region);
    }
    joined
}

/// Returns a read-only view of each range of `plan` within `source`.
pub fn slice_regions(source: &Bytes, plan: &PartitionPlan) -> Vec<Bytes> {
    plan.ranges()
        .iter()
        .map(|range| source.slice(range.offset as usize..range.end() as usize))
        .collect()
}
