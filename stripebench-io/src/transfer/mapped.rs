use std::fs::{File, OpenOptions};
use std::path::Path;
use std::time::Instant;

use memmap2::MmapOptions;

use super::{Transfer, TransferOptions, TransferResult, TransferStrategy, check_length};
use crate::buffer::page_size;
use crate::error::{Error, Result};
use crate::partition::ByteRange;

/// Transfers by mapping the range and copying between the mapping and the worker's buffer.
///
/// Mappings cover at least one page. The file must already be long enough for writes, since a
/// mapping cannot extend it. Reads stop at the end of the file and report the bytes actually
/// copied. Unmapping and closing happen on drop, including on error paths.
#[derive(Debug)]
pub struct MemoryMapped {
    options: TransferOptions,
}

impl MemoryMapped {
    /// Creates the strategy.
    pub fn new(options: TransferOptions) -> Self {
        Self { options }
    }
}

impl TransferStrategy for MemoryMapped {
    fn name(&self) -> &'static str {
        "mmap"
    }

    fn execute(
        &self,
        path: &Path,
        range: ByteRange,
        transfer: Transfer<'_>,
    ) -> Result<TransferResult> {
        check_length(range, &transfer)?;
        if transfer.is_empty() {
            return Ok(TransferResult::new(0, Default::default()));
        }

        let display = path.display();
        let len = transfer.len();

        match transfer {
            Transfer::Read(dest) => {
                let file = File::open(path).map_err(Error::io(format!("failed to open {display}")))?;
                let file_len = file
                    .metadata()
                    .map_err(Error::io(format!("failed to stat {display}")))?
                    .len();

                // Pages past the end of the file cannot be touched, so reads stop at EOF.
                let available = file_len.saturating_sub(range.offset).min(len as u64) as usize;
                if available < len {
                    tracing::debug!(
                        %range,
                        file_len,
                        "mapped read reaches past end of file"
                    );
                }
                if available == 0 {
                    return Ok(TransferResult::new(0, Default::default()));
                }

                let map_len = (available as u64).max(page_size()) as usize;
                // SAFETY: the mapping is private to this worker and dropped before returning. Only
                // the first `available` bytes, which lie within the file, are accessed. Truncating
                // the file while the copy runs is not supported.
                let map = unsafe {
                    MmapOptions::new()
                        .offset(range.offset)
                        .len(map_len)
                        .map(&file)
                }
                .map_err(Error::io(format!(
                    "failed to map {map_len} bytes at {} of {display}",
                    range.offset
                )))?;

                let start = Instant::now();
                dest[..available].copy_from_slice(&map[..available]);
                let elapsed = start.elapsed();

                Ok(TransferResult::new(available as u64, elapsed))
            }
            Transfer::Write(src) => {
                let map_len = (len as u64).max(page_size()) as usize;
                let file = OpenOptions::new()
                    .read(true)
                    .write(true)
                    .open(path)
                    .map_err(Error::io(format!("failed to open {display}")))?;
                // SAFETY: workers map disjoint ranges, so no two mappings alias the same bytes. The
                // file has been extended to cover every range before any worker starts.
                let mut map = unsafe {
                    MmapOptions::new()
                        .offset(range.offset)
                        .len(map_len)
                        .map_mut(&file)
                }
                .map_err(Error::io(format!(
                    "failed to map {map_len} bytes at {} of {display}",
                    range.offset
                )))?;

                let start = Instant::now();
                map[..len].copy_from_slice(src);
                if self.options.sync {
                    map.flush_range(0, len)
                        .map_err(Error::io(format!("failed to sync mapping of {display}")))?;
                }
                let elapsed = start.elapsed();

                Ok(TransferResult::new(len as u64, elapsed))
            }
        }
    }
}
