use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::os::unix::fs::FileExt;
use std::path::Path;
use std::time::Instant;

use super::{Transfer, TransferOptions, TransferResult, TransferStrategy, call_size, check_length};
use crate::error::{Error, Result};
use crate::partition::ByteRange;

/// Largest number of bytes moved by a single positioned call.
///
/// Some platforms return short transfers for very large single calls.
pub const MAX_CHUNK_SIZE: u64 = 1 << 30;

/// Transfers with positioned reads and writes, without moving a file cursor.
///
/// Ranges are split into chunks of at most [`MAX_CHUNK_SIZE`] bytes, or the configured block size if
/// smaller. A read that hits the end of the file stops early and reports the bytes it got.
#[derive(Debug)]
pub struct Unbuffered {
    options: TransferOptions,
}

impl Unbuffered {
    /// Creates the strategy.
    pub fn new(options: TransferOptions) -> Self {
        Self { options }
    }
}

impl TransferStrategy for Unbuffered {
    fn name(&self) -> &'static str {
        "unbuffered"
    }

    fn execute(
        &self,
        path: &Path,
        range: ByteRange,
        transfer: Transfer<'_>,
    ) -> Result<TransferResult> {
        check_length(range, &transfer)?;
        let display = path.display();
        let chunk = call_size(self.options.block_size, MAX_CHUNK_SIZE, transfer.len());

        match transfer {
            Transfer::Read(dest) => {
                let file = File::open(path).map_err(Error::io(format!("failed to open {display}")))?;

                let start = Instant::now();
                let mut bytes_moved = 0;
                for (i, block) in dest.chunks_mut(chunk).enumerate() {
                    let offset = range.offset + (i * chunk) as u64;
                    let read = read_at_most(&file, block, offset).map_err(Error::io(format!(
                        "failed to read {} bytes at {offset} from {display}",
                        block.len()
                    )))?;
                    bytes_moved += read as u64;
                    if read < block.len() {
                        tracing::debug!(offset, bytes_moved, "reached end of file");
                        break;
                    }
                }
                let elapsed = start.elapsed();

                Ok(TransferResult::new(bytes_moved, elapsed))
            }
            Transfer::Write(src) => {
                let file = OpenOptions::new()
                    .write(true)
                    .create(true)
                    .truncate(false)
                    .open(path)
                    .map_err(Error::io(format!("failed to open {display}")))?;

                let start = Instant::now();
                for (i, block) in src.chunks(chunk).enumerate() {
                    let offset = range.offset + (i * chunk) as u64;
                    file.write_all_at(block, offset).map_err(Error::io(format!(
                        "failed to write {} bytes at {offset} to {display}",
                        block.len()
                    )))?;
                }
                if self.options.sync {
                    file.sync_data()
                        .map_err(Error::io(format!("failed to sync {display}")))?;
                }
                let elapsed = start.elapsed();

                Ok(TransferResult::new(range.length, elapsed))
            }
        }
    }
}

/// Reads into `buf` until it is full or the end of the file is reached.
fn read_at_most(file: &File, buf: &mut [u8], offset: u64) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read_at(&mut buf[filled..], offset + filled as u64) {
            Ok(0) => break,
            Ok(read) => filled += read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}
