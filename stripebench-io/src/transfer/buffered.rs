use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::time::Instant;

use super::{
    Transfer, TransferOptions, TransferResult, TransferStrategy, call_size, check_length, close,
};
use crate::error::{Error, Result};
use crate::partition::ByteRange;

/// Transfers through a buffered stream positioned with a single seek.
///
/// Without a block size the whole range is moved in one call. Any call that moves fewer bytes than
/// requested fails, and so does closing the file.
#[derive(Debug)]
pub struct Buffered {
    options: TransferOptions,
}

impl Buffered {
    /// Creates the strategy.
    pub fn new(options: TransferOptions) -> Self {
        Self { options }
    }
}

impl TransferStrategy for Buffered {
    fn name(&self) -> &'static str {
        "buffered"
    }

    fn execute(
        &self,
        path: &Path,
        range: ByteRange,
        transfer: Transfer<'_>,
    ) -> Result<TransferResult> {
        check_length(range, &transfer)?;
        let display = path.display();
        let call = call_size(self.options.block_size, u64::MAX, transfer.len());

        match transfer {
            Transfer::Read(dest) => {
                let file = File::open(path).map_err(Error::io(format!("failed to open {display}")))?;
                let mut reader = BufReader::new(file);
                reader
                    .seek(SeekFrom::Start(range.offset))
                    .map_err(Error::io(format!("failed to seek in {display}")))?;

                let start = Instant::now();
                for (i, block) in dest.chunks_mut(call).enumerate() {
                    reader.read_exact(block).map_err(Error::io(format!(
                        "short read of {} bytes at {} in {display}",
                        block.len(),
                        range.offset + (i * call) as u64,
                    )))?;
                }
                let elapsed = start.elapsed();

                close(reader.into_inner()).map_err(Error::io(format!("failed to close {display}")))?;
                Ok(TransferResult::new(range.length, elapsed))
            }
            Transfer::Write(src) => {
                let file = OpenOptions::new()
                    .write(true)
                    .create(true)
                    .truncate(false)
                    .open(path)
                    .map_err(Error::io(format!("failed to open {display}")))?;
                let mut writer = BufWriter::new(file);
                writer
                    .seek(SeekFrom::Start(range.offset))
                    .map_err(Error::io(format!("failed to seek in {display}")))?;

                let start = Instant::now();
                for (i, block) in src.chunks(call).enumerate() {
                    writer.write_all(block).map_err(Error::io(format!(
                        "short write of {} bytes at {} in {display}",
                        block.len(),
                        range.offset + (i * call) as u64,
                    )))?;
                }
                let file = writer
                    .into_inner()
                    .map_err(|err| err.into_error())
                    .map_err(Error::io(format!("failed to flush {display}")))?;
                if self.options.sync {
                    file.sync_all()
                        .map_err(Error::io(format!("failed to sync {display}")))?;
                }
                close(file).map_err(Error::io(format!("failed to close {display}")))?;
                let elapsed = start.elapsed();

                Ok(TransferResult::new(range.length, elapsed))
            }
        }
    }
}
