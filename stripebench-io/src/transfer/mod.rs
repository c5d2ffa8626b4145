//! Strategies moving one range between a file and a worker's buffer.
//!
//! Every strategy opens its own file handle or mapping, performs a single range transfer and closes
//! it again, so workers never share descriptors. Failures are returned to the caller, which decides
//! what happens to sibling workers.

use std::fmt;
use std::fs::File;
use std::io;
use std::os::fd::IntoRawFd;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::partition::ByteRange;

mod buffered;
mod mapped;
mod unbuffered;

pub use self::buffered::Buffered;
pub use self::mapped::MemoryMapped;
pub use self::unbuffered::{MAX_CHUNK_SIZE, Unbuffered};

/// Number of bytes in a GiB.
pub const GIB: f64 = (1u64 << 30) as f64;

/// Computes a bandwidth in GiB/s, returning `0` for an empty interval.
pub fn gibps(bytes: u64, elapsed: Duration) -> f64 {
    let seconds = elapsed.as_secs_f64();
    if seconds > 0.0 {
        bytes as f64 / seconds / GIB
    } else {
        0.0
    }
}

/// The direction of a transfer.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Move bytes from the file into memory.
    #[default]
    Read,
    /// Move bytes from memory into the file.
    Write,
}

/// A worker's view of the shared buffer, carrying the direction of the transfer.
#[derive(Debug)]
pub enum Transfer<'a> {
    /// Destination of a read.
    Read(&'a mut [u8]),
    /// Source of a write.
    Write(&'a [u8]),
}

impl Transfer<'_> {
    /// The number of bytes this transfer wants to move.
    pub fn len(&self) -> usize {
        match self {
            Transfer::Read(dest) => dest.len(),
            Transfer::Write(src) => src.len(),
        }
    }

    /// Returns `true` if there is nothing to transfer.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The direction of this transfer.
    pub fn mode(&self) -> Mode {
        match self {
            Transfer::Read(_) => Mode::Read,
            Transfer::Write(_) => Mode::Write,
        }
    }
}

/// The outcome of one worker's transfer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TransferResult {
    /// Number of bytes actually moved.
    pub bytes_moved: u64,
    /// Time spent moving them, excluding opening and closing the file.
    pub elapsed: Duration,
    /// `bytes_moved` over `elapsed`, in GiB/s.
    pub bandwidth_gibps: f64,
}

impl TransferResult {
    /// Creates a result and derives its bandwidth.
    pub fn new(bytes_moved: u64, elapsed: Duration) -> Self {
        Self {
            bytes_moved,
            elapsed,
            bandwidth_gibps: gibps(bytes_moved, elapsed),
        }
    }

    /// The elapsed time in seconds.
    pub fn elapsed_seconds(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }
}

/// Options shared by all strategies.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct TransferOptions {
    /// Upper bound on the size of a single read or write call.
    ///
    /// Ignored by memory-mapped transfers.
    pub block_size: Option<u64>,
    /// Flush written data to stable storage before the worker finishes.
    pub sync: bool,
}

/// Executes a single range transfer.
pub trait TransferStrategy: fmt::Debug + Send + Sync + 'static {
    /// The strategy name, used for diagnostics.
    fn name(&self) -> &'static str;

    /// Transfers `range` of the file at `path` to or from the buffer in `transfer`.
    ///
    /// The buffer must be exactly `range.length` bytes long.
    fn execute(
        &self,
        path: &Path,
        range: ByteRange,
        transfer: Transfer<'_>,
    ) -> Result<TransferResult>;
}

/// The available transfer strategies.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    /// Stream-style handle positioned with a seek.
    Buffered,
    /// Positioned system calls addressed by absolute offset.
    #[default]
    Unbuffered,
    /// Memory mapping plus a bulk copy.
    #[serde(rename = "mmap")]
    MemoryMapped,
}

impl StrategyKind {
    /// Instantiates the strategy with the given options.
    pub fn strategy(self, options: TransferOptions) -> Box<dyn TransferStrategy> {
        match self {
            StrategyKind::Buffered => Box::new(Buffered::new(options)),
            StrategyKind::Unbuffered => Box::new(Unbuffered::new(options)),
            StrategyKind::MemoryMapped => Box::new(MemoryMapped::new(options)),
        }
    }

    /// Returns `true` if ranges must start on page boundaries.
    pub fn requires_page_alignment(self) -> bool {
        self == StrategyKind::MemoryMapped
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StrategyKind::Buffered => "buffered",
            StrategyKind::Unbuffered => "unbuffered",
            StrategyKind::MemoryMapped => "mmap",
        })
    }
}

impl FromStr for StrategyKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            s if s.eq_ignore_ascii_case("buffered") => Ok(StrategyKind::Buffered),
            s if s.eq_ignore_ascii_case("unbuffered") => Ok(StrategyKind::Unbuffered),
            s if s.eq_ignore_ascii_case("mmap") => Ok(StrategyKind::MemoryMapped),
            s => Err(Error::InvalidArgument(format!(
                r#"unknown transfer mode "{s}": expected one of "buffered", "unbuffered", "mmap""#
            ))),
        }
    }
}

fn check_length(range: ByteRange, transfer: &Transfer<'_>) -> Result<()> {
    if transfer.len() as u64 != range.length {
        return Err(Error::InvalidArgument(format!(
            "buffer of {} bytes does not match range {range}",
            transfer.len()
        )));
    }
    Ok(())
}

/// Closes `file`, reporting errors that dropping it would discard.
///
/// Network filesystems report deferred write-back failures from `close(2)`.
pub(crate) fn close(file: File) -> io::Result<()> {
    let fd = file.into_raw_fd();
    // SAFETY: `fd` was released by `file` above and is closed exactly once.
    let ret = unsafe { nix::libc::close(fd) };
    nix::errno::Errno::result(ret)
        .map(drop)
        .map_err(io::Error::from)
}

/// The number of bytes moved per call for a transfer of `len` bytes.
fn call_size(block_size: Option<u64>, ceiling: u64, len: usize) -> usize {
    let size = block_size.unwrap_or(ceiling).min(ceiling).min(len as u64);
    size.max(1) as usize
}
