//! Where part bodies come from.

use std::fmt;
use std::fs::File;
use std::os::unix::fs::FileExt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use bytes::{Bytes, BytesMut};
use memmap2::Mmap;
use serde::{Deserialize, Serialize};
use stripebench_io::{Benchmark, ByteRange, StrategyKind, SyncPolicy};

use crate::error::{Result, UploadError};

/// How the file is brought into memory before parts are sent.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceMode {
    /// Every part reads its own range from disk right before it is sent.
    #[default]
    None,
    /// The whole file is read into memory in parallel, then sliced.
    Preload,
    /// The whole file is memory mapped once, then sliced.
    Map,
}

impl fmt::Display for SourceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SourceMode::None => "none",
            SourceMode::Preload => "preload",
            SourceMode::Map => "map",
        })
    }
}

impl FromStr for SourceMode {
    type Err = UploadError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(SourceMode::None),
            "preload" => Ok(SourceMode::Preload),
            "map" => Ok(SourceMode::Map),
            _ => Err(UploadError::InvalidArgument(format!(
                r#"unknown source mode "{s}": expected one of "none", "preload", "map""#
            ))),
        }
    }
}

/// Produces the body of every part.
///
/// In-memory sources hand out slices of one shared buffer, so parts never copy file data.
#[derive(Clone, Debug)]
pub enum PartSource {
    /// Reads ranges from the file on demand.
    File(Arc<Path>),
    /// Slices a preloaded or mapped copy of the file.
    Memory(Bytes),
}

impl PartSource {
    /// Prepares the source for a file of `size` bytes uploaded in `parts` parts.
    pub async fn open(path: &Path, size: u64, parts: u32, mode: SourceMode) -> Result<Self> {
        match mode {
            SourceMode::None => Ok(Self::File(Arc::from(path))),
            SourceMode::Preload => preload(path, size, parts).await.map(Self::Memory),
            SourceMode::Map => {
                let path = path.to_owned();
                tokio::task::spawn_blocking(move || map(&path, size))
                    .await?
                    .map(Self::Memory)
            }
        }
    }

    /// Returns the bytes of `range`.
    pub async fn read(&self, range: ByteRange) -> Result<Bytes> {
        match self {
            Self::Memory(bytes) => Ok(bytes.slice(range.offset as usize..range.end() as usize)),
            Self::File(path) => {
                let path = Arc::clone(path);
                tokio::task::spawn_blocking(move || read_range(&path, range)).await?
            }
        }
    }
}

async fn preload(path: &Path, size: u64, parts: u32) -> Result<Bytes> {
    let start = Instant::now();
    let report = Benchmark::builder(path, size)
        .workers(parts)
        .strategy(StrategyKind::Unbuffered)
        .sync(SyncPolicy::None)
        .build()?
        .run()
        .await?;

    let loaded = report.bytes_moved();
    if loaded != size {
        return Err(UploadError::Io {
            context: format!("failed to preload {}", path.display()),
            source: std::io::ErrorKind::UnexpectedEof.into(),
        });
    }

    tracing::info!(
        path = %path.display(),
        size,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "preloaded file"
    );
    Ok(report.buffer.map(BytesMut::freeze).unwrap_or_default())
}

fn map(path: &Path, size: u64) -> Result<Bytes> {
    if size == 0 {
        return Ok(Bytes::new());
    }

    let display = path.display();
    let file = File::open(path).map_err(UploadError::io(format!("failed to open {display}")))?;
    // SAFETY: the mapping is read-only and the file is not modified by this process while the
    // upload runs.
    let map = unsafe { Mmap::map(&file) }
        .map_err(UploadError::io(format!("failed to map {display}")))?;
    Ok(Bytes::from_owner(map))
}

fn read_range(path: &Path, range: ByteRange) -> Result<Bytes> {
    let display = path.display();
    let file = File::open(path).map_err(UploadError::io(format!("failed to open {display}")))?;

    let mut buf = BytesMut::zeroed(range.length as usize);
    file.read_exact_at(&mut buf, range.offset)
        .map_err(UploadError::io(format!("failed to read {range} of {display}")))?;
    Ok(buf.freeze())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn sample_file() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"0123456789abcdef").unwrap();
        file
    }

    #[tokio::test]
    async fn all_modes_agree() {
        let file = sample_file();
        for mode in [SourceMode::None, SourceMode::Preload, SourceMode::Map] {
            let source = PartSource::open(file.path(), 16, 3, mode).await.unwrap();
            let part = source.read(ByteRange::new(10, 6)).await.unwrap();
            assert_eq!(part.as_ref(), b"abcdef", "{mode}");
        }
    }

    #[tokio::test]
    async fn preload_of_short_file_fails() {
        let file = sample_file();
        let err = PartSource::open(file.path(), 32, 2, SourceMode::Preload)
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::Io { .. }));
    }

    #[test]
    fn parses_modes() {
        assert_eq!("MAP".parse::<SourceMode>().unwrap(), SourceMode::Map);
        assert!("mmap".parse::<SourceMode>().is_err());
    }
}
