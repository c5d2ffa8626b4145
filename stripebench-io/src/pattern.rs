//! Deterministic file contents for write benchmarks and test files.
//!
//! The pattern is the little-endian encoding of the sequence `0u64, 1u64, 2u64, ...`, so the byte at
//! absolute offset `o` is byte `o % 8` of the integer `o / 8`. Any window of the pattern can be
//! generated independently, which lets sharded writers agree on the contents of a file.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use bytes::{Bytes, BytesMut};

use crate::error::{Error, Result};

const WORD: usize = std::mem::size_of::<u64>();

/// Chunk size used when streaming the pattern to a file.
const WRITE_CHUNK: usize = 8 << 20;

/// Fills `buf` with the pattern window starting at absolute `offset`.
pub fn fill(buf: &mut [u8], offset: u64) {
    let misalignment = (offset % WORD as u64) as usize;
    let head = if misalignment == 0 {
        0
    } else {
        (WORD - misalignment).min(buf.len())
    };

    let (head_buf, rest) = buf.split_at_mut(head);
    for (i, byte) in head_buf.iter_mut().enumerate() {
        *byte = byte_at(offset + i as u64);
    }

    let body_offset = offset + head as u64;
    let mut word = body_offset / WORD as u64;
    let mut chunks = rest.chunks_exact_mut(WORD);
    for chunk in &mut chunks {
        chunk.copy_from_slice(&word.to_le_bytes());
        word += 1;
    }

    let tail = chunks.into_remainder();
    let tail_offset = word * WORD as u64;
    for (i, byte) in tail.iter_mut().enumerate() {
        *byte = byte_at(tail_offset + i as u64);
    }
}

/// Returns `len` bytes of the pattern starting at absolute `offset`.
pub fn window(offset: u64, len: usize) -> Bytes {
    let mut buf = BytesMut::zeroed(len);
    fill(&mut buf, offset);
    buf.freeze()
}

/// Writes a file of `size` bytes containing the pattern, replacing any existing file.
pub fn create_file(path: &Path, size: u64) -> Result<()> {
    let display = path.display();
    let file = File::create(path).map_err(Error::io(format!("failed to create {display}")))?;
    let mut writer = BufWriter::new(file);

    let mut chunk = vec![0; WRITE_CHUNK];
    let mut offset = 0;
    while offset < size {
        let len = (size - offset).min(WRITE_CHUNK as u64) as usize;
        fill(&mut chunk[..len], offset);
        writer
            .write_all(&chunk[..len])
            .map_err(Error::io(format!("failed to write {display}")))?;
        offset += len as u64;
    }

    writer
        .into_inner()
        .map_err(|err| err.into_error())
        .and_then(|file| file.sync_all())
        .map_err(Error::io(format!("failed to flush {display}")))?;

    tracing::debug!(path = %path.display(), size, "created pattern file");
    Ok(())
}

fn byte_at(offset: u64) -> u8 {
    (offset / WORD as u64).to_le_bytes()[(offset % WORD as u64) as usize]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_of_words() {
        let bytes = window(0, 24);
        assert_eq!(&bytes[..8], &0u64.to_le_bytes());
        assert_eq!(&bytes[8..16], &1u64.to_le_bytes());
        assert_eq!(&bytes[16..], &2u64.to_le_bytes());
    }

    #[test]
    fn unaligned_windows_agree() {
        let whole = window(0, 1000);
        for (offset, len) in [(3, 10), (7, 1), (13, 200), (64, 5), (999, 1)] {
            let part = window(offset, len);
            assert_eq!(part.as_ref(), &whole[offset as usize..offset as usize + len]);
        }
    }

    #[test]
    fn creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pattern.bin");

        create_file(&path, 1234).unwrap();

        let contents = std::fs::read(&path).unwrap();
        assert_eq!(contents, window(0, 1234).as_ref());
    }
}
