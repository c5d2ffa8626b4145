//! Scratch files with known contents.

use std::io::Write;

use tempfile::NamedTempFile;

/// Creates a temporary file of `size` bytes filled with the sequential test pattern.
///
/// The file is deleted when the returned handle is dropped.
pub fn pattern_file(size: u64) -> NamedTempFile {
    let file = NamedTempFile::new().unwrap();
    stripebench_io::pattern::create_file(file.path(), size).unwrap();
    file
}

/// Creates a temporary file containing `contents`.
pub fn file_with(contents: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents).unwrap();
    file.flush().unwrap();
    file
}
