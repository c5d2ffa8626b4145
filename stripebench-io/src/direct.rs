//! Checking whether a filesystem accepts direct I/O.

use std::fs::OpenOptions;
use std::os::unix::fs::{FileExt, OpenOptionsExt};
use std::path::Path;

use nix::fcntl::OFlag;

use crate::buffer;
use crate::error::{Error, Result};
use crate::pattern;
use crate::transfer;

/// Writes one page of the test pattern to `path`, bypassing the page cache.
///
/// The file is created if it does not exist. Fails with [`Error::Io`] if the filesystem rejects
/// `O_DIRECT` opens or aligned direct writes.
pub fn check_direct_io(path: &Path) -> Result<()> {
    let display = path.display();
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .mode(0o644)
        .custom_flags(OFlag::O_DIRECT.bits())
        .open(path)
        .map_err(Error::io(format!("failed to open {display} with O_DIRECT")))?;

    // direct writes need an aligned buffer, offset and length
    let page = buffer::page_size() as usize;
    let mut block = buffer::allocate(page, true);
    pattern::fill(&mut block, 0);

    file.write_all_at(&block, 0)
        .map_err(Error::io(format!("failed to write {display} with O_DIRECT")))?;
    transfer::close(file).map_err(Error::io(format!("failed to close {display}")))?;

    tracing::debug!(path = %path.display(), bytes = page, "direct write succeeded");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_a_page_or_reports_why_not() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("direct.bin");

        // not every filesystem used for scratch space supports O_DIRECT
        match check_direct_io(&path) {
            Ok(()) => {
                let contents = std::fs::read(&path).unwrap();
                let page = buffer::page_size() as usize;
                assert_eq!(contents, pattern::window(0, page).as_ref());
            }
            Err(Error::Io { context, .. }) => assert!(context.contains("O_DIRECT"), "{context}"),
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("direct.bin");

        let err = check_direct_io(&path).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }
}
