//! Thin wrappers over the file syscalls the migration is built from.
//!
//! Everything here takes `&File`, returns `io::Result`, and leaves attaching
//! which-file/which-operation context to the caller.

use std::fs::File;
use std::io;

use cfg_if::cfg_if;
use rustix::fs::SeekFrom;

cfg_if! {
    if #[cfg(any(target_os = "linux", target_os = "android"))] {
        mod linux;
        pub use linux::{set_nocow, sync_filesystem};
    } else {
        pub fn set_nocow(_file: &File) -> io::Result<()> {
            Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!(
                    "the NoCoW attribute is not supported on {}-{}",
                    std::env::consts::ARCH,
                    std::env::consts::OS
                ),
            ))
        }

        // No syncfs outside Linux; flushing the file itself is the closest
        // the platform offers.
        pub fn sync_filesystem(file: &File) -> io::Result<()> {
            sync(file)
        }
    }
}

pub fn seek_to(file: &File, offset: u64) -> io::Result<()> {
    rustix::fs::seek(file, SeekFrom::Start(offset))?;
    Ok(())
}

/// Offset of the next hole at or after `offset`. The end of the file counts
/// as a hole, so this never fails with `ENXIO` for offsets inside the file.
pub fn next_hole(file: &File, offset: u64) -> io::Result<u64> {
    Ok(rustix::fs::seek(file, SeekFrom::Hole(offset))?)
}

/// Offset of the next data extent at or after `offset`, or `None` when only
/// end-of-file lies ahead.
pub fn next_data(file: &File, offset: u64) -> io::Result<Option<u64>> {
    match rustix::fs::seek(file, SeekFrom::Data(offset)) {
        Ok(pos) => Ok(Some(pos)),
        Err(rustix::io::Errno::NXIO) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

pub fn truncate(file: &File, len: u64) -> io::Result<()> {
    Ok(rustix::fs::ftruncate(file, len)?)
}

pub fn datasync(file: &File) -> io::Result<()> {
    Ok(rustix::fs::fdatasync(file)?)
}

pub fn sync(file: &File) -> io::Result<()> {
    Ok(rustix::fs::fsync(file)?)
}
