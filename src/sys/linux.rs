use std::fs::File;
use std::io;

use rustix::fs::IFlags;

/// Sets the NoCoW inode flag (`chattr +C`).
///
/// Only meaningful while the file is still empty; btrfs rejects the flag on
/// files that already have data extents.
pub fn set_nocow(file: &File) -> io::Result<()> {
    let mut flags = rustix::fs::ioctl_getflags(file)?;
    flags |= IFlags::NOCOW;
    rustix::fs::ioctl_setflags(file, flags)?;
    Ok(())
}

/// Syncs the whole filesystem containing `file`, forcing reclamation of the
/// extents freed by the source truncations.
pub fn sync_filesystem(file: &File) -> io::Result<()> {
    Ok(rustix::fs::syncfs(file)?)
}
