use std::fs::{self, File, OpenOptions};
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};

use crate::copy::Copier;
use crate::error::{Error, FileRole, Result};
use crate::sys;
use crate::{Event, NocowPolicy, Options, SyncMode};

/// One whole-file migration: both handles, the copy buffer, and the
/// reporting hook.
///
/// There is no progress state here beyond what the filesystem itself holds.
/// The cursor is always re-derived from the live source length, which is why
/// a killed run resumes correctly when `prepare` + `run` are simply executed
/// again.
pub(crate) struct Migration<F: FnMut(Event)> {
    src: File,
    dst: File,
    src_path: PathBuf,
    copier: Copier,
    block_size: u64,
    sync: SyncMode,
    report: F,
}

impl<F: FnMut(Event)> Migration<F> {
    /// Opens both files and, on a fresh run (empty destination), marks the
    /// destination NoCoW and extends it to the source's length.
    ///
    /// A non-empty destination means a previous run already did both, so
    /// both steps are skipped; the NoCoW flag could not be applied now
    /// anyway, the file has data.
    #[cfg_attr(
        feature = "tracing",
        tracing_attributes::instrument(level = "debug", skip_all)
    )]
    pub fn prepare(from: &Path, to: &Path, options: &Options, mut report: F) -> Result<Self> {
        let src = OpenOptions::new()
            .read(true)
            .write(true)
            .open(from)
            .map_err(|e| Error::Open {
                role: FileRole::Source,
                path: from.into(),
                source: e,
            })?;

        let src_meta = src.metadata().map_err(|e| Error::Stat {
            role: FileRole::Source,
            path: from.into(),
            source: e,
        })?;

        // Mode bits are applied at creation, the only metadata carried over.
        let dst = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .mode(src_meta.permissions().mode())
            .open(to)
            .map_err(|e| Error::Open {
                role: FileRole::Destination,
                path: to.into(),
                source: e,
            })?;

        let dst_len = dst
            .metadata()
            .map_err(|e| Error::Stat {
                role: FileRole::Destination,
                path: to.into(),
                source: e,
            })?
            .len();

        if dst_len == 0 {
            if let Err(e) = sys::set_nocow(&dst) {
                match options.nocow {
                    NocowPolicy::Require => {
                        return Err(Error::NoCow {
                            path: to.into(),
                            source: e,
                        })
                    }
                    NocowPolicy::BestEffort => report(Event::NoCowFailed(e)),
                }
            }

            // Pre-extend once; the destination length never changes again.
            // The sparse copier depends on this when it returns early at a
            // trailing hole.
            sys::truncate(&dst, src_meta.len()).map_err(|e| Error::Truncate {
                role: FileRole::Destination,
                len: src_meta.len(),
                source: e,
            })?;

            report(Event::Created {
                len: src_meta.len(),
            });
        } else {
            report(Event::Resumed {
                remaining: src_meta.len(),
            });
        }

        Ok(Self {
            src,
            dst,
            src_path: from.into(),
            copier: Copier::new(options.chunk_size),
            block_size: options.block_size.max(1),
            sync: options.sync,
            report,
        })
    }

    /// Drains the source into the destination block by block, back to front,
    /// then syncs and removes the source.
    #[cfg_attr(
        feature = "tracing",
        tracing_attributes::instrument(level = "debug", skip_all)
    )]
    pub fn run(mut self) -> Result<()> {
        // The live source length is the cursor: everything at or above it is
        // already migrated and durable.
        let mut pos = self
            .src
            .metadata()
            .map_err(|e| Error::Stat {
                role: FileRole::Source,
                path: self.src_path.clone(),
                source: e,
            })?
            .len();

        while pos > 0 {
            let start = pos.saturating_sub(self.block_size);
            let len = pos - start;
            (self.report)(Event::Block { pos: start, len });

            sys::seek_to(&self.src, start)
                .map_err(|e| Error::io("seek", FileRole::Source, e))?;
            sys::seek_to(&self.dst, start)
                .map_err(|e| Error::io("seek", FileRole::Destination, e))?;
            self.copier.copy_range(&self.dst, &self.src, start, len)?;

            // The destination block must be durable before the source bytes
            // are destroyed. Reversing these two lines opens a crash window
            // that loses data for good.
            sys::datasync(&self.dst).map_err(|e| Error::Durability {
                role: FileRole::Destination,
                source: e,
            })?;
            sys::truncate(&self.src, start).map_err(|e| Error::Truncate {
                role: FileRole::Source,
                len: start,
                source: e,
            })?;
            sys::datasync(&self.src).map_err(|e| Error::Durability {
                role: FileRole::Source,
                source: e,
            })?;

            pos = start;
        }

        sys::sync(&self.dst).map_err(|e| Error::Durability {
            role: FileRole::Destination,
            source: e,
        })?;

        (self.report)(Event::Syncing);
        match self.sync {
            SyncMode::Filesystem => sys::sync_filesystem(&self.src),
            SyncMode::SourceOnly => sys::sync(&self.src),
        }
        .map_err(|e| Error::Durability {
            role: FileRole::Source,
            source: e,
        })?;

        fs::remove_file(&self.src_path).map_err(|e| Error::Remove {
            path: self.src_path.clone(),
            source: e,
        })?;
        (self.report)(Event::Done);

        Ok(())
    }
}
