//! Some file systems implement COW (copy on write) functionality: writes to a
//! file allocate fresh blocks instead of overwriting in place. Under workloads
//! with frequent small in-place writes (VM images, databases) this fragments
//! the file badly. The usual fix is to recreate the file with the NoCoW
//! attribute set, but a plain copy needs free space for a second full copy of
//! the file, and a crash halfway leaves you guessing which half is good.
//!
//! This library migrates a file into a NoCoW copy *in place*: it walks the
//! source from its end toward its beginning in large blocks, copies each
//! block's allocated extents into the destination (reproducing holes as
//! holes), makes the destination bytes durable, and only then truncates the
//! copied block off the source. The blocks freed by truncation are reused
//! for the blocks still to be written, so peak extra space is roughly one
//! block, not one file.
//!
//! The two file lengths are the only progress state. If the process is killed
//! at any point, rerunning it with the same two paths resumes exactly where
//! the last durable block ended; the destination prefix already migrated is
//! never touched again.
//!
//! Only Unix-like systems are supported; the NoCoW attribute itself is
//! Linux-only (btrfs). On other filesystems the attribute step fails and is,
//! by default, reported and skipped; the result is still a correct copy.

use std::io;
use std::path::Path;

use cfg_if::cfg_if;

mod error;

pub use error::{Error, FileRole, Result};

cfg_if! {
    if #[cfg(unix)] {
        mod copy;
        mod migrate;
        mod sys;

        use migrate::Migration;
    }
}

/// How the containing filesystem is synchronized once the source is drained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    /// Sync the whole filesystem holding the source. Slow on a heavily
    /// fragmented filesystem, but space freed by the truncations is reclaimed
    /// before the source is removed.
    #[default]
    Filesystem,
    /// Only flush the source file itself. Faster; the filesystem reclaims the
    /// freed extents at its leisure.
    SourceOnly,
}

/// What to do when the filesystem refuses the NoCoW attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NocowPolicy {
    /// Report [`Event::NoCowFailed`] and carry on. The migration still
    /// produces a correct copy, it just stays CoW.
    #[default]
    BestEffort,
    /// Fail with [`Error::NoCow`]. Use this when a CoW destination would
    /// defeat the point of running the tool at all.
    Require,
}

/// Tuning knobs for [`uncow_with`].
#[derive(Debug, Clone)]
pub struct Options {
    /// Bytes migrated (and made durable, and truncated off the source) per
    /// loop iteration. Large, to amortize the per-block flushes and hole
    /// scans; this also bounds how much work a crash can lose.
    pub block_size: u64,
    /// Size of the single reusable copy buffer. Bounds peak memory.
    pub chunk_size: usize,
    pub sync: SyncMode,
    pub nocow: NocowPolicy,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            block_size: 1024 * 1024 * 1024,
            chunk_size: 32 * 1024 * 1024,
            sync: SyncMode::default(),
            nocow: NocowPolicy::default(),
        }
    }
}

/// Progress notifications delivered to the callback of [`uncow_with`].
#[derive(Debug)]
pub enum Event {
    /// Fresh run: the destination was created and extended to `len` bytes.
    Created { len: u64 },
    /// The destination already existed; resuming with `remaining` source
    /// bytes still to migrate.
    Resumed { remaining: u64 },
    /// The NoCoW attribute could not be set and
    /// [`NocowPolicy::BestEffort`] is in effect.
    NoCowFailed(io::Error),
    /// The block `[pos, pos + len)` is about to be copied. Positions are
    /// strictly decreasing and end at 0.
    Block { pos: u64, len: u64 },
    /// All blocks are durable; the final filesystem sync is starting.
    Syncing,
    /// The emptied source has been removed. Terminal.
    Done,
}

/// Migrates the file at `from` into a NoCoW copy at `to` with default
/// [`Options`], discarding progress events.
///
/// This is destructive: the source is truncated block by block as migration
/// proceeds and removed once empty. Interrupting the process is safe: call
/// again with the same two paths to resume.
///
/// ```no_run
/// match uncow::uncow("vm.img", "vm.img.nocow") {
///     Ok(()) => println!("file has been migrated"),
///     Err(e) => println!("error while migrating: {:?}", e),
/// }
/// ```
pub fn uncow<P: AsRef<Path>, Q: AsRef<Path>>(from: P, to: Q) -> Result<()> {
    uncow_with(from, to, &Options::default(), |_| ())
}

/// Migrates the file at `from` into a NoCoW copy at `to`.
///
/// `report` receives an [`Event`] at each state transition: whether the run
/// is fresh or resumed, one event per block before it is copied, and the
/// terminal sync/removal steps. The returned `Result` is the success/failure
/// signal.
///
/// ```no_run
/// use uncow::{uncow_with, Event, Options};
///
/// let result = uncow_with("vm.img", "vm.img.nocow", &Options::default(), |event| {
///     if let Event::Block { pos, .. } = event {
///         println!("copying from position {pos}...");
///     }
/// });
/// ```
pub fn uncow_with<P, Q, F>(from: P, to: Q, options: &Options, report: F) -> Result<()>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
    F: FnMut(Event),
{
    let (from, to) = (from.as_ref(), to.as_ref());

    #[cfg(unix)]
    {
        Migration::prepare(from, to, options, report)?.run()
    }
    #[cfg(not(unix))]
    {
        let _ = (from, to, options, report);
        Err(Error::Unsupported)
    }
}
