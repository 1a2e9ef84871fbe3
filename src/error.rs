use std::fmt;
use std::io;
use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

/// Which of the two files an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileRole {
    Source,
    Destination,
}

impl fmt::Display for FileRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FileRole::Source => "source",
            FileRole::Destination => "destination",
        })
    }
}

/// Everything that can abort a migration.
///
/// None of these are recovered from internally. Each block's truncation is
/// only issued after the matching destination bytes are durable, so whatever
/// the failure, rerunning with the same two paths resumes safely.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("cannot open {role} '{}'", path.display())]
    Open {
        role: FileRole,
        path: PathBuf,
        source: io::Error,
    },

    #[error("cannot stat {role} '{}'", path.display())]
    Stat {
        role: FileRole,
        path: PathBuf,
        source: io::Error,
    },

    #[error("cannot disable copy-on-write on '{}' (not a CoW filesystem?)", path.display())]
    NoCow { path: PathBuf, source: io::Error },

    #[error("{op} failed on {role}")]
    Io {
        op: &'static str,
        role: FileRole,
        source: io::Error,
    },

    #[error("flush of {role} failed")]
    Durability { role: FileRole, source: io::Error },

    #[error("cannot set {role} length to {len}")]
    Truncate {
        role: FileRole,
        len: u64,
        source: io::Error,
    },

    /// The source reported end-of-file with `missing` bytes still owed.
    ///
    /// This is an assumption violation, not a transient device failure: the
    /// file shrank underneath us, and truncating the source as if the bytes
    /// had been copied would lose them. Distinct from [`Error::Io`] so
    /// callers can tell the two apart.
    #[error("source ended {missing} bytes early, refusing to continue")]
    SourceShrank { missing: u64 },

    #[error("cannot remove emptied source '{}'", path.display())]
    Remove { path: PathBuf, source: io::Error },

    #[error("copy-on-write migration is not supported on {}-{}-{}",
            std::env::consts::ARCH, std::env::consts::OS, std::env::consts::FAMILY)]
    Unsupported,
}

impl Error {
    pub(crate) fn io(op: &'static str, role: FileRole, source: io::Error) -> Self {
        Error::Io { op, role, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Setup errors must name the file they failed on, not just its role.
    #[test]
    fn setup_errors_name_the_failing_path() {
        let err = Error::Stat {
            role: FileRole::Source,
            path: PathBuf::from("/some/vm.img"),
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        };
        assert_eq!(err.to_string(), "cannot stat source '/some/vm.img'");

        let err = Error::Open {
            role: FileRole::Destination,
            path: PathBuf::from("/some/vm.img.nocow"),
            source: io::Error::from(io::ErrorKind::NotFound),
        };
        assert_eq!(
            err.to_string(),
            "cannot open destination '/some/vm.img.nocow'"
        );
    }
}
