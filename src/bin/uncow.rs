use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use uncow::{uncow_with, Event, NocowPolicy, Options, SyncMode};

/// Convert a copy-on-write file into a NoCoW copy, in place.
///
/// The source is drained into the destination block by block and removed at
/// the end, so free space on the order of one block (not one file) is enough.
/// If interrupted, rerun with the same two paths to resume.
#[derive(Parser)]
#[command(version, about)]
struct Args {
    /// The CoW file to migrate. Destroyed as migration progresses.
    source: PathBuf,

    /// Where the NoCoW copy is created.
    destination: PathBuf,

    /// Only flush the source file at the end instead of syncing its whole
    /// filesystem. Faster, but space freed by the migration is reclaimed
    /// lazily.
    #[arg(long)]
    no_syncfs: bool,

    /// Fail instead of warning when the filesystem rejects the NoCoW
    /// attribute.
    #[arg(long)]
    require_nocow: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let options = Options {
        sync: if args.no_syncfs {
            SyncMode::SourceOnly
        } else {
            SyncMode::Filesystem
        },
        nocow: if args.require_nocow {
            NocowPolicy::Require
        } else {
            NocowPolicy::BestEffort
        },
        ..Options::default()
    };

    let result = uncow_with(&args.source, &args.destination, &options, |event| {
        match event {
            Event::Created { len } => {
                println!(
                    "Created new file '{}' ({len} bytes)",
                    args.destination.display()
                );
            }
            Event::Resumed { remaining } => {
                println!(
                    "Continuing with existing file '{}' ({remaining} bytes left)",
                    args.destination.display()
                );
            }
            Event::NoCowFailed(err) => {
                eprintln!(
                    "warning: failed to set the NoCoW attribute on '{}': {err}",
                    args.destination.display()
                );
            }
            Event::Block { pos, .. } => println!("Copying from position {pos}..."),
            Event::Syncing => {
                println!(
                    "Copying done. Syncing, which can take a while if the \
                     CoW file was heavily fragmented..."
                );
            }
            Event::Done => println!("Removed emptied '{}'.", args.source.display()),
        }
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprint!("uncow: {err}");
            let mut source = std::error::Error::source(&err);
            while let Some(cause) = source {
                eprint!(": {cause}");
                source = cause.source();
            }
            eprintln!();
            ExitCode::FAILURE
        }
    }
}
