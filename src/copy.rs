use std::fs::File;
use std::io::{self, Read, Write};

use crate::error::{Error, FileRole, Result};
use crate::sys;

/// Reproduces ranges of the source in the destination, copying data extents
/// through a single reusable buffer and recreating holes by seeking past
/// them instead of writing zeros.
pub(crate) struct Copier {
    buf: Vec<u8>,
}

impl Copier {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            buf: vec![0; chunk_size.max(1)],
        }
    }

    /// Reproduces `len` source bytes in the destination. Both files must
    /// already be positioned at absolute offset `pos`.
    ///
    /// Hole lookups are cached: `SEEK_HOLE` is expensive on a fragmented
    /// file, so the last answer is kept until the cursor jumps past it.
    ///
    /// The hole scan is not bounded by `len`. That is sound only because the
    /// driver always takes blocks from the live end of the file, so nothing
    /// but end-of-file exists past `pos + len`. A different block order must
    /// revisit this.
    pub fn copy_range(&mut self, dst: &File, src: &File, mut pos: u64, mut len: u64) -> Result<()> {
        let mut next_hole = None;

        while len > 0 {
            let hole = match next_hole {
                Some(hole) => hole,
                None => {
                    let hole = sys::next_hole(src, pos)
                        .map_err(|e| Error::io("hole scan", FileRole::Source, e))?;
                    next_hole = Some(hole);
                    hole
                }
            };

            if hole == pos {
                // Sitting at the start of a hole. Find where data resumes and
                // skip the destination forward to it without writing, which
                // leaves the same range unallocated there.
                let Some(data) = sys::next_data(src, pos)
                    .map_err(|e| Error::io("data scan", FileRole::Source, e))?
                else {
                    // Only end-of-file ahead. The destination was extended to
                    // full length up front, so the trailing hole already
                    // exists and there is nothing left to write.
                    return Ok(());
                };

                sys::seek_to(dst, data).map_err(|e| Error::io("seek", FileRole::Destination, e))?;
                len = len.saturating_sub(data - pos);
                pos = data;
                next_hole = None;
            } else {
                // Inside a data extent: copy up to the next hole, capped at
                // the remaining range. The hole scan moved the source offset,
                // so put it back first.
                let run = (hole - pos).min(len);
                sys::seek_to(src, pos).map_err(|e| Error::io("seek", FileRole::Source, e))?;
                self.move_bytes(dst, src, run)?;
                pos += run;
                len -= run;
            }
        }

        Ok(())
    }

    /// Copies exactly `len` bytes from the current position of `src` to the
    /// current position of `dst`.
    ///
    /// An early end-of-file is fatal: the caller is about to truncate the
    /// source on the assumption that every one of these bytes landed in the
    /// destination.
    fn move_bytes(&mut self, dst: &File, src: &File, mut len: u64) -> Result<()> {
        let (mut src, mut dst) = (src, dst);

        while len > 0 {
            let want = (self.buf.len() as u64).min(len) as usize;
            let got = match src.read(&mut self.buf[..want]) {
                Ok(0) => return Err(Error::SourceShrank { missing: len }),
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::io("read", FileRole::Source, e)),
            };
            // write_all resumes short writes from the right offset.
            dst.write_all(&self.buf[..got])
                .map_err(|e| Error::io("write", FileRole::Destination, e))?;
            len -= got as u64;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Seek, SeekFrom, Write};

    use super::*;

    fn file_with(content: &[u8]) -> File {
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(content).unwrap();
        file.seek(SeekFrom::Start(0)).unwrap();
        file
    }

    #[test]
    fn move_bytes_copies_exactly_through_a_small_buffer() {
        let src = file_with(&[7u8; 1000]);
        let mut dst = tempfile::tempfile().unwrap();

        let mut copier = Copier::new(64);
        copier.move_bytes(&dst, &src, 1000).unwrap();

        dst.seek(SeekFrom::Start(0)).unwrap();
        let mut out = Vec::new();
        dst.read_to_end(&mut out).unwrap();
        assert_eq!(out, vec![7u8; 1000]);
    }

    #[test]
    fn move_bytes_stops_at_the_requested_length() {
        let src = file_with(b"abcdef");
        let mut dst = tempfile::tempfile().unwrap();

        Copier::new(4).move_bytes(&dst, &src, 3).unwrap();

        dst.seek(SeekFrom::Start(0)).unwrap();
        let mut out = Vec::new();
        dst.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"abc");
    }

    #[test]
    fn premature_eof_is_a_distinct_fatal_error() {
        let src = file_with(b"short");
        let dst = tempfile::tempfile().unwrap();

        let err = Copier::new(16).move_bytes(&dst, &src, 32).unwrap_err();
        match err {
            Error::SourceShrank { missing } => assert_eq!(missing, 32 - 5),
            other => panic!("expected SourceShrank, got {other:?}"),
        }
    }
}
