//! Bounded reads over untrusted scratch files.
//!
//! The sniffer and the signature scanner only ever look at a prefix, and
//! extraction copies entries through [`copy_bounded`] so a member's declared
//! size is never trusted.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;
use tracing::trace;

/// Default prefix read for content sniffing (8KB)
pub const MAX_SNIFF_SIZE: u64 = 8192;

const COPY_CHUNK: usize = 64 * 1024;

/// Read at most `prefix_size` bytes from the start of `path`.
pub fn read_file_prefix<P: AsRef<Path>>(path: P, prefix_size: u64) -> io::Result<Vec<u8>> {
    let file = File::open(path.as_ref())?;
    let len = file.metadata()?.len().min(prefix_size);
    let mut data = Vec::with_capacity(usize::try_from(len).unwrap_or(0));
    file.take(prefix_size).read_to_end(&mut data)?;
    Ok(data)
}

/// Outcome of a bounded copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundedCopy {
    pub bytes_written: u64,
    /// The source still had data when the limit was reached.
    pub truncated: bool,
}

/// Which side of a copy failed.
#[derive(Debug)]
pub enum CopyError {
    /// The source could not be read (for archive members: corrupt data).
    Read(io::Error),
    /// The destination could not be written.
    Write(io::Error),
}

/// Copy at most `limit` bytes from `reader` into `writer`, reporting
/// whether the source held more.
///
/// Below the limit the source is read to EOF, so readers that verify a
/// checksum at end of stream get to report a mismatch.
pub fn copy_bounded<R: Read, W: Write>(
    reader: &mut R,
    writer: &mut W,
    limit: u64,
) -> Result<BoundedCopy, CopyError> {
    let mut buf = vec![0u8; COPY_CHUNK];
    let mut written: u64 = 0;

    while written < limit {
        let want = usize::try_from(limit - written).map_or(buf.len(), |r| r.min(buf.len()));
        let n = match reader.read(&mut buf[..want]) {
            Ok(0) => {
                return Ok(BoundedCopy {
                    bytes_written: written,
                    truncated: false,
                })
            }
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(CopyError::Read(e)),
        };
        writer.write_all(&buf[..n]).map_err(CopyError::Write)?;
        written += n as u64;
    }

    let mut one = [0u8; 1];
    let truncated = loop {
        match reader.read(&mut one) {
            Ok(n) => break n > 0,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(CopyError::Read(e)),
        }
    };
    trace!(limit, truncated, "bounded copy reached limit");
    Ok(BoundedCopy {
        bytes_written: written,
        truncated,
    })
}
