//! Content sniffer for canonical type detection.
//!
//! Uses `infer` over a bounded content prefix. The file name is never
//! consulted: an extracted file named `invoice.pdf` that starts with an ELF
//! header is reported as ELF.

use crate::core::triage::TypeSniffResult;
use crate::error::{Result, TriageError};
use crate::triage::io::read_file_prefix;
use std::path::Path;
use tracing::debug;

/// Sniffer for content-based file type detection using `infer`.
pub struct ContentSniffer;

impl ContentSniffer {
    /// Sniff content from a byte slice.
    pub fn sniff_bytes(data: &[u8]) -> TypeSniffResult {
        match infer::get(data) {
            Some(kind) => {
                debug!(
                    "Content detected as {} ({})",
                    kind.mime_type(),
                    kind.extension()
                );
                TypeSniffResult::new(kind.extension(), kind.mime_type())
            }
            None => {
                debug!("No content type detected from {} bytes", data.len());
                TypeSniffResult::unknown()
            }
        }
    }

    /// Read at most `prefix_bytes` of `path` and sniff them.
    pub fn sniff_path(path: &Path, prefix_bytes: u64) -> Result<TypeSniffResult> {
        let prefix = read_file_prefix(path, prefix_bytes).map_err(|e| TriageError::io_at(path, e))?;
        Ok(Self::sniff_bytes(&prefix))
    }
}
