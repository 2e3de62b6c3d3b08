//! Magic-byte signature scanner.
//!
//! Every table entry is tested against the start of the content and every
//! matching label is reported, in table order. The scan never stops at the
//! first hit: overlapping interpretations (an OOXML document is also a ZIP
//! archive) are all surfaced for the analyst.

use crate::error::{Result, TriageError};
use crate::triage::io::read_file_prefix;
use std::path::Path;

/// Known prefixes and their labels. Order is evaluation and report order.
pub const SIGNATURES: &[(&[u8], &str)] = &[
    (b"\xFF\xD8\xFF", "JPEG image"),
    (b"\x89PNG\r\n\x1a\n", "PNG image"),
    (b"\x47\x49\x46\x38", "GIF image"),
    (b"\x42\x4D", "BMP image"),
    (b"\x00\x00\x01\x00", "ICO image"),
    (b"\x25\x50\x44\x46", "PDF document"),
    (
        b"\x50\x4B\x03\x04",
        "ZIP archive or Microsoft Office Open XML (DOCX, XLSX, PPTX)",
    ),
    (b"\x1F\x8B", "GZIP archive"),
    (b"\x42\x5A\x68", "BZIP2 archive"),
    (b"\x37\x7A\xBC\xAF\x27\x1C", "7-Zip archive"),
    (b"\x75\x73\x74\x61\x72", "TAR archive"),
    (b"\xD0\xCF\x11\xE0", "Microsoft Office document (OLE)"),
    (b"\x00\x01\xBA", "MPEG video"),
    (b"\x00\x00\x01\xB3", "MPEG video"),
    (b"\x1A\x45\xDF\xA3", "Matroska video (MKV)"),
    (b"\x66\x74\x79\x70", "MP4 video"),
    (b"\x4F\x67\x67\x53", "OGG audio/video"),
    (b"\x52\x49\x46\x46", "AVI or WAV file"),
    (b"\x49\x44\x33", "MP3 audio"),
    (b"\x25\x21", "PostScript document"),
    (b"\x3C\x3F\x78\x6D\x6C\x20", "XML document"),
    (b"\x7B\x5C\x72\x74\x66", "Rich Text Format (RTF)"),
    (b"\xED\xAB\xEE\xDB", "RPM Package"),
    (b"\x4D\x5A", "Windows Executable (EXE)"),
    (b"\x7F\x45\x4C\x46", "Linux ELF Executable"),
    (b"\xCA\xFE\xBA\xBE", "Java class file"),
    (b"\x6D\x6F\x6F\x76", "QuickTime movie (MOV)"),
    (b"\xFF\xFB", "MP3 audio file"),
];

/// Length of the longest signature; reading this many bytes is sufficient.
pub fn max_signature_len() -> usize {
    SIGNATURES.iter().map(|(sig, _)| sig.len()).max().unwrap_or(0)
}

/// Collect every label whose signature is a prefix of `data`.
pub fn scan_bytes(data: &[u8]) -> Vec<String> {
    scan_with(SIGNATURES, data)
}

/// Scan `data` against an arbitrary signature table.
pub fn scan_with(table: &[(&[u8], &str)], data: &[u8]) -> Vec<String> {
    table
        .iter()
        .filter(|(sig, _)| data.starts_with(sig))
        .map(|(_, label)| (*label).to_string())
        .collect()
}

/// Scan the head of a file against the signature table.
pub fn scan_path(path: &Path) -> Result<Vec<String>> {
    let prefix = read_file_prefix(path, max_signature_len() as u64)
        .map_err(|e| TriageError::io_at(path, e))?;
    Ok(scan_bytes(&prefix))
}
