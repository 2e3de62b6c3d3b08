//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use triagebox::rules::RuleSet;
use triagebox::triage::{Pipeline, TriageConfig};
use zip::write::FileOptions;
use zip::ZipWriter;

/// 1x1 RGBA PNG with no metadata chunks.
pub const PNG_1X1: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52,
    0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F, 0x15, 0xC4,
    0x89, 0x00, 0x00, 0x00, 0x0A, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x00, 0x01, 0x00, 0x00,
    0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4E, 0x44, 0xAE,
    0x42, 0x60, 0x82,
];

/// Ten bytes that match no sniffer and no signature.
pub const GARBAGE: &[u8] = b"\x13\x37qwerty\x01\x02";

pub const RULES: &str = r#"
rule png_header : image
{
    strings:
        $sig = { 89 50 4E 47 0D 0A 1A 0A }
    condition:
        $sig at 0
}

rule tiny_file
{
    condition:
        filesize <= 16
}
"#;

/// Build an in-memory zip from `(name, contents)` pairs, in order.
///
/// Names ending in `/` become directory entries.
pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in entries {
        if name.ends_with('/') {
            writer.add_directory(*name, FileOptions::default()).unwrap();
        } else {
            writer.start_file(*name, FileOptions::default()).unwrap();
            writer.write_all(data).unwrap();
        }
    }
    writer.finish().unwrap().into_inner()
}

pub fn write_zip(dir: &Path, name: &str, entries: &[(&str, &[u8])]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, zip_bytes(entries)).unwrap();
    path
}

/// Config rooted in `dir` with a small worker pool.
pub fn test_config(dir: &Path) -> TriageConfig {
    let mut config = TriageConfig::default();
    config.storage.upload_dir = dir.join("uploads");
    config.storage.extract_dir = dir.join("extracted");
    config.analysis.workers = 2;
    config
}

pub fn pipeline(config: TriageConfig) -> Pipeline {
    let rules = RuleSet::compile(RULES).unwrap();
    Pipeline::new(Arc::new(config), Arc::new(rules))
}

/// Number of entries left under `dir`.
pub fn count_entries(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}

/// Minimal JPEG whose EXIF block carries `Make = Canon`.
pub fn jpeg_with_make() -> Vec<u8> {
    let mut tiff = Vec::new();
    tiff.extend_from_slice(b"II\x2A\x00\x08\x00\x00\x00");
    tiff.extend_from_slice(&[0x01, 0x00]);
    tiff.extend_from_slice(&[
        0x0F, 0x01, 0x02, 0x00, 0x06, 0x00, 0x00, 0x00, 0x1A, 0x00, 0x00, 0x00,
    ]);
    tiff.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);
    tiff.extend_from_slice(b"Canon\0");

    let mut out = vec![0xFF, 0xD8, 0xFF, 0xE1];
    let len = (2 + 6 + tiff.len()) as u16;
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(b"Exif\0\0");
    out.extend_from_slice(&tiff);
    out.extend_from_slice(&[0xFF, 0xD9]);
    out
}

/// Single stored member whose data no longer matches its CRC.
pub fn corrupt_member_zip() -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let stored = FileOptions::default().compression_method(zip::CompressionMethod::Stored);
    writer.start_file("ledger.csv", stored).unwrap();
    writer.write_all(b"date,amount\n2024-01-01,100\n").unwrap();
    let mut bytes = writer.finish().unwrap().into_inner();
    let at = bytes.windows(6).position(|w| w == b"amount").unwrap();
    bytes[at] ^= 0x20;
    bytes
}
