//! Archive expansion into a per-request scratch root.
//!
//! Entries are written in archive order. Every resolved path is confined
//! under the destination, and expansion is capped by entry count, per-file
//! bytes and total bytes. Declared entry sizes are not trusted: all copies go
//! through [`copy_bounded`], so the caps hold against lying headers.

use crate::error::{Result, TriageError};
use crate::triage::config::ExtractionConfig;
use crate::triage::io::{copy_bounded, CopyError};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};
use zip::result::ZipError;
use zip::ZipArchive;

const S_IFMT: u32 = 0o170000;
const S_IFLNK: u32 = 0o120000;

/// A regular file written out of the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedFile {
    /// Path inside the archive, normalized.
    pub relative_path: PathBuf,
    /// Absolute location on scratch storage.
    pub path: PathBuf,
    pub size_bytes: u64,
}

impl ExtractedFile {
    /// Final path component, as reported to clients.
    pub fn file_name(&self) -> String {
        self.relative_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.relative_path.to_string_lossy().into_owned())
    }
}

/// Expand the zip archive at `archive_path` under `dest`.
///
/// Returns one [`ExtractedFile`] per distinct regular-file path, in the order
/// each path first appears. A repeated path overwrites the earlier content.
/// Symbolic links and password-protected entries are skipped.
pub fn extract_archive(
    archive_path: &Path,
    dest: &Path,
    limits: &ExtractionConfig,
) -> Result<Vec<ExtractedFile>> {
    let file = File::open(archive_path).map_err(|e| TriageError::io_at(archive_path, e))?;
    let mut archive = ZipArchive::new(BufReader::new(file))
        .map_err(|e| TriageError::ArchiveOpen(e.to_string()))?;

    let entry_count = archive.len() as u64;
    if entry_count > limits.max_entries {
        return Err(TriageError::ArchiveTooLarge {
            resource: "entries",
            used: entry_count,
            limit: limits.max_entries,
        });
    }

    let mut files: Vec<ExtractedFile> = Vec::new();
    let mut seen: HashMap<PathBuf, usize> = HashMap::new();
    let mut total: u64 = 0;

    for i in 0..archive.len() {
        let mut entry = match archive.by_index(i) {
            Ok(entry) => entry,
            Err(ZipError::UnsupportedArchive(msg)) if msg == ZipError::PASSWORD_REQUIRED => {
                warn!(index = i, "skipping encrypted archive entry");
                continue;
            }
            Err(e) => return Err(TriageError::archive_entry(format!("#{}", i), e)),
        };
        let name = entry.name().to_string();

        let relative = entry
            .enclosed_name()
            .and_then(normalize_entry_path)
            .ok_or_else(|| TriageError::PathTraversal { entry: name.clone() })?;
        let target = dest.join(&relative);
        if !target.starts_with(dest) {
            return Err(TriageError::PathTraversal { entry: name });
        }

        if let Some(reason) = path_conflict(dest, &relative, entry.is_dir()) {
            return Err(TriageError::archive_entry(name, reason));
        }

        if entry.is_dir() {
            fs::create_dir_all(&target).map_err(|e| TriageError::io_at(&target, e))?;
            continue;
        }
        if entry.unix_mode().is_some_and(|m| m & S_IFMT == S_IFLNK) {
            warn!(entry = %name, "skipping symbolic link entry");
            continue;
        }
        if relative.as_os_str().is_empty() {
            warn!(entry = %name, "skipping entry with empty path");
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| TriageError::io_at(parent, e))?;
        }

        let remaining = limits.max_total_bytes.saturating_sub(total);
        let cap = limits.max_file_bytes.min(remaining);
        let out = File::create(&target).map_err(|e| TriageError::io_at(&target, e))?;
        let mut writer = BufWriter::new(out);
        let copied = copy_bounded(&mut entry, &mut writer, cap).map_err(|e| match e {
            CopyError::Read(e) => TriageError::archive_entry(name.as_str(), e),
            CopyError::Write(e) => TriageError::io_at(&target, e),
        })?;
        writer.flush().map_err(|e| TriageError::io_at(&target, e))?;

        if copied.truncated {
            let used = entry.size().max(copied.bytes_written + 1);
            return Err(if limits.max_file_bytes <= remaining {
                TriageError::ArchiveTooLarge {
                    resource: "file bytes",
                    used,
                    limit: limits.max_file_bytes,
                }
            } else {
                TriageError::ArchiveTooLarge {
                    resource: "total bytes",
                    used: total + used,
                    limit: limits.max_total_bytes,
                }
            });
        }
        total += copied.bytes_written;

        debug!(entry = %name, bytes = copied.bytes_written, "extracted");
        match seen.get(&relative) {
            Some(&idx) => {
                warn!(entry = %name, "duplicate archive path overwritten");
                files[idx].size_bytes = copied.bytes_written;
            }
            None => {
                seen.insert(relative.clone(), files.len());
                files.push(ExtractedFile {
                    relative_path: relative,
                    path: target,
                    size_bytes: copied.bytes_written,
                });
            }
        }
    }

    debug!(files = files.len(), bytes = total, "archive expanded");
    Ok(files)
}

/// Whether writing `relative` under `dest` would collide with something an
/// earlier entry created: a file where a directory is needed, or the reverse.
fn path_conflict(dest: &Path, relative: &Path, is_dir: bool) -> Option<&'static str> {
    let mut prefix = dest.to_path_buf();
    let mut components = relative.components().peekable();
    while let Some(component) = components.next() {
        prefix.push(component);
        let Ok(meta) = fs::symlink_metadata(&prefix) else {
            return None;
        };
        let last = components.peek().is_none();
        if !last && !meta.is_dir() {
            return Some("a parent directory is already a file");
        }
        if last && is_dir && !meta.is_dir() {
            return Some("directory path is already a file");
        }
        if last && !is_dir && meta.is_dir() {
            return Some("file path is already a directory");
        }
    }
    None
}

/// Lexically resolve an entry name to a relative path that stays inside the
/// root. `None` when the name is absolute or climbs above the root.
fn normalize_entry_path(name: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in name.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    return None;
                }
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(out)
}
