//! Evidence collection helpers: raw block imaging, digests and enumeration
//! of disks and folders.

pub mod hash;

pub use hash::{hash_file, HashAlgorithm};

use crate::error::{Result, TriageError};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

pub const DEFAULT_BLOCK_SIZE: usize = 4096;

/// One block device as seen by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiskDescriptor {
    pub name: String,
    pub device: PathBuf,
    pub size_bytes: u64,
    pub removable: bool,
}

fn create_output(dst: &Path) -> Result<BufWriter<File>> {
    if let Some(parent) = dst.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| TriageError::io_at(parent, e))?;
    }
    let file = File::create(dst).map_err(|e| TriageError::io_at(dst, e))?;
    Ok(BufWriter::new(file))
}

fn pump<R: Read, W: Write>(src: &mut R, dst: &mut W, block_size: usize) -> std::io::Result<u64> {
    let mut buf = vec![0u8; block_size.max(1)];
    let mut total = 0u64;
    loop {
        let n = src.read(&mut buf)?;
        if n == 0 {
            return Ok(total);
        }
        dst.write_all(&buf[..n])?;
        total += n as u64;
    }
}

/// Copy `src` to `dst` block by block and return the bytes copied.
///
/// `src` may be a regular file or a raw device node.
pub fn copy_blocks(src: &Path, dst: &Path, block_size: usize) -> Result<u64> {
    let mut input = File::open(src).map_err(|e| TriageError::io_at(src, e))?;
    let mut output = create_output(dst)?;
    let copied = pump(&mut input, &mut output, block_size).map_err(|e| TriageError::io_at(src, e))?;
    output.flush().map_err(|e| TriageError::io_at(dst, e))?;
    info!(src = %src.display(), dst = %dst.display(), bytes = copied, "image written");
    Ok(copied)
}

/// Concatenate every regular file under `src` into one image at `dst`.
///
/// Files are visited in sorted path order so the same tree always produces
/// the same image.
pub fn image_folder(src: &Path, dst: &Path, block_size: usize) -> Result<u64> {
    let mut output = create_output(dst)?;
    let mut copied = 0u64;
    for entry in WalkDir::new(src).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| src.to_path_buf());
            TriageError::io_at(path, e.into())
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        debug!(path = %path.display(), "imaging file");
        let mut input = File::open(path).map_err(|e| TriageError::io_at(path, e))?;
        copied += pump(&mut input, &mut output, block_size).map_err(|e| TriageError::io_at(path, e))?;
    }
    output.flush().map_err(|e| TriageError::io_at(dst, e))?;
    info!(src = %src.display(), dst = %dst.display(), bytes = copied, "folder image written");
    Ok(copied)
}

/// Names of the immediate subdirectories of `dir`, sorted.
pub fn list_folders(dir: &Path) -> Result<Vec<String>> {
    let mut folders = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| TriageError::io_at(dir, e))? {
        let entry = entry.map_err(|e| TriageError::io_at(dir, e))?;
        if entry.path().is_dir() {
            folders.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    folders.sort();
    Ok(folders)
}

/// Physical block devices known to the kernel.
#[cfg(target_os = "linux")]
pub fn list_disks() -> Result<Vec<DiskDescriptor>> {
    list_disks_in(Path::new("/sys/block"))
}

/// Disk enumeration is only implemented on Linux.
#[cfg(not(target_os = "linux"))]
pub fn list_disks() -> Result<Vec<DiskDescriptor>> {
    Ok(Vec::new())
}

/// Read disk descriptors from a sysfs-style `block` directory.
///
/// Only entries with a `device` link are physical; loop and ram devices
/// are skipped. `size` is counted in 512-byte sectors.
pub fn list_disks_in(sys_block: &Path) -> Result<Vec<DiskDescriptor>> {
    let read_u64 = |p: PathBuf| -> u64 {
        fs::read_to_string(p)
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(0)
    };

    let mut disks = Vec::new();
    for entry in fs::read_dir(sys_block).map_err(|e| TriageError::io_at(sys_block, e))? {
        let entry = entry.map_err(|e| TriageError::io_at(sys_block, e))?;
        let base = entry.path();
        if !base.join("device").exists() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        disks.push(DiskDescriptor {
            device: PathBuf::from("/dev").join(&name),
            size_bytes: read_u64(base.join("size")).saturating_mul(512),
            removable: read_u64(base.join("removable")) == 1,
            name,
        });
    }
    disks.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(disks)
}
