//! Safe extraction of gzip-compressed tech-support tarballs.

use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tar::{Archive, EntryType};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported archive type: {0}")]
    UnsupportedType(PathBuf),
    #[error("unsafe archive entry path: {0:?}")]
    UnsafePath(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub fn is_supported_archive(path: &Path) -> bool {
    let name = path.file_name().map(|n| n.to_string_lossy().to_lowercase()).unwrap_or_default();
    name.ends_with(".tgz") || name.ends_with(".tar.gz")
}

/// Unpack `archive` under `root`. Entries are written as they are read, so a
/// failure part way leaves the earlier entries in place.
pub fn extract(archive: &Path, root: &Path) -> Result<(), ExtractError> {
    if !is_supported_archive(archive) {
        return Err(ExtractError::UnsupportedType(archive.to_path_buf()));
    }
    let mut tar = Archive::new(GzDecoder::new(File::open(archive)?));
    let mut files = 0usize;
    for entry in tar.entries()? {
        let mut entry = entry?;
        let name = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
        let target = safe_target(root, &name)?;
        match entry.header().entry_type() {
            EntryType::Directory => fs::create_dir_all(&target)?,
            EntryType::Regular | EntryType::Continuous => {
                if let Some(parent) = target.parent() { fs::create_dir_all(parent)?; }
                let mut out = File::create(&target)?;
                io::copy(&mut entry, &mut out)?;
                files += 1;
            }
            EntryType::Symlink | EntryType::Link => return Err(ExtractError::UnsafePath(name)),
            other => tracing::debug!(entry = %name, kind = ?other, "skipping non-file archive entry"),
        }
    }
    tracing::debug!(archive = %archive.display(), files, "archive extracted");
    Ok(())
}

/// Resolve an archive entry name to a path under `root`, rejecting anything
/// that is empty, absolute or climbs above the root. `.` and `./` resolve to
/// the root itself.
pub fn safe_target(root: &Path, entry_name: &str) -> Result<PathBuf, ExtractError> {
    let name = entry_name.trim();
    let unsafe_path = || ExtractError::UnsafePath(entry_name.to_string());
    if name.is_empty() || name.starts_with('/') {
        return Err(unsafe_path());
    }
    let mut parts: Vec<&str> = Vec::new();
    for part in name.split('/') {
        match part {
            "" | "." => {}
            ".." => { parts.pop().ok_or_else(unsafe_path)?; }
            p => parts.push(p),
        }
    }
    Ok(parts.iter().fold(root.to_path_buf(), |acc, p| acc.join(p)))
}
