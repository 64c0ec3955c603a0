//! Input resolution and the per-run scratch area under
//! `.netsec-state/extract/`.

use std::env;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, SystemTime};
use time::OffsetDateTime;
use tsf_parse::Files;
use walkdir::WalkDir;

pub const EXTRACT_STALE_AFTER: Duration = Duration::from_secs(24 * 60 * 60);

/// Absolute, lexically cleaned input files in byte order. Directories are
/// walked recursively; every regular file found is an input.
pub fn resolve_inputs(inputs: &[PathBuf]) -> io::Result<Vec<PathBuf>> {
    let cwd = env::current_dir()?;
    let mut out = Vec::new();
    for input in inputs {
        let abs = clean(&cwd.join(input));
        let meta = fs::metadata(&abs).map_err(|e| io::Error::new(e.kind(), format!("{}: {}", abs.display(), e)))?;
        if meta.is_dir() {
            walk_files(&abs, &mut out)?;
        } else {
            out.push(abs);
        }
    }
    out.sort();
    Ok(out)
}

/// Regular files under `dir` in file-name order. Symlinks are neither
/// followed nor returned.
fn walk_files(dir: &Path, out: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in WalkDir::new(dir).follow_links(false).sort_by_file_name() {
        let entry = entry?;
        if entry.file_type().is_file() {
            out.push(entry.into_path());
        }
    }
    Ok(())
}

fn clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for c in path.components() {
        match c {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Remove run directories under `extract_root` last modified more than
/// [`EXTRACT_STALE_AFTER`] before `now`. Failures become warnings.
pub fn cleanup_stale_extract_dirs(extract_root: &Path, now: OffsetDateTime) -> io::Result<Vec<String>> {
    fs::create_dir_all(extract_root)?;
    let now = SystemTime::from(now);
    let mut warnings = Vec::new();
    for entry in fs::read_dir(extract_root)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let modified = match entry.metadata().and_then(|m| if m.is_dir() { m.modified().map(Some) } else { Ok(None) }) {
            Ok(Some(t)) => t,
            Ok(None) => continue,
            Err(_) => {
                warnings.push(format!("extract_cleanup_stat_failed:{}", name));
                continue;
            }
        };
        if now.duration_since(modified).unwrap_or_default() <= EXTRACT_STALE_AFTER {
            continue;
        }
        match fs::remove_dir_all(entry.path()) {
            Ok(()) => tracing::info!(dir = %name, "removed stale extract directory"),
            Err(e) => {
                tracing::warn!(dir = %name, error = %e, "failed to remove stale extract directory");
                warnings.push(format!("extract_cleanup_remove_failed:{}", name));
            }
        }
    }
    Ok(warnings)
}

/// `<run_root>/<NNN>_<sanitized archive name>`, created.
pub fn begin_extract_dir(run_root: &Path, archive: &Path, index: usize) -> io::Result<PathBuf> {
    let base = archive.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    let dir = run_root.join(format!("{:03}_{}", index, sanitize_path_part(&base)));
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

pub fn finish_extract_dir(dir: &Path, keep: bool) {
    if keep {
        return;
    }
    if let Err(e) = fs::remove_dir_all(dir) {
        tracing::warn!(dir = %dir.display(), error = %e, "failed to remove extract directory");
    }
}

fn sanitize_path_part(s: &str) -> String {
    s.chars().map(|c| if matches!(c, '/' | '\\' | ' ' | ':') { '_' } else { c }).collect()
}

/// Every regular file under `dir`, keyed by its `/`-separated path relative
/// to `dir`.
pub fn read_extracted_files(dir: &Path) -> io::Result<Files> {
    let mut paths = Vec::new();
    walk_files(dir, &mut paths)?;
    let mut files = Files::new();
    for path in paths {
        let data = fs::read(&path)?;
        let rel = path.strip_prefix(dir).unwrap_or(&path);
        let key = rel.components().map(|c| c.as_os_str().to_string_lossy().into_owned()).collect::<Vec<_>>().join("/");
        files.insert(key, String::from_utf8_lossy(&data).into_owned());
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inputs_are_absolute_sorted_and_walked() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("batch/nested")).unwrap();
        fs::write(root.join("batch/b_ts.tgz"), "").unwrap();
        fs::write(root.join("batch/nested/a_ts.tgz"), "").unwrap();
        fs::write(root.join("z_ts.tgz"), "").unwrap();

        let got = resolve_inputs(&[root.join("z_ts.tgz"), root.join("batch/./nested/../")]).unwrap();
        assert_eq!(got, vec![root.join("batch/b_ts.tgz"), root.join("batch/nested/a_ts.tgz"), root.join("z_ts.tgz")]);
        assert!(resolve_inputs(&[root.join("missing.tgz")]).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_inside_input_dirs_are_not_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("batch")).unwrap();
        fs::create_dir_all(root.join("elsewhere")).unwrap();
        fs::write(root.join("elsewhere/hidden_ts.tgz"), "").unwrap();
        fs::write(root.join("batch/a_ts.tgz"), "").unwrap();
        std::os::unix::fs::symlink(root.join("elsewhere"), root.join("batch/linked-dir")).unwrap();
        std::os::unix::fs::symlink(root.join("elsewhere/hidden_ts.tgz"), root.join("batch/linked_ts.tgz")).unwrap();

        let got = resolve_inputs(&[root.join("batch")]).unwrap();
        assert_eq!(got, vec![root.join("batch/a_ts.tgz")]);
    }

    #[test]
    fn extract_dir_names_are_indexed_and_sanitized() {
        let dir = tempfile::tempdir().unwrap();
        let d = begin_extract_dir(dir.path(), Path::new("/in/my fw:1_ts.tgz"), 7).unwrap();
        assert_eq!(d.file_name().unwrap(), "007_my_fw_1_ts.tgz");
        assert!(d.is_dir());
        finish_extract_dir(&d, true);
        assert!(d.is_dir());
        finish_extract_dir(&d, false);
        assert!(!d.exists());
    }

    #[test]
    fn stale_run_dirs_are_removed() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("extract");
        fs::create_dir_all(root.join("run-old")).unwrap();
        fs::write(root.join("stray-file"), "x").unwrap();

        let now = OffsetDateTime::now_utc();
        assert!(cleanup_stale_extract_dirs(&root, now).unwrap().is_empty());
        assert!(root.join("run-old").exists());

        let later = now + time::Duration::hours(25);
        assert!(cleanup_stale_extract_dirs(&root, later).unwrap().is_empty());
        assert!(!root.join("run-old").exists());
        assert!(root.join("stray-file").exists());
    }

    #[test]
    fn extracted_files_use_relative_keys() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("tmp/cli")).unwrap();
        fs::write(dir.path().join("tmp/cli/fw_ts.tgz.txt"), "serial: S1\n").unwrap();
        fs::write(dir.path().join("show.txt"), [0x68, 0x69, 0xff]).unwrap();
        let files = read_extracted_files(dir.path()).unwrap();
        assert_eq!(files.keys().cloned().collect::<Vec<_>>(), vec!["show.txt".to_string(), "tmp/cli/fw_ts.tgz.txt".to_string()]);
        assert!(files["show.txt"].starts_with("hi"));
    }
}
