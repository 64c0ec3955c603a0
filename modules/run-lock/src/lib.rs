//! Advisory single-writer lock for a state repository.
//!
//! The lock is a JSON record at `<repo>/.netsec-state/lock`. A present,
//! parseable record is honoured unless it is stale: malformed, older than
//! [`STALE_AFTER_SECS`], or its holder's process is gone (or the pid was
//! reused by a process with a different start time).

mod procfs;

pub use procfs::ProcfsInspector;

use netsec_core::layout;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use time::OffsetDateTime;

pub const STALE_AFTER_SECS: i64 = 8 * 60 * 60;
pub const STALE_LOCK_REMOVED: &str = "stale_lock_removed";

#[derive(Debug, Error)]
pub enum LockError {
    #[error("ingest lock is currently held by an active process ({0})")]
    Held(String),
    #[error("lock io: {0}")]
    Io(#[from] io::Error),
    #[error("lock encode: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    pub pid: i64,
    pub started_at_utc: String,
    pub started_at_unix: i64,
    pub command: String,
    /// Start time of the holding process as seen by the liveness checker at
    /// acquisition. Absent when the checker could not report it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid_started_at_unix: Option<i64>,
}

/// Reports a process's own start time (unix seconds) by pid.
pub trait ProcessInspector {
    fn process_start_unix(&self, pid: i64) -> Option<i64>;
}

impl<F> ProcessInspector for F
where
    F: Fn(i64) -> Option<i64>,
{
    fn process_start_unix(&self, pid: i64) -> Option<i64> {
        self(pid)
    }
}

/// Acquire the repository lock for `pid`. Returns warnings (currently only
/// [`STALE_LOCK_REMOVED`]) on success.
pub fn acquire(repo: &Path, now: OffsetDateTime, pid: i64, command: &str, inspector: &dyn ProcessInspector) -> Result<Vec<String>, LockError> {
    let path = layout::lock_path(repo);
    if let Some(parent) = path.parent() { fs::create_dir_all(parent)?; }

    let mut warnings = Vec::new();
    match fs::read(&path) {
        Ok(data) => {
            if let Ok(current) = serde_json::from_slice::<LockRecord>(&data) {
                if !is_stale(&current, now, inspector) {
                    return Err(LockError::Held(format!("pid {} ({})", current.pid, current.command)));
                }
            }
            tracing::warn!(lock = %path.display(), "removing stale ingest lock");
            remove_if_present(&path)?;
            warnings.push(STALE_LOCK_REMOVED.to_string());
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    let record = LockRecord {
        pid,
        started_at_utc: netsec_core::timefmt::rfc3339(now),
        started_at_unix: now.unix_timestamp(),
        command: command.to_string(),
        pid_started_at_unix: inspector.process_start_unix(pid),
    };
    write_exclusive(&path, &serde_json::to_vec(&record)?, pid)?;
    Ok(warnings)
}

/// Remove the lock file. A missing lock is not an error.
pub fn release(repo: &Path) -> Result<(), LockError> {
    remove_if_present(&layout::lock_path(repo))?;
    Ok(())
}

pub fn read(repo: &Path) -> Result<LockRecord, LockError> {
    let data = fs::read(layout::lock_path(repo))?;
    Ok(serde_json::from_slice(&data)?)
}

pub fn is_stale(lock: &LockRecord, now: OffsetDateTime, inspector: &dyn ProcessInspector) -> bool {
    if lock.pid <= 0 || lock.started_at_unix <= 0 {
        return true;
    }
    if now.unix_timestamp() - lock.started_at_unix > STALE_AFTER_SECS {
        return true;
    }
    let expected = lock.pid_started_at_unix.unwrap_or(lock.started_at_unix);
    match inspector.process_start_unix(lock.pid) {
        Some(start) => start != expected,
        None => true,
    }
}

/// Held lock that is released when dropped.
#[derive(Debug)]
pub struct LockGuard {
    repo: PathBuf,
    warnings: Vec<String>,
}

impl LockGuard {
    pub fn acquire(repo: &Path, now: OffsetDateTime, pid: i64, command: &str, inspector: &dyn ProcessInspector) -> Result<Self, LockError> {
        let warnings = acquire(repo, now, pid, command, inspector)?;
        tracing::debug!(repo = %repo.display(), pid, "ingest lock acquired");
        Ok(LockGuard { repo: repo.to_path_buf(), warnings })
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = release(&self.repo) {
            tracing::warn!(repo = %self.repo.display(), error = %e, "failed to release ingest lock");
        }
    }
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

// The record is fully written to a private temp file and then hard-linked into
// place, so readers never observe a partial lock and a concurrent winner makes
// the link fail instead of being overwritten.
fn write_exclusive(path: &Path, body: &[u8], pid: i64) -> Result<(), LockError> {
    let tmp = path.with_file_name(format!("lock.tmp-{}", pid));
    fs::write(&tmp, body)?;
    let linked = fs::hard_link(&tmp, path);
    if let Err(e) = fs::remove_file(&tmp) {
        tracing::debug!(path = %tmp.display(), error = %e, "lock temp file left behind");
    }
    match linked {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Err(LockError::Held("lock created concurrently".to_string())),
        Err(e) => Err(e.into()),
    }
}
