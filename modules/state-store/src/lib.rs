//! Content-addressed entity state: canonical hashing, change detection,
//! snapshot persistence and the per-environment commit ledger.

pub mod canonical;
pub mod diff;
pub mod ledger;

pub use canonical::{canonicalize, compute_hash};
pub use diff::{changed_paths, changed_scope, changed_state_paths};
pub use ledger::{append_ledger, read_ledger, CommitLedgerEntry};

use serde_json::Value;
use std::fs;
use std::io;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("state io: {0}")]
    Io(#[from] io::Error),
    #[error("state json: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Persisted {
    Unchanged { hash: String },
    Written { hash: String, snapshot_file: String },
}

impl Persisted {
    pub fn hash(&self) -> &str {
        match self {
            Persisted::Unchanged { hash } | Persisted::Written { hash, .. } => hash,
        }
    }
}

/// Parsed `latest.json`, or `None` when the entity has no state yet.
pub fn read_latest(latest: &Path) -> Result<Option<Value>, StateError> {
    match fs::read(latest) {
        Ok(data) => Ok(Some(serde_json::from_slice(&data)?)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Compare `snapshot` with the stored latest state. Returns whether they are
/// equal and the snapshot's hash.
pub fn is_unchanged(snapshot: &Value, latest: &Path) -> Result<(bool, String), StateError> {
    let hash = compute_hash(snapshot);
    let unchanged = match read_latest(latest)? {
        Some(prev) => compute_hash(&prev) == hash,
        None => false,
    };
    Ok((unchanged, hash))
}

/// Write `latest.json` and a new `snapshots/<stamp>_<hash>.json` unless the
/// state is unchanged, in which case nothing is written.
pub fn persist_if_changed(snapshot: &mut Value, latest: &Path, snapshots_dir: &Path, stamp: &str) -> Result<Persisted, StateError> {
    let (unchanged, hash) = is_unchanged(snapshot, latest)?;
    if unchanged {
        return Ok(Persisted::Unchanged { hash });
    }
    if let Some(obj) = snapshot.as_object_mut() {
        obj.insert("state_sha256".to_string(), Value::String(hash.clone()));
    }
    if let Some(parent) = latest.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::create_dir_all(snapshots_dir)?;

    let mut body = serde_json::to_vec_pretty(snapshot)?;
    body.push(b'\n');
    fs::write(latest, &body)?;
    let snapshot_file = format!("{}_{}.json", stamp, hash);
    fs::write(snapshots_dir.join(&snapshot_file), &body)?;
    tracing::debug!(latest = %latest.display(), %snapshot_file, "state persisted");
    Ok(Persisted::Written { hash, snapshot_file })
}
