use crate::StateError;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

/// One line of `envs/<env>/state/commits.ndjson`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommitLedgerEntry {
    pub committed_at_utc: String,
    pub tsf_id: String,
    pub tsf_original_name: String,
    pub entity_type: String,
    pub entity_id: String,
    pub state_sha256: String,
    pub git_commit: String,
    pub changed_scope: String,
    pub changed_paths: Vec<String>,
}

pub fn append_ledger(path: &Path, entry: &CommitLedgerEntry) -> Result<(), StateError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut line = serde_json::to_vec(entry)?;
    line.push(b'\n');
    let mut f = OpenOptions::new().create(true).append(true).open(path)?;
    f.write_all(&line)?;
    Ok(())
}

pub fn read_ledger(path: &Path) -> Result<Vec<CommitLedgerEntry>, StateError> {
    let body = match fs::read_to_string(path) {
        Ok(b) => b,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut out = Vec::new();
    for line in body.lines().filter(|l| !l.trim().is_empty()) {
        out.push(serde_json::from_str(line)?);
    }
    Ok(out)
}
