//! `.netsec-state/ingest.ndjson`: one line per archive attempt, across runs
//! and environments.

use crate::IngestError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestLogEntry {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub attempted_at_utc: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub run_id: String,
    pub env_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub input_archive_path: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub tsf_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub entity_type: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub entity_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub result: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub git_commit: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub notes: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub error: String,
}

pub fn append_ingest_attempt(path: &Path, entry: &IngestLogEntry) -> Result<(), IngestError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut line = serde_json::to_vec(entry)?;
    line.push(b'\n');
    let mut f = OpenOptions::new().create(true).append(true).open(path)?;
    f.write_all(&line)?;
    Ok(())
}

/// TSF ids already attempted in `env_id`.
pub fn read_seen_tsf_ids(path: &Path, env_id: &str) -> Result<HashSet<String>, IngestError> {
    let mut seen = HashSet::new();
    let f = match fs::File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(seen),
        Err(e) => return Err(e.into()),
    };
    for line in BufReader::new(f).lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let entry: IngestLogEntry = serde_json::from_str(line)?;
        if entry.env_id == env_id && !entry.tsf_id.is_empty() {
            seen.insert(entry.tsf_id);
        }
    }
    Ok(seen)
}
