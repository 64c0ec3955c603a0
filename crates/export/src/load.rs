use crate::ExportError;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fs;
use std::io;
use std::path::Path;

/// A stored `latest.json`, kept both as raw JSON for environment.json and
/// decoded for the tabular exports.
#[derive(Debug, Clone)]
pub struct Loaded<T> {
    pub value: Value,
    pub snapshot: T,
}

/// Read `<dir>/<id>/latest.json` for every entity directory, in id order.
/// A missing kind directory yields nothing.
pub fn load_entities<T: DeserializeOwned>(dir: &Path) -> Result<Vec<Loaded<T>>, ExportError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut dirs = Vec::new();
    for entry in entries {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();

    let mut out = Vec::with_capacity(dirs.len());
    for d in dirs {
        let latest = d.join("latest.json");
        let data = match fs::read(&latest) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(dir = %d.display(), "entity without latest.json skipped");
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        let value: Value = serde_json::from_slice(&data)?;
        let snapshot = serde_json::from_value(value.clone())?;
        out.push(Loaded { value, snapshot });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tsf_parse::FirewallSnapshot;

    #[test]
    fn loads_in_id_order_and_skips_incomplete() {
        let dir = tempfile::tempdir().unwrap();
        for (id, host) in [("S2", "fw-two"), ("S1", "fw-one")] {
            let d = dir.path().join(id);
            fs::create_dir_all(&d).unwrap();
            fs::write(d.join("latest.json"), format!(r#"{{"device":{{"id":"{}","hostname":"{}"}}}}"#, id, host)).unwrap();
        }
        fs::create_dir_all(dir.path().join("S3/snapshots")).unwrap();

        let loaded: Vec<Loaded<FirewallSnapshot>> = load_entities(dir.path()).unwrap();
        let ids: Vec<&str> = loaded.iter().map(|l| l.snapshot.device.id.as_str()).collect();
        assert_eq!(ids, vec!["S1", "S2"]);
        assert_eq!(loaded[0].value["device"]["hostname"], "fw-one");
        assert_eq!(loaded[0].snapshot.ha.mode, "unknown");
    }

    #[test]
    fn missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let loaded: Vec<Loaded<FirewallSnapshot>> = load_entities(&dir.path().join("devices")).unwrap();
        assert!(loaded.is_empty());
    }
}
