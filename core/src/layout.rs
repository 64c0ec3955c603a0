//! Persisted repository layout.
//!
//! ```text
//! <repo>/.netsec-state/lock
//! <repo>/.netsec-state/extract/<run>/...
//! <repo>/.netsec-state/ingest.ndjson
//! <repo>/envs/<env>/state/{devices,panorama}/<id>/latest.json
//! <repo>/envs/<env>/state/{devices,panorama}/<id>/snapshots/<stamp>_<hash>.json
//! <repo>/envs/<env>/state/commits.ndjson
//! <repo>/envs/<env>/exports/*
//! <repo>/envs/<env>/overrides/topology_links.json
//! ```

use crate::EntityKind;
use std::path::{Path, PathBuf};

pub const STATE_DIR: &str = ".netsec-state";
pub const ENVS_DIR: &str = "envs";

/// Files regenerated by the export pipeline, relative to `envs/<env>/exports`.
pub const EXPORT_FILES: &[&str] = &[
    "environment.json",
    "inventory.csv",
    "nodes.csv",
    "edges.csv",
    "topology.mmd",
    "agent_context.md",
];

pub fn state_dir(repo: &Path) -> PathBuf { repo.join(STATE_DIR) }
pub fn lock_path(repo: &Path) -> PathBuf { state_dir(repo).join("lock") }
pub fn extract_root(repo: &Path) -> PathBuf { state_dir(repo).join("extract") }
pub fn ingest_log_path(repo: &Path) -> PathBuf { state_dir(repo).join("ingest.ndjson") }

pub fn envs_dir(repo: &Path) -> PathBuf { repo.join(ENVS_DIR) }
pub fn env_root(repo: &Path, env_id: &str) -> PathBuf { envs_dir(repo).join(env_id) }
pub fn env_state_dir(repo: &Path, env_id: &str) -> PathBuf { env_root(repo, env_id).join("state") }
pub fn exports_dir(repo: &Path, env_id: &str) -> PathBuf { env_root(repo, env_id).join("exports") }
pub fn overrides_dir(repo: &Path, env_id: &str) -> PathBuf { env_root(repo, env_id).join("overrides") }
pub fn topology_overrides_path(repo: &Path, env_id: &str) -> PathBuf { overrides_dir(repo, env_id).join("topology_links.json") }
pub fn commit_ledger_path(repo: &Path, env_id: &str) -> PathBuf { env_state_dir(repo, env_id).join("commits.ndjson") }

pub fn entity_dir(repo: &Path, env_id: &str, kind: EntityKind, entity_id: &str) -> PathBuf {
    env_state_dir(repo, env_id).join(kind.state_dir()).join(entity_id)
}

pub fn latest_path(repo: &Path, env_id: &str, kind: EntityKind, entity_id: &str) -> PathBuf {
    entity_dir(repo, env_id, kind, entity_id).join("latest.json")
}

pub fn snapshots_dir(repo: &Path, env_id: &str, kind: EntityKind, entity_id: &str) -> PathBuf {
    entity_dir(repo, env_id, kind, entity_id).join("snapshots")
}

/// Repo-relative, forward-slash paths recorded in the commit ledger.
pub mod rel {
    use crate::EntityKind;

    pub fn commit_ledger(env_id: &str) -> String {
        format!("envs/{}/state/commits.ndjson", env_id)
    }

    pub fn latest(env_id: &str, kind: EntityKind, entity_id: &str) -> String {
        format!("envs/{}/state/{}/{}/latest.json", env_id, kind.state_dir(), entity_id)
    }

    pub fn snapshot(env_id: &str, kind: EntityKind, entity_id: &str, snapshot_file: &str) -> String {
        format!("envs/{}/state/{}/{}/snapshots/{}", env_id, kind.state_dir(), entity_id, snapshot_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_paths_follow_kind() {
        let repo = Path::new("/r");
        assert_eq!(latest_path(repo, "prod", EntityKind::Firewall, "S1"), PathBuf::from("/r/envs/prod/state/devices/S1/latest.json"));
        assert_eq!(snapshots_dir(repo, "prod", EntityKind::Panorama, "P1"), PathBuf::from("/r/envs/prod/state/panorama/P1/snapshots"));
        assert_eq!(lock_path(repo), PathBuf::from("/r/.netsec-state/lock"));
    }

    #[test]
    fn relative_paths_use_forward_slashes() {
        assert_eq!(rel::snapshot("prod", EntityKind::Firewall, "S1", "x.json"), "envs/prod/state/devices/S1/snapshots/x.json");
        assert_eq!(rel::commit_ledger("dev"), "envs/dev/state/commits.ndjson");
    }
}
