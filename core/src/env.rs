//! Environment registry: id normalization and per-environment directories.

use crate::layout;
use regex::Regex;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnvError {
    #[error("invalid env_id: {0:?}")]
    InvalidId(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

fn env_id_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z0-9](?:[a-z0-9-]{0,30}[a-z0-9])?$").expect("env id pattern"))
}

pub fn normalize_env_id(raw: &str) -> String {
    raw.trim().to_lowercase()
}

pub fn validate_env_id(env_id: &str) -> Result<(), EnvError> {
    if env_id_pattern().is_match(env_id) { Ok(()) } else { Err(EnvError::InvalidId(env_id.to_string())) }
}

/// Registry of named environments under `<repo>/envs`.
#[derive(Debug, Clone)]
pub struct EnvRegistry {
    repo: PathBuf,
}

impl EnvRegistry {
    pub fn new(repo: impl Into<PathBuf>) -> Self {
        EnvRegistry { repo: repo.into() }
    }

    /// Normalize, validate and ensure the environment exists. Returns the
    /// canonical id and whether it was newly created.
    pub fn create(&self, raw: &str) -> Result<(String, bool), EnvError> {
        let env_id = normalize_env_id(raw);
        validate_env_id(&env_id)?;
        let root = layout::env_root(&self.repo, &env_id);
        if root.exists() {
            return Ok((env_id, false));
        }
        for dir in [layout::env_state_dir(&self.repo, &env_id), layout::exports_dir(&self.repo, &env_id), layout::overrides_dir(&self.repo, &env_id)] {
            fs::create_dir_all(dir)?;
        }
        Ok((env_id, true))
    }

    pub fn list(&self) -> Result<Vec<String>, EnvError> {
        let entries = match fs::read_dir(layout::envs_dir(&self.repo)) {
            Ok(e) => e,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut out = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() { continue; }
            let name = entry.file_name().to_string_lossy().into_owned();
            if validate_env_id(&name).is_ok() { out.push(name); }
        }
        out.sort();
        Ok(out)
    }

    pub fn repo(&self) -> &Path {
        &self.repo
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_id_validation() {
        for raw in ["default", "a", "prod-01", "abc123", "a123456789012345678901234567890z", " Dev "] {
            assert!(validate_env_id(&normalize_env_id(raw)).is_ok(), "{raw} should be valid");
        }
        for raw in ["", "-abc", "abc-", "a_b", "A B", "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"] {
            assert!(matches!(validate_env_id(&normalize_env_id(raw)), Err(EnvError::InvalidId(_))), "{raw} should be invalid");
        }
    }

    #[test]
    fn create_is_idempotent_and_list_is_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let reg = EnvRegistry::new(dir.path());
        assert_eq!(reg.create(" Prod ").unwrap(), ("prod".to_string(), true));
        assert_eq!(reg.create("prod").unwrap(), ("prod".to_string(), false));
        reg.create("dev").unwrap();
        assert!(matches!(reg.create("BAD_NAME"), Err(EnvError::InvalidId(_))));
        assert_eq!(reg.list().unwrap(), vec!["dev".to_string(), "prod".to_string()]);
        for sub in ["state", "exports", "overrides"] {
            assert!(dir.path().join("envs/dev").join(sub).is_dir());
        }
    }

    #[test]
    fn list_without_envs_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(EnvRegistry::new(dir.path()).list().unwrap().is_empty());
    }
}
