use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "netsec.yaml";

#[derive(Debug, Default, Deserialize, Clone)]
pub struct IngestConfig {
    pub rdns: Option<bool>,
    pub keep_extract: Option<bool>,
    pub skip_duplicates: Option<bool>,
    pub format: Option<String>,
}

#[derive(Debug, Default, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub repo: Option<PathBuf>,
    pub env: Option<String>,
    pub ingest: Option<IngestConfig>,
}

/// An explicit path must exist and parse; the default `./netsec.yaml` is
/// only read when present.
pub fn load_config(path: Option<&Path>) -> Result<Option<Config>> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let p = Path::new(DEFAULT_CONFIG_FILE);
            if p.exists() { p.to_path_buf() } else { return Ok(None); }
        }
    };
    let s = fs::read_to_string(&path).with_context(|| format!("read config {}", path.display()))?;
    let cfg = serde_yaml::from_str(&s).with_context(|| format!("parse config {}", path.display()))?;
    Ok(Some(cfg))
}
