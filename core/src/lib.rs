//! Core utilities and shared types for the netsec-sk ingestion pipeline.

pub mod env;
pub mod error;
pub mod layout;
pub mod timefmt;

pub use error::ErrorCode;

use serde::{Deserialize, Serialize};
use std::fmt;

pub const fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Kind of entity a tech-support archive describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Firewall,
    Panorama,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Firewall => "firewall",
            EntityKind::Panorama => "panorama",
        }
    }

    /// Directory under `envs/<env>/state/` holding entities of this kind.
    pub fn state_dir(self) -> &'static str {
        match self {
            EntityKind::Firewall => "devices",
            EntityKind::Panorama => "panorama",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
