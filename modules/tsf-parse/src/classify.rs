use crate::{joined_lowercase, Files, ParseError};
use netsec_core::EntityKind;
use regex::Regex;
use std::sync::OnceLock;

fn model_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?im)^\s*model\s*:\s*(\S+)").expect("model pattern"))
}

/// Decide whether the archive came from a firewall or a Panorama instance.
///
/// A `model:` line is trusted first, since the word "panorama" shows up in
/// plenty of firewall dumps (managed-by settings, admin names).
pub fn classify(files: &Files) -> Result<EntityKind, ParseError> {
    let joined = joined_lowercase(files);
    if let Some(model) = model_line().captures(&joined).and_then(|c| c.get(1)).map(|m| m.as_str()) {
        if model.starts_with("pa-") || model.starts_with("vm-") {
            return Ok(EntityKind::Firewall);
        }
        if model.starts_with("m-") || model.contains("panorama") {
            return Ok(EntityKind::Panorama);
        }
    }
    if joined.contains("panorama") {
        return Ok(EntityKind::Panorama);
    }
    if joined.contains("firewall") || joined.contains("pan-os") {
        return Ok(EntityKind::Firewall);
    }
    Err(ParseError::Unclassified)
}
