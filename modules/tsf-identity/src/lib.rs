//! Archive identity: a fingerprint that survives renaming the archive file.

use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;
use std::io;
use std::sync::OnceLock;

pub const UNKNOWN: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TsfIdentity {
    /// `serial|canonical_name`, or [`UNKNOWN`].
    pub fingerprint: String,
    pub canonical_name: String,
    pub serial: String,
}

struct Patterns {
    cli_direct: Regex,
    cli_nested: Regex,
    ts_name: Regex,
    serial: Regex,
}

fn patterns() -> &'static Patterns {
    static P: OnceLock<Patterns> = OnceLock::new();
    P.get_or_init(|| Patterns {
        cli_direct: Regex::new(r"(^|.*/)tmp/cli/[^/]+\.txt$").expect("cli pattern"),
        cli_nested: Regex::new(r"(^|.*/)tmp/cli/.*\.txt$").expect("cli pattern"),
        ts_name: Regex::new(r"^[A-Za-z0-9._-]+_ts\.(?:tgz|tar\.gz)").expect("ts name pattern"),
        serial: Regex::new(r"(?im)^\s*(?:serial|serial number|device serial)\s*:\s*(\S+)").expect("serial pattern"),
    })
}

/// Derive the identity of an extracted archive from its `tmp/cli/*.txt`
/// metadata files. Unreadable candidates are skipped.
pub fn derive_identity<P, R>(paths: &[P], read: R) -> TsfIdentity
where
    P: AsRef<str>,
    R: Fn(&str) -> io::Result<Vec<u8>>,
{
    let candidates = select_candidates(paths);
    let Some(first) = candidates.first() else {
        return TsfIdentity { fingerprint: UNKNOWN.to_string(), canonical_name: String::new(), serial: String::new() };
    };

    let mut chosen = first.as_str();
    let mut serial = String::new();
    for path in &candidates {
        let Ok(content) = read(path) else { continue };
        let text = String::from_utf8_lossy(&content);
        if let Some(m) = patterns().serial.captures(&text).and_then(|c| c.get(1)) {
            serial = m.as_str().to_string();
            chosen = path.as_str();
            break;
        }
    }

    let file_name = chosen.rsplit('/').next().unwrap_or(chosen);
    let canonical_name = canonical_name(file_name);
    TsfIdentity { fingerprint: format!("{}|{}", serial, canonical_name), canonical_name, serial }
}

/// Whether `fingerprint` was already ingested. [`UNKNOWN`] never matches.
pub fn is_duplicate(fingerprint: &str, seen: &HashSet<String>) -> bool {
    !fingerprint.is_empty() && fingerprint != UNKNOWN && seen.contains(fingerprint)
}

fn select_candidates<P: AsRef<str>>(paths: &[P]) -> Vec<String> {
    let p = patterns();
    let cleaned: Vec<String> = paths.iter().map(|s| clean_path(s.as_ref())).collect();
    let mut direct: Vec<String> = cleaned.iter().filter(|s| p.cli_direct.is_match(s)).cloned().collect();
    if !direct.is_empty() {
        direct.sort();
        return direct;
    }
    let mut nested: Vec<String> = cleaned.into_iter().filter(|s| p.cli_nested.is_match(s)).collect();
    nested.sort();
    nested
}

fn clean_path(raw: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    for part in raw.split('/') {
        match part {
            "" | "." => {}
            ".." if out.last().is_some_and(|l| *l != "..") => { out.pop(); }
            p => out.push(p),
        }
    }
    let joined = out.join("/");
    if raw.starts_with('/') { format!("/{}", joined) } else { joined }
}

/// Recover the archive's original name from a metadata file name.
pub fn canonical_name(file_name: &str) -> String {
    if file_name.ends_with(".tgz.txt") || file_name.ends_with(".tar.gz.txt") {
        return file_name[..file_name.len() - ".txt".len()].to_string();
    }
    let bytes = file_name.as_bytes();
    let mut best: Option<&str> = None;
    for i in 0..bytes.len() {
        if !bytes[i].is_ascii_alphabetic() { continue; }
        if i > 0 && bytes[i - 1].is_ascii_alphanumeric() { continue; }
        if let Some(m) = patterns().ts_name.find(&file_name[i..]) {
            if best.map_or(true, |b| m.as_str().len() < b.len()) {
                best = Some(m.as_str());
            }
        }
    }
    best.unwrap_or(file_name).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn reader(files: HashMap<&'static str, &'static str>) -> impl Fn(&str) -> io::Result<Vec<u8>> {
        move |p: &str| files.get(p).map(|v| v.as_bytes().to_vec()).ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, p.to_string()))
    }

    fn fixture() -> impl Fn(&str) -> io::Result<Vec<u8>> {
        reader(HashMap::from([
            ("run/tmp/cli/no-serial.txt", "hostname: fw-a"),
            ("run/tmp/cli/PA-440_ts.tgz.txt", "device serial: S12345"),
            ("run/tmp/cli/prefix_PA-440_ts.tgz_extra.txt", "serial number: S777"),
        ]))
    }

    #[test]
    fn unknown_without_candidates() {
        let id = derive_identity(&["run/other/path/file.txt"], fixture());
        assert_eq!(id.fingerprint, UNKNOWN);
        assert!(!is_duplicate(&id.fingerprint, &HashSet::from([UNKNOWN.to_string()])));
    }

    #[test]
    fn serial_bearing_candidate_wins() {
        let id = derive_identity(&["run/tmp/cli/no-serial.txt", "run/tmp/cli/PA-440_ts.tgz.txt"], fixture());
        assert_eq!(id.serial, "S12345");
        assert_eq!(id.canonical_name, "PA-440_ts.tgz");
        assert_eq!(id.fingerprint, "S12345|PA-440_ts.tgz");
    }

    #[test]
    fn missing_serial_keeps_delimiter() {
        let id = derive_identity(&["run/tmp/cli/no-serial.txt"], fixture());
        assert_eq!(id.fingerprint, "|no-serial.txt");
    }

    #[test]
    fn shortest_ts_token_from_filename() {
        let id = derive_identity(&["run/tmp/cli/prefix_PA-440_ts.tgz_extra.txt"], fixture());
        assert_eq!(id.canonical_name, "PA-440_ts.tgz");
        assert_eq!(canonical_name("another_PA-220_ts.tar.gz_meta.txt"), "PA-220_ts.tar.gz");
        assert_eq!(canonical_name("plain.txt"), "plain.txt");
    }

    #[test]
    fn direct_cli_files_beat_nested_ones() {
        let read = reader(HashMap::from([
            ("x/tmp/cli/deep/a.txt", "serial: DEEP"),
            ("x/tmp/cli/b.txt", "serial: TOP"),
        ]));
        let id = derive_identity(&["x/tmp/cli/deep/a.txt", "./x/tmp/cli/b.txt"], &read);
        assert_eq!(id.serial, "TOP");
        let id = derive_identity(&["x/tmp/cli/deep/a.txt"], &read);
        assert_eq!(id.serial, "DEEP");
    }

    #[test]
    fn renamed_archive_keeps_fingerprint() {
        // The input archive name plays no part; only extracted content does.
        let a = derive_identity(&["/s/001_fw.tgz/tmp/cli/PA-440_ts.tgz.txt"], |_: &str| Ok(b"serial: S1".to_vec()));
        let b = derive_identity(&["/s/002_renamed.tgz/tmp/cli/PA-440_ts.tgz.txt"], |_: &str| Ok(b"serial: S1".to_vec()));
        assert_eq!(a.fingerprint, b.fingerprint);
        assert!(is_duplicate(&b.fingerprint, &HashSet::from([a.fingerprint])));
    }
}
