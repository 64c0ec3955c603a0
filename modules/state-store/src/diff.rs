use crate::canonical::VOLATILE_KEYS;
use netsec_core::{layout, EntityKind};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

pub const SCOPE_ORDER: &[&str] = &["device", "feature", "route", "other"];

/// Sorted dot/index paths (`network.interfaces[0].zone`) that differ between
/// two snapshots. A missing previous snapshot compares as empty.
pub fn changed_paths(previous: Option<&Value>, current: &Value) -> Vec<String> {
    let empty = Map::new();
    let prev = previous.and_then(Value::as_object).unwrap_or(&empty);
    let cur = current.as_object().unwrap_or(&empty);
    let mut out = BTreeSet::new();
    diff_object(prev, cur, "", &mut out);
    out.into_iter().collect()
}

/// Comma-joined buckets touched by the change, or `other` when nothing differs.
pub fn changed_scope(previous: Option<&Value>, current: &Value) -> String {
    let buckets: BTreeSet<&str> = changed_paths(previous, current).iter().map(|p| scope_bucket(p)).collect();
    let out: Vec<&str> = SCOPE_ORDER.iter().copied().filter(|b| buckets.contains(b)).collect();
    if out.is_empty() { "other".to_string() } else { out.join(",") }
}

pub fn scope_bucket(path: &str) -> &'static str {
    let root = path.split(['.', '[']).next().unwrap_or(path);
    match root {
        "device" | "panorama_instance" => "device",
        "ha" | "network" | "licenses" | "panorama_ha" | "panorama_config" => "feature",
        "routing" => "route",
        _ => "other",
    }
}

/// Repo-relative state files a commit for this entity touches, sorted.
pub fn changed_state_paths(env_id: &str, kind: EntityKind, entity_id: &str, snapshot_file: &str) -> Vec<String> {
    let mut paths = vec![
        layout::rel::commit_ledger(env_id),
        layout::rel::latest(env_id, kind, entity_id),
        layout::rel::snapshot(env_id, kind, entity_id, snapshot_file),
    ];
    paths.sort();
    paths
}

fn diff_object(prev: &Map<String, Value>, cur: &Map<String, Value>, prefix: &str, out: &mut BTreeSet<String>) {
    let keys: BTreeSet<&String> = prev.keys().chain(cur.keys()).collect();
    for key in keys {
        if prefix.is_empty() && VOLATILE_KEYS.contains(&key.as_str()) {
            continue;
        }
        let path = if prefix.is_empty() { key.clone() } else { format!("{}.{}", prefix, key) };
        match (prev.get(key), cur.get(key)) {
            (Some(p), Some(c)) => diff_value(p, c, &path, out),
            _ => { out.insert(path); }
        }
    }
}

fn diff_value(prev: &Value, cur: &Value, path: &str, out: &mut BTreeSet<String>) {
    match (prev, cur) {
        (Value::Object(p), Value::Object(c)) => diff_object(p, c, path, out),
        (Value::Array(p), Value::Array(c)) => {
            if p.len() != c.len() {
                out.insert(path.to_string());
            }
            for (i, (pv, cv)) in p.iter().zip(c.iter()).enumerate() {
                diff_value(pv, cv, &format!("{}[{}]", path, i), out);
            }
        }
        (p, c) if p == c => {}
        _ => { out.insert(path.to_string()); }
    }
}
