//! Canonical form and content hash of a snapshot.
//!
//! Only arrays known to be unordered are sorted: string lists under
//! [`STRING_SET_KEYS`] and arrays whose every element has a string `name`.
//! Everything else keeps its order.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Top-level keys that record provenance rather than state.
pub const VOLATILE_KEYS: &[&str] = &["source", "state_sha256"];
pub const STRING_SET_KEYS: &[&str] = &["members_serials", "templates"];

pub fn canonicalize(snapshot: &Value) -> Value {
    match snapshot {
        Value::Object(map) => canonical_object(map, true),
        other => canonical_value(other, ""),
    }
}

/// sha256 hex of the canonical JSON encoding.
pub fn compute_hash(snapshot: &Value) -> String {
    let encoded = canonicalize(snapshot).to_string();
    hex::encode(Sha256::digest(encoded.as_bytes()))
}

fn canonical_object(map: &Map<String, Value>, top_level: bool) -> Value {
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();
    let mut out = Map::new();
    for key in keys {
        if top_level && VOLATILE_KEYS.contains(&key.as_str()) {
            continue;
        }
        out.insert(key.clone(), canonical_value(&map[key], key));
    }
    Value::Object(out)
}

fn canonical_value(value: &Value, key: &str) -> Value {
    match value {
        Value::Object(map) => canonical_object(map, false),
        Value::Array(items) => {
            let mut items: Vec<Value> = items.iter().map(|v| canonical_value(v, key)).collect();
            sort_unordered(&mut items, key);
            Value::Array(items)
        }
        other => other.clone(),
    }
}

fn sort_unordered(items: &mut [Value], key: &str) {
    if STRING_SET_KEYS.contains(&key) {
        if items.iter().all(Value::is_string) {
            items.sort_by(|a, b| a.as_str().cmp(&b.as_str()));
        }
        return;
    }
    let named = |v: &Value| v.get("name").and_then(Value::as_str).map(str::to_owned);
    if !items.is_empty() && items.iter().all(|v| v.is_object() && named(v).is_some()) {
        items.sort_by_key(|v| named(v));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snapshot(tsf: &str, sha: &str, flip: bool) -> Value {
        let mut ifaces = vec![json!({"name": "ethernet1/1"}), json!({"name": "ethernet1/2"})];
        let mut templates = vec![json!("a"), json!("b")];
        let mut vrs = vec![json!({"name": "vr1"}), json!({"name": "vr2"})];
        if flip {
            ifaces.reverse();
            templates.reverse();
            vrs.reverse();
        }
        json!({
            "snapshot_version": 1,
            "source": {"tsf_id": tsf, "ingested_at_utc": "2026-02-09T00:00:00Z"},
            "state_sha256": sha,
            "device": {"id": "S1"},
            "network": {"interfaces": ifaces},
            "routing": {"virtual_routers": vrs},
            "panorama_config": {"templates": templates},
        })
    }

    #[test]
    fn provenance_and_unordered_arrays_do_not_change_hash() {
        let a = compute_hash(&snapshot("S1|a.tgz", "deadbeef", false));
        let b = compute_hash(&snapshot("S1|renamed.tgz", "cafebabe", true));
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn ordered_arrays_keep_their_order() {
        let a = json!({"routes": [{"dst": "0.0.0.0/0"}, {"dst": "10.0.0.0/8"}]});
        let b = json!({"routes": [{"dst": "10.0.0.0/8"}, {"dst": "0.0.0.0/0"}]});
        assert_ne!(compute_hash(&a), compute_hash(&b));
        // partially named arrays are not reordered either
        let c = json!({"x": [{"name": "b"}, {"other": 1}]});
        let d = json!({"x": [{"other": 1}, {"name": "b"}]});
        assert_ne!(compute_hash(&c), compute_hash(&d));
    }

    #[test]
    fn nested_source_key_is_state() {
        let a = json!({"device": {"source": "x"}});
        let b = json!({"device": {"source": "y"}});
        assert_ne!(compute_hash(&a), compute_hash(&b));
    }

    #[test]
    fn string_sets_with_mixed_items_keep_order() {
        let a = canonicalize(&json!({"templates": ["b", 1, "a"]}));
        assert_eq!(a["templates"], json!(["b", 1, "a"]));
        let b = canonicalize(&json!({"templates": ["b", "a"]}));
        assert_eq!(b["templates"], json!(["a", "b"]));
    }
}
