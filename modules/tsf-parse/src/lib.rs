//! Classification and snapshot extraction for extracted tech-support files.

mod classify;
pub mod fields;
pub mod model;

pub use classify::classify;
pub use model::{FirewallSnapshot, PanoramaSnapshot};

use model::{Device, Ha, Network, PanoramaInstance, Routing, Source, PLACEHOLDER_SHA256, SNAPSHOT_VERSION};
use netsec_core::EntityKind;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use thiserror::Error;

/// Extracted file contents keyed by path. Iteration order is the path order.
pub type Files = BTreeMap<String, String>;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("classify entity: content is neither firewall nor panorama")]
    Unclassified,
    #[error("parse {0} snapshot: no serial found")]
    MissingSerial(EntityKind),
    #[error("encode snapshot: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default)]
pub struct ParseContext {
    pub tsf_id: String,
    pub tsf_original_name: String,
    pub input_archive_name: String,
    pub ingested_at_utc: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStatus {
    Ok,
    Partial,
}

impl ParseStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ParseStatus::Ok => "ok",
            ParseStatus::Partial => "parse_error_partial",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Snapshot {
    Firewall(FirewallSnapshot),
    Panorama(PanoramaSnapshot),
}

impl Snapshot {
    pub fn to_value(&self) -> Result<serde_json::Value, ParseError> {
        Ok(serde_json::to_value(self)?)
    }
}

#[derive(Debug, Clone)]
pub struct ParseOutput {
    pub kind: EntityKind,
    pub entity_id: String,
    pub snapshot: Snapshot,
    pub status: ParseStatus,
}

fn serial_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?im)^\s*(?:serial|serial number|device serial)\s*:\s*(\S+)").expect("serial pattern"))
}

pub(crate) fn joined_lowercase(files: &Files) -> String {
    files.values().map(String::as_str).collect::<Vec<_>>().join("\n").to_lowercase()
}

fn first_serial(files: &Files) -> Option<String> {
    files.values().find_map(|body| serial_line().captures(body).and_then(|c| c.get(1)).map(|m| m.as_str().to_string()))
}

/// Classify the archive and build its snapshot. Missing hostname or
/// management IP yields [`ParseStatus::Partial`]; a missing serial is fatal.
pub fn parse_snapshot(ctx: &ParseContext, files: &Files) -> Result<ParseOutput, ParseError> {
    let kind = classify(files)?;
    let serial = first_serial(files).ok_or(ParseError::MissingSerial(kind))?;
    let hostname = fields::first_value(files, fields::HOSTNAME_KEYS);
    let mgmt_ip = fields::first_value(files, fields::MGMT_IP_KEYS);
    let model = fields::first_value(files, fields::MODEL_KEYS);
    let status = if hostname.is_empty() || mgmt_ip.is_empty() { ParseStatus::Partial } else { ParseStatus::Ok };
    let source = Source {
        tsf_id: ctx.tsf_id.clone(),
        tsf_original_name: ctx.tsf_original_name.clone(),
        input_archive_name: ctx.input_archive_name.clone(),
        ingested_at_utc: ctx.ingested_at_utc.clone(),
    };

    let snapshot = match kind {
        EntityKind::Firewall => {
            let interfaces = fields::interfaces(files);
            Snapshot::Firewall(FirewallSnapshot {
                snapshot_version: SNAPSHOT_VERSION,
                source,
                state_sha256: PLACEHOLDER_SHA256.to_string(),
                device: Device {
                    id: serial.clone(),
                    hostname,
                    serial: serial.clone(),
                    model,
                    sw_version: fields::first_value(files, fields::SW_VERSION_KEYS),
                    mgmt_ip,
                    dns: None,
                },
                ha: Ha::default(),
                licenses: fields::licenses(files),
                routing: Routing { virtual_routers: fields::virtual_routers(&interfaces) },
                network: Network { zones: fields::zones(&interfaces), interfaces },
            })
        }
        EntityKind::Panorama => Snapshot::Panorama(PanoramaSnapshot {
            snapshot_version: SNAPSHOT_VERSION,
            source,
            state_sha256: PLACEHOLDER_SHA256.to_string(),
            panorama_instance: PanoramaInstance {
                id: serial.clone(),
                hostname,
                serial: serial.clone(),
                model,
                version: fields::first_value(files, fields::PANORAMA_VERSION_KEYS),
                mgmt_ip,
            },
            panorama_config: fields::panorama_config(files),
        }),
    };
    Ok(ParseOutput { kind, entity_id: serial, snapshot, status })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ParseContext {
        ParseContext {
            tsf_id: "S1|fw.tgz".into(),
            tsf_original_name: "fw.tgz".into(),
            input_archive_name: "x.tgz".into(),
            ingested_at_utc: "2026-02-09T00:00:00Z".into(),
        }
    }

    fn files(body: &str) -> Files {
        Files::from([("a.txt".to_string(), body.to_string())])
    }

    #[test]
    fn firewall_envelope_and_identity() {
        let out = parse_snapshot(&ctx(), &files("firewall\nserial: S1\nhostname: fw1\nmgmt_ip: 10.0.0.1\nmodel: PA-440\nsw_version: 11.0.0")).unwrap();
        assert_eq!(out.kind, EntityKind::Firewall);
        assert_eq!(out.status, ParseStatus::Ok);
        assert_eq!(out.entity_id, "S1");
        let v = out.snapshot.to_value().unwrap();
        assert_eq!(v["snapshot_version"], 1);
        assert_eq!(v["state_sha256"], PLACEHOLDER_SHA256);
        assert_eq!(v["source"]["tsf_id"], "S1|fw.tgz");
        assert_eq!(v["source"]["input_archive_name"], "x.tgz");
        assert_eq!(v["device"]["id"], "S1");
        assert_eq!(v["ha"]["mode"], "unknown");
        assert!(v["device"].get("dns").is_none());
        assert!(v["network"]["interfaces"].as_array().unwrap().is_empty());
    }

    #[test]
    fn accepts_common_key_variants() {
        let out = parse_snapshot(&ctx(), &files("serial: S1\nhostname: fw1\nip-address: 10.0.0.1\nmodel: PA-5450\nsw-version: 11.2.4-h7\npanorama\n")).unwrap();
        assert_eq!(out.status, ParseStatus::Ok);
        let Snapshot::Firewall(fw) = out.snapshot else { panic!("expected firewall") };
        assert_eq!(fw.device.mgmt_ip, "10.0.0.1");
        assert_eq!(fw.device.sw_version, "11.2.4-h7");
    }

    #[test]
    fn panorama_snapshot() {
        let out = parse_snapshot(&ctx(), &files("panorama\nserial: P1\nhostname: p1\nmgmt_ip: 10.0.0.2\nversion: 11.0.0\ntemplate: base")).unwrap();
        assert_eq!(out.kind, EntityKind::Panorama);
        let v = out.snapshot.to_value().unwrap();
        assert_eq!(v["panorama_instance"]["id"], "P1");
        assert_eq!(v["panorama_instance"]["version"], "11.0.0");
        assert_eq!(v["panorama_config"]["templates"][0], "base");
        assert!(v["panorama_config"]["device_groups"].is_array());
    }

    #[test]
    fn fatal_and_partial_outcomes() {
        assert!(matches!(parse_snapshot(&ctx(), &files("unclassified\nserial: X")), Err(ParseError::Unclassified)));
        assert!(matches!(parse_snapshot(&ctx(), &files("firewall\nhostname: fw\nmgmt_ip: 10.0.0.1")), Err(ParseError::MissingSerial(EntityKind::Firewall))));

        let out = parse_snapshot(&ctx(), &files("firewall\nserial: F2")).unwrap();
        assert_eq!(out.status, ParseStatus::Partial);
        assert_eq!(out.status.as_str(), "parse_error_partial");
        let Snapshot::Firewall(fw) = out.snapshot else { panic!("expected firewall") };
        assert_eq!(fw.device.id, "F2");
        assert_eq!(fw.snapshot_version, SNAPSHOT_VERSION);
    }

    #[test]
    fn serial_comes_from_first_file_in_path_order() {
        let mut f = Files::new();
        f.insert("b.txt".into(), "serial: LATER".into());
        f.insert("a.txt".into(), "pan-os\nserial: FIRST\nhostname: h\nmgmt-ip: 1.1.1.1".into());
        assert_eq!(parse_snapshot(&ctx(), &f).unwrap().entity_id, "FIRST");
    }

    #[test]
    fn firewall_features_flow_into_snapshot() {
        let body = "model: PA-440\nserial: S9\nhostname: fw9\nmgmt_ip: 192.0.2.9\n\
                    ethernet1/1  16  1  trust  vr:default  0  10.0.0.1/24\n\
                    Feature: Threat Prevention\nExpires: Never\n";
        let Snapshot::Firewall(fw) = parse_snapshot(&ctx(), &files(body)).unwrap().snapshot else { panic!("expected firewall") };
        assert_eq!(fw.network.zones, vec!["trust".to_string()]);
        assert_eq!(fw.routing.virtual_routers[0].name, "default");
        assert_eq!(fw.licenses[0].name, "Threat Prevention");
    }
}
