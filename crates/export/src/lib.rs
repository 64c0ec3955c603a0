//! Environment exports regenerated from the stored `latest.json` documents:
//! environment.json, inventory.csv, nodes.csv, edges.csv, topology.mmd and
//! agent_context.md under `envs/<env>/exports/`.

pub mod load;
pub mod writers;

use load::{load_entities, Loaded};
use netsec_core::{layout, timefmt, EntityKind};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::PathBuf;
use thiserror::Error;
use time::OffsetDateTime;
use topology::{Edge, EdgeType, TopologyError};
use tsf_parse::{FirewallSnapshot, PanoramaSnapshot};
use writers::{AgentContext, Counts, InventoryRow, NodeRow};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("export io: {0}")]
    Io(#[from] io::Error),
    #[error("export json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("export csv: {0}")]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Topology(#[from] TopologyError),
}

#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub repo: PathBuf,
    pub env_id: String,
    pub now: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct ExportReport {
    pub counts: Counts,
    pub files: Vec<PathBuf>,
}

/// Rebuild every export file for one environment.
pub fn run(opts: &ExportOptions) -> Result<ExportReport, ExportError> {
    let state = layout::env_state_dir(&opts.repo, &opts.env_id);
    let firewalls: Vec<Loaded<FirewallSnapshot>> = load_entities(&state.join(EntityKind::Firewall.state_dir()))?;
    let panorama: Vec<Loaded<PanoramaSnapshot>> = load_entities(&state.join(EntityKind::Panorama.state_dir()))?;

    let interfaces = topology_interfaces(&firewalls);
    let inferred = topology::infer_shared_subnet_edges(&interfaces);
    let edges = topology::merge_override_edges(inferred, &layout::topology_overrides_path(&opts.repo, &opts.env_id))?;

    let zones = zone_set(&firewalls);
    let counts = Counts { firewalls: firewalls.len(), panorama: panorama.len(), zones: zones.len(), topology_edges: edges.len() };
    let generated_at = timefmt::rfc3339(opts.now);

    let fw_values: Vec<_> = firewalls.iter().map(|f| f.value.clone()).collect();
    let pano_values: Vec<_> = panorama.iter().map(|p| p.value.clone()).collect();
    let rendered: [(&str, Vec<u8>); 6] = [
        ("environment.json", writers::environment_json(&opts.env_id, &generated_at, counts, &fw_values, &pano_values, &edges)?),
        ("inventory.csv", writers::inventory_csv(&inventory_rows(&firewalls, &panorama))?),
        ("nodes.csv", writers::nodes_csv(&node_rows(&opts.env_id, &firewalls, &panorama))?),
        ("edges.csv", writers::edges_csv(&edges)?),
        ("topology.mmd", writers::topology_mermaid(&edges).into_bytes()),
        ("agent_context.md", writers::agent_context(&agent_context(opts, &generated_at, counts, &firewalls, &panorama, &edges)).into_bytes()),
    ];

    let dir = layout::exports_dir(&opts.repo, &opts.env_id);
    fs::create_dir_all(&dir)?;
    let mut files = Vec::with_capacity(rendered.len());
    for (name, data) in rendered {
        let path = dir.join(name);
        fs::write(&path, data)?;
        files.push(path);
    }
    tracing::info!(env = %opts.env_id, firewalls = counts.firewalls, panorama = counts.panorama, edges = counts.topology_edges, "exports written");
    Ok(ExportReport { counts, files })
}

fn topology_interfaces(firewalls: &[Loaded<FirewallSnapshot>]) -> Vec<topology::Interface> {
    firewalls
        .iter()
        .flat_map(|f| {
            let device_id = f.snapshot.device.id.clone();
            f.snapshot.network.interfaces.iter().map(move |i| topology::Interface {
                device_id: device_id.clone(),
                zone: i.zone.clone(),
                name: i.name.clone(),
                vr: i.virtual_router.clone(),
                ip_cidrs: i.ip_cidrs.clone(),
            })
        })
        .collect()
}

/// Distinct (device, zone) pairs from interface bindings and zone lists.
fn zone_set(firewalls: &[Loaded<FirewallSnapshot>]) -> BTreeMap<(String, String), String> {
    let mut zones = BTreeMap::new();
    for f in firewalls {
        let dev = &f.snapshot.device.id;
        for i in &f.snapshot.network.interfaces {
            if !i.zone.is_empty() {
                let vr = zones.entry((dev.clone(), i.zone.clone())).or_insert_with(String::new);
                if vr.is_empty() {
                    *vr = i.virtual_router.clone();
                }
            }
        }
        for z in f.snapshot.network.zones.iter().filter(|z| !z.is_empty()) {
            zones.entry((dev.clone(), z.clone())).or_insert_with(String::new);
        }
    }
    zones
}

fn inventory_rows(firewalls: &[Loaded<FirewallSnapshot>], panorama: &[Loaded<PanoramaSnapshot>]) -> Vec<InventoryRow> {
    let mut rows = Vec::with_capacity(firewalls.len() + panorama.len());
    for f in firewalls {
        let s = &f.snapshot;
        rows.push(InventoryRow {
            entity_type: EntityKind::Firewall.as_str().into(),
            entity_id: s.device.id.clone(),
            hostname: s.device.hostname.clone(),
            serial: s.device.serial.clone(),
            model: s.device.model.clone(),
            version: s.device.sw_version.clone(),
            mgmt_ip: s.device.mgmt_ip.clone(),
            ha_enabled: s.ha.enabled.to_string(),
            ha_mode: s.ha.mode.clone(),
            ha_state: s.ha.local_state.clone(),
            routing_protocols_configured: Vec::new(),
            routing_protocols_active: Vec::new(),
            source_tsf_id: s.source.tsf_id.clone(),
            state_sha256: s.state_sha256.clone(),
            last_ingested_at_utc: s.source.ingested_at_utc.clone(),
        });
    }
    for p in panorama {
        let s = &p.snapshot;
        rows.push(InventoryRow {
            entity_type: EntityKind::Panorama.as_str().into(),
            entity_id: s.panorama_instance.id.clone(),
            hostname: s.panorama_instance.hostname.clone(),
            serial: s.panorama_instance.serial.clone(),
            model: s.panorama_instance.model.clone(),
            version: s.panorama_instance.version.clone(),
            mgmt_ip: s.panorama_instance.mgmt_ip.clone(),
            ha_enabled: "false".into(),
            ha_mode: "unknown".into(),
            source_tsf_id: s.source.tsf_id.clone(),
            state_sha256: s.state_sha256.clone(),
            last_ingested_at_utc: s.source.ingested_at_utc.clone(),
            ..Default::default()
        });
    }
    rows
}

fn node_rows(env_id: &str, firewalls: &[Loaded<FirewallSnapshot>], panorama: &[Loaded<PanoramaSnapshot>]) -> Vec<NodeRow> {
    let mut nodes = Vec::new();
    for f in firewalls {
        let d = &f.snapshot.device;
        nodes.push(NodeRow {
            node_id: writers::firewall_node_id(&d.id),
            node_type: "firewall".into(),
            env_id: env_id.into(),
            device_id: d.id.clone(),
            label: label_or_id(&d.hostname, &d.id),
            ..Default::default()
        });
    }
    for p in panorama {
        let i = &p.snapshot.panorama_instance;
        nodes.push(NodeRow {
            node_id: writers::panorama_node_id(&i.id),
            node_type: "panorama".into(),
            env_id: env_id.into(),
            panorama_id: i.id.clone(),
            label: label_or_id(&i.hostname, &i.id),
            ..Default::default()
        });
    }
    for ((device_id, zone), vr) in zone_set(firewalls) {
        nodes.push(NodeRow {
            node_id: writers::zone_node_id(&device_id, &zone),
            node_type: "zone".into(),
            env_id: env_id.into(),
            label: format!("{}:{}", device_id, zone),
            device_id,
            zone,
            virtual_router: vr,
            ..Default::default()
        });
    }
    nodes
}

fn label_or_id(label: &str, id: &str) -> String {
    if label.is_empty() { id.to_string() } else { label.to_string() }
}

fn agent_context(
    opts: &ExportOptions,
    generated_at: &str,
    counts: Counts,
    firewalls: &[Loaded<FirewallSnapshot>],
    panorama: &[Loaded<PanoramaSnapshot>],
    edges: &[Edge],
) -> AgentContext {
    let mut ctx = AgentContext {
        environment_summary: format!("- Environment: {}\n- Generated at: {}", opts.env_id, generated_at),
        inventory_counts: format!(
            "- Firewalls: {}\n- Panorama: {}\n- Zones: {}\n- Topology edges: {}",
            counts.firewalls, counts.panorama, counts.zones, counts.topology_edges
        ),
        ..Default::default()
    };

    let mut routing = String::new();
    for f in firewalls {
        let vrs: Vec<&str> = f.snapshot.routing.virtual_routers.iter().map(|v| v.name.as_str()).collect();
        if !vrs.is_empty() {
            let _ = writeln!(routing, "- {}: {}", f.snapshot.device.id, vrs.join(", "));
        }
    }
    ctx.routing_usage = or_none(routing, "- No virtual routers recorded.");

    let mut pano = String::new();
    for p in panorama {
        let c = &p.snapshot.panorama_config;
        let _ = writeln!(
            pano,
            "- {}: {} device groups, {} templates, {} template stacks, {} managed devices",
            p.snapshot.panorama_instance.id,
            c.device_groups.len(),
            c.templates.len(),
            c.template_stacks.len(),
            c.managed_devices.len()
        );
    }
    ctx.panorama_overview = or_none(pano, "- No Panorama instances ingested.");

    let shared = edges.iter().filter(|e| e.edge_type == EdgeType::SharedSubnet).count();
    let manual = edges.len() - shared;
    ctx.topology_highlights = if edges.is_empty() {
        "- No zone adjacencies inferred.".into()
    } else {
        format!("- shared_subnet edges: {}\n- manual_override edges: {}", shared, manual)
    };

    ctx.orphans_and_unknowns = or_none(orphans(firewalls, panorama, edges), "- None.");
    ctx
}

fn orphans(firewalls: &[Loaded<FirewallSnapshot>], panorama: &[Loaded<PanoramaSnapshot>], edges: &[Edge]) -> String {
    let connected: BTreeSet<&str> = edges.iter().flat_map(|e| [e.src.device_id.as_str(), e.dst.device_id.as_str()]).collect();
    let known: BTreeSet<&str> = firewalls.iter().map(|f| f.snapshot.device.serial.as_str()).collect();
    let mut out = String::new();
    for f in firewalls {
        let d = &f.snapshot.device;
        if !connected.contains(d.id.as_str()) {
            let _ = writeln!(out, "- Firewall {} has no topology edges", d.id);
        }
        if d.hostname.is_empty() || d.mgmt_ip.is_empty() {
            let _ = writeln!(out, "- Firewall {} is missing hostname or management IP", d.id);
        }
    }
    let mut unmanaged = BTreeSet::new();
    for p in panorama {
        for m in &p.snapshot.panorama_config.managed_devices {
            if !m.serial.is_empty() && !known.contains(m.serial.as_str()) {
                unmanaged.insert(m.serial.as_str());
            }
        }
    }
    for serial in unmanaged {
        let _ = writeln!(out, "- Managed serial {} has no ingested firewall", serial);
    }
    out
}

fn or_none(text: String, none: &str) -> String {
    if text.is_empty() { none.to_string() } else { text.trim_end().to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use std::path::Path;

    fn write_latest(repo: &Path, kind: EntityKind, id: &str, doc: &str) {
        let path = layout::latest_path(repo, "prod", kind, id);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, doc).unwrap();
    }

    fn firewall(id: &str, host: &str, zone: &str, cidr: &str) -> String {
        format!(
            r#"{{"snapshot_version":1,"source":{{"tsf_id":"{id}|x_ts.tgz","ingested_at_utc":"2026-02-09T00:00:00Z"}},"state_sha256":"abc",
"device":{{"id":"{id}","hostname":"{host}","serial":"{id}","model":"PA-440","sw_version":"11.1.2","mgmt_ip":"192.0.2.1"}},
"ha":{{"enabled":false,"mode":"unknown"}},"network":{{"interfaces":[{{"name":"ethernet1/1","zone":"{zone}","virtual_router":"default","ip_cidrs":["{cidr}"]}}],"zones":["{zone}"]}},
"routing":{{"virtual_routers":[{{"name":"default"}}]}}}}"#
        )
    }

    fn opts(repo: &Path) -> ExportOptions {
        ExportOptions { repo: repo.to_path_buf(), env_id: "prod".into(), now: OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap() }
    }

    #[test]
    fn writes_all_files_with_topology() {
        let dir = tempfile::tempdir().unwrap();
        let repo = dir.path();
        write_latest(repo, EntityKind::Firewall, "S1", &firewall("S1", "fw-one", "trust", "10.1.0.1/24"));
        write_latest(repo, EntityKind::Firewall, "S2", &firewall("S2", "fw-two", "inside", "10.1.0.2/24"));
        write_latest(
            repo,
            EntityKind::Panorama,
            "P1",
            r#"{"panorama_instance":{"id":"P1","hostname":"pano"},"panorama_config":{"managed_devices":[{"serial":"S1"},{"serial":"S9"}]}}"#,
        );

        let report = run(&opts(repo)).unwrap();
        let names: Vec<String> = report.files.iter().map(|p| p.file_name().unwrap().to_string_lossy().into_owned()).collect();
        assert_eq!(names, layout::EXPORT_FILES);
        assert_eq!(report.counts, Counts { firewalls: 2, panorama: 1, zones: 2, topology_edges: 1 });

        let env: Value = serde_json::from_slice(&fs::read(layout::exports_dir(repo, "prod").join("environment.json")).unwrap()).unwrap();
        assert_eq!(env["environment"]["generated_at_utc"], "2023-11-14T22:13:20Z");
        assert_eq!(env["firewalls"][0]["device"]["id"], "S1");
        assert_eq!(env["topology"]["zone_edges"][0]["edge_type"], "shared_subnet");

        let nodes = fs::read_to_string(layout::exports_dir(repo, "prod").join("nodes.csv")).unwrap();
        assert!(nodes.contains("firewall_s1,firewall,prod,S1,,,,fw-one"));
        assert!(nodes.contains("zone_s2_inside,zone,prod,S2,,inside,default,S2:inside"));

        let ctx = fs::read_to_string(layout::exports_dir(repo, "prod").join("agent_context.md")).unwrap();
        assert!(ctx.contains("- S1: default"));
        assert!(ctx.contains("- Managed serial S9 has no ingested firewall"));
        assert!(!ctx.contains("Firewall S1 has no topology edges"));
    }

    #[test]
    fn empty_environment_still_exports() {
        let dir = tempfile::tempdir().unwrap();
        let report = run(&opts(dir.path())).unwrap();
        assert_eq!(report.counts, Counts::default());
        let mmd = fs::read_to_string(layout::exports_dir(dir.path(), "prod").join("topology.mmd")).unwrap();
        assert_eq!(mmd, "graph TD\n");
        let inv = fs::read_to_string(layout::exports_dir(dir.path(), "prod").join("inventory.csv")).unwrap();
        assert_eq!(inv.lines().count(), 1);
    }

    #[test]
    fn overrides_are_included() {
        let dir = tempfile::tempdir().unwrap();
        let repo = dir.path();
        write_latest(repo, EntityKind::Firewall, "S1", &firewall("S1", "fw-one", "trust", "10.1.0.1/24"));
        let path = layout::topology_overrides_path(repo, "prod");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(
            &path,
            r#"[{"src_device_id":"S1","src_zone":"trust","src_interface":"ethernet1/1","src_vr":"default","dst_device_id":"S7","dst_zone":"wan","dst_interface":"ethernet1/2","dst_vr":"default"}]"#,
        )
        .unwrap();
        let report = run(&opts(repo)).unwrap();
        assert_eq!(report.counts.topology_edges, 1);
        let edges = fs::read_to_string(layout::exports_dir(repo, "prod").join("edges.csv")).unwrap();
        assert!(edges.lines().nth(1).unwrap().ends_with(",override"));
    }
}
