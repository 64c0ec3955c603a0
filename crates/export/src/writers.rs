//! Renderers for the export artifacts. Each takes already-loaded rows and
//! returns bytes; the caller decides where they go.

use crate::ExportError;
use serde::Serialize;
use serde_json::{json, Value};
use topology::Edge;

pub const INVENTORY_HEADER: &[&str] = &[
    "entity_type", "entity_id", "hostname", "serial", "model", "version", "mgmt_ip", "ha_enabled", "ha_mode", "ha_state",
    "routing_protocols_configured", "routing_protocols_active", "source_tsf_id", "state_sha256", "last_ingested_at_utc",
];
pub const NODES_HEADER: &[&str] = &["node_id", "node_type", "env_id", "device_id", "panorama_id", "zone", "virtual_router", "label"];
pub const EDGES_HEADER: &[&str] = &[
    "edge_id", "edge_type", "src_node_id", "dst_node_id", "src_device_id", "src_zone", "src_interface", "src_vr",
    "dst_device_id", "dst_zone", "dst_interface", "dst_vr", "evidence", "source",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counts {
    pub firewalls: usize,
    pub panorama: usize,
    pub zones: usize,
    pub topology_edges: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InventoryRow {
    pub entity_type: String,
    pub entity_id: String,
    pub hostname: String,
    pub serial: String,
    pub model: String,
    pub version: String,
    pub mgmt_ip: String,
    pub ha_enabled: String,
    pub ha_mode: String,
    pub ha_state: String,
    pub routing_protocols_configured: Vec<String>,
    pub routing_protocols_active: Vec<String>,
    pub source_tsf_id: String,
    pub state_sha256: String,
    pub last_ingested_at_utc: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeRow {
    pub node_id: String,
    pub node_type: String,
    pub env_id: String,
    pub device_id: String,
    pub panorama_id: String,
    pub zone: String,
    pub virtual_router: String,
    pub label: String,
}

#[derive(Debug, Clone, Default)]
pub struct AgentContext {
    pub environment_summary: String,
    pub inventory_counts: String,
    pub routing_usage: String,
    pub panorama_overview: String,
    pub topology_highlights: String,
    pub orphans_and_unknowns: String,
}

pub fn environment_json(env_id: &str, generated_at_utc: &str, counts: Counts, firewalls: &[Value], panorama: &[Value], edges: &[Edge]) -> Result<Vec<u8>, ExportError> {
    let doc = json!({
        "schema_version": 1,
        "environment": {
            "env_id": env_id,
            "generated_at_utc": generated_at_utc,
            "counts": counts,
        },
        "firewalls": firewalls,
        "panorama": panorama,
        "topology": { "zone_edges": edges },
    });
    let mut out = serde_json::to_vec_pretty(&doc)?;
    out.push(b'\n');
    Ok(out)
}

fn csv_bytes<I, R>(header: &[&str], rows: I) -> Result<Vec<u8>, ExportError>
where
    I: IntoIterator<Item = R>,
    R: IntoIterator,
    R::Item: AsRef<[u8]>,
{
    let mut wtr = csv::Writer::from_writer(Vec::new());
    wtr.write_record(header)?;
    for row in rows {
        wtr.write_record(row)?;
    }
    wtr.into_inner().map_err(|e| ExportError::Io(e.into_error()))
}

/// Rows sorted by entity type then id; protocol lists are `;`-joined.
pub fn inventory_csv(rows: &[InventoryRow]) -> Result<Vec<u8>, ExportError> {
    let mut rows = rows.to_vec();
    rows.sort_by(|a, b| (&a.entity_type, &a.entity_id).cmp(&(&b.entity_type, &b.entity_id)));
    let joined = |v: &[String]| {
        let mut v = v.to_vec();
        v.sort();
        v.join(";")
    };
    csv_bytes(
        INVENTORY_HEADER,
        rows.iter().map(|r| {
            vec![
                r.entity_type.clone(), r.entity_id.clone(), r.hostname.clone(), r.serial.clone(), r.model.clone(), r.version.clone(),
                r.mgmt_ip.clone(), r.ha_enabled.clone(), r.ha_mode.clone(), r.ha_state.clone(),
                joined(&r.routing_protocols_configured), joined(&r.routing_protocols_active),
                r.source_tsf_id.clone(), r.state_sha256.clone(), r.last_ingested_at_utc.clone(),
            ]
        }),
    )
}

pub fn nodes_csv(nodes: &[NodeRow]) -> Result<Vec<u8>, ExportError> {
    let mut nodes = nodes.to_vec();
    nodes.sort_by(|a, b| (&a.node_type, &a.node_id).cmp(&(&b.node_type, &b.node_id)));
    csv_bytes(
        NODES_HEADER,
        nodes.iter().map(|n| [&n.node_id, &n.node_type, &n.env_id, &n.device_id, &n.panorama_id, &n.zone, &n.virtual_router, &n.label]),
    )
}

pub fn edges_csv(edges: &[Edge]) -> Result<Vec<u8>, ExportError> {
    let mut edges = edges.to_vec();
    edges.sort_by(|a, b| a.edge_id.cmp(&b.edge_id));
    csv_bytes(
        EDGES_HEADER,
        edges.iter().map(|e| {
            vec![
                e.edge_id.clone(), e.edge_type.as_str().to_string(),
                zone_node_id(&e.src.device_id, &e.src.zone), zone_node_id(&e.dst.device_id, &e.dst.zone),
                e.src.device_id.clone(), e.src.zone.clone(), e.src.interface.clone(), e.src.vr.clone(),
                e.dst.device_id.clone(), e.dst.zone.clone(), e.dst.interface.clone(), e.dst.vr.clone(),
                String::new(), e.source.as_str().to_string(),
            ]
        }),
    )
}

/// `graph TD` with one zone-to-zone arrow per edge, in edge id order.
pub fn topology_mermaid(edges: &[Edge]) -> String {
    let mut edges: Vec<&Edge> = edges.iter().collect();
    edges.sort_by(|a, b| a.edge_id.cmp(&b.edge_id));
    let mut out = String::from("graph TD\n");
    for e in edges {
        let src = mermaid_id(&zone_node_id(&e.src.device_id, &e.src.zone));
        let dst = mermaid_id(&zone_node_id(&e.dst.device_id, &e.dst.zone));
        out.push_str(&format!("  {} --> {}\n", src, dst));
    }
    out
}

pub fn agent_context(ctx: &AgentContext) -> String {
    let sections = [
        ("# Environment Summary", &ctx.environment_summary),
        ("## Inventory Counts", &ctx.inventory_counts),
        ("## Routing Usage", &ctx.routing_usage),
        ("## Panorama Overview", &ctx.panorama_overview),
        ("## Topology Highlights", &ctx.topology_highlights),
        ("## Orphans and Unknowns", &ctx.orphans_and_unknowns),
    ];
    sections.iter().map(|(title, body)| format!("{}\n{}\n", title, body)).collect::<Vec<_>>().join("\n")
}

pub fn firewall_node_id(id: &str) -> String { format!("firewall_{}", sanitize(id)) }
pub fn panorama_node_id(id: &str) -> String { format!("panorama_{}", sanitize(id)) }
pub fn zone_node_id(device_id: &str, zone: &str) -> String { format!("zone_{}_{}", sanitize(device_id), sanitize(zone)) }

fn sanitize(s: &str) -> String {
    s.trim().to_lowercase().chars().map(|c| if matches!(c, ' ' | '/' | '\\' | ':' | '.' | '-') { '_' } else { c }).collect()
}

fn mermaid_id(s: &str) -> String {
    s.chars().map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' }).collect()
}
