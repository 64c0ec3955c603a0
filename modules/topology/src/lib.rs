//! Zone adjacency between firewalls, inferred from shared IPv4 subnets and
//! merged with operator overrides.

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("read overrides: {0}")]
    Io(#[from] io::Error),
    #[error("decode overrides: {0}")]
    Json(#[from] serde_json::Error),
}

/// A firewall interface as seen by the inferrer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Interface {
    pub device_id: String,
    pub zone: String,
    pub name: String,
    pub vr: String,
    pub ip_cidrs: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeType {
    SharedSubnet,
    ManualOverride,
}

impl EdgeType {
    pub fn as_str(self) -> &'static str {
        match self {
            EdgeType::SharedSubnet => "shared_subnet",
            EdgeType::ManualOverride => "manual_override",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeSource {
    Inferred,
    Override,
}

impl EdgeSource {
    pub fn as_str(self) -> &'static str {
        match self {
            EdgeSource::Inferred => "inferred",
            EdgeSource::Override => "override",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub device_id: String,
    pub zone: String,
    pub interface: String,
    pub vr: String,
}

impl Endpoint {
    fn key(&self) -> String {
        format!("{}|{}|{}|{}", self.device_id, self.zone, self.interface, self.vr)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub edge_id: String,
    pub edge_type: EdgeType,
    pub src: Endpoint,
    pub dst: Endpoint,
    pub source: EdgeSource,
}

impl Edge {
    /// Build an edge with endpoints in canonical order, so the same adjacency
    /// gets the same id whichever side was found first.
    pub fn new(edge_type: EdgeType, source: EdgeSource, a: Endpoint, b: Endpoint) -> Self {
        let (src, dst) = if a.key() > b.key() { (b, a) } else { (a, b) };
        let edge_id = format!("{}|{}|{}", edge_type.as_str(), src.key(), dst.key());
        Edge { edge_id, edge_type, src, dst, source }
    }
}

/// One entry of `overrides/topology_links.json`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OverrideLink {
    pub src_device_id: String,
    pub src_zone: String,
    pub src_interface: String,
    pub src_vr: String,
    pub dst_device_id: String,
    pub dst_zone: String,
    pub dst_interface: String,
    pub dst_vr: String,
}

impl From<&Interface> for Endpoint {
    fn from(i: &Interface) -> Self {
        Endpoint { device_id: i.device_id.clone(), zone: i.zone.clone(), interface: i.name.clone(), vr: i.vr.clone() }
    }
}

pub fn infer_shared_subnet_edges(interfaces: &[Interface]) -> Vec<Edge> {
    let mut edges = Vec::new();
    let mut seen = HashSet::new();
    for (i, a) in interfaces.iter().enumerate() {
        for b in &interfaces[i + 1..] {
            if a.device_id == b.device_id || a.vr.is_empty() || a.vr != b.vr {
                continue;
            }
            if !shares_ipv4_subnet(&a.ip_cidrs, &b.ip_cidrs) {
                continue;
            }
            let edge = Edge::new(EdgeType::SharedSubnet, EdgeSource::Inferred, a.into(), b.into());
            if seen.insert(edge.edge_id.clone()) {
                edges.push(edge);
            }
        }
    }
    edges.sort_by(|x, y| x.edge_id.cmp(&y.edge_id));
    edges
}

/// Add override links to `inferred`. Links whose canonical id is already
/// present are skipped; a missing overrides file adds nothing.
pub fn merge_override_edges(inferred: Vec<Edge>, overrides: &Path) -> Result<Vec<Edge>, TopologyError> {
    let mut edges = inferred;
    let links: Vec<OverrideLink> = match fs::read(overrides) {
        Ok(data) => serde_json::from_slice(&data)?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
        Err(e) => return Err(e.into()),
    };
    let mut seen: HashSet<String> = edges.iter().map(|e| e.edge_id.clone()).collect();
    for link in links {
        let src = Endpoint { device_id: link.src_device_id, zone: link.src_zone, interface: link.src_interface, vr: link.src_vr };
        let dst = Endpoint { device_id: link.dst_device_id, zone: link.dst_zone, interface: link.dst_interface, vr: link.dst_vr };
        let edge = Edge::new(EdgeType::ManualOverride, EdgeSource::Override, src, dst);
        if seen.insert(edge.edge_id.clone()) {
            edges.push(edge);
        } else {
            tracing::debug!(edge_id = %edge.edge_id, "override link already present");
        }
    }
    edges.sort_by(|x, y| x.edge_id.cmp(&y.edge_id));
    Ok(edges)
}

// Same prefix length, and each address lies in the other's network.
fn shares_ipv4_subnet(a: &[String], b: &[String]) -> bool {
    let nets = |cidrs: &[String]| -> Vec<Ipv4Net> { cidrs.iter().filter_map(|c| c.trim().parse().ok()).collect() };
    let (a, b) = (nets(a), nets(b));
    a.iter().any(|x| b.iter().any(|y| x.prefix_len() == y.prefix_len() && x.contains(&y.addr()) && y.contains(&x.addr())))
}
