//! Persisted snapshot documents.
//!
//! Every field defaults on read so older or hand-edited `latest.json` files
//! still load.

use serde::{Deserialize, Serialize};

pub const SNAPSHOT_VERSION: u32 = 1;
pub const PLACEHOLDER_SHA256: &str = "0000000000000000000000000000000000000000000000000000000000000000";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Source {
    pub tsf_id: String,
    pub tsf_original_name: String,
    pub input_archive_name: String,
    pub ingested_at_utc: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FirewallSnapshot {
    pub snapshot_version: u32,
    pub source: Source,
    pub state_sha256: String,
    pub device: Device,
    pub ha: Ha,
    pub licenses: Vec<License>,
    pub network: Network,
    pub routing: Routing,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Device {
    pub id: String,
    pub hostname: String,
    pub serial: String,
    pub model: String,
    pub sw_version: String,
    pub mgmt_ip: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dns: Option<DeviceDns>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceDns {
    pub reverse: ReverseDns,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReverseDns {
    pub ip: String,
    pub ptr_name: String,
    pub status: String,
    pub looked_up_at_utc: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Ha {
    pub enabled: bool,
    pub mode: String,
    pub local_state: String,
    pub peer_serial: String,
}

impl Default for Ha {
    fn default() -> Self {
        Ha { enabled: false, mode: "unknown".to_string(), local_state: String::new(), peer_serial: String::new() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct License {
    pub name: String,
    pub expires: String,
    pub expired: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Network {
    pub interfaces: Vec<Interface>,
    pub zones: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Interface {
    pub name: String,
    pub zone: String,
    pub virtual_router: String,
    pub ip_cidrs: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Routing {
    pub virtual_routers: Vec<VirtualRouter>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VirtualRouter {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PanoramaSnapshot {
    pub snapshot_version: u32,
    pub source: Source,
    pub state_sha256: String,
    pub panorama_instance: PanoramaInstance,
    pub panorama_config: PanoramaConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PanoramaInstance {
    pub id: String,
    pub hostname: String,
    pub serial: String,
    pub model: String,
    pub version: String,
    pub mgmt_ip: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PanoramaConfig {
    pub device_groups: Vec<DeviceGroup>,
    pub templates: Vec<String>,
    pub template_stacks: Vec<TemplateStack>,
    pub managed_devices: Vec<ManagedDevice>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceGroup {
    pub name: String,
    pub members_serials: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateStack {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagedDevice {
    pub serial: String,
}
