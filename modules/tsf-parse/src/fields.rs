//! Line-oriented field extraction from `show` command output.

use crate::model::{DeviceGroup, Interface, License, ManagedDevice, PanoramaConfig, TemplateStack, VirtualRouter};
use crate::Files;
use std::collections::BTreeSet;

pub const HOSTNAME_KEYS: &[&str] = &["hostname"];
pub const MGMT_IP_KEYS: &[&str] = &["mgmt_ip", "mgmt-ip", "ip-address", "ip address"];
pub const SW_VERSION_KEYS: &[&str] = &["sw_version", "sw-version", "version"];
pub const PANORAMA_VERSION_KEYS: &[&str] = &["version", "sw_version", "sw-version"];
pub const MODEL_KEYS: &[&str] = &["model"];

/// Value of `key: value` when `line` carries that key (case-insensitive,
/// whitespace allowed before the colon).
pub fn key_value<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let l = line.trim();
    let head = l.get(..key.len())?;
    if !head.eq_ignore_ascii_case(key) {
        return None;
    }
    l[key.len()..].trim_start().strip_prefix(':').map(str::trim)
}

fn lines(files: &Files) -> impl Iterator<Item = &str> {
    files.values().flat_map(|body| body.lines())
}

/// First non-empty value for any of `keys`, tried in order of preference.
pub fn first_value(files: &Files, keys: &[&str]) -> String {
    keys.iter()
        .find_map(|key| lines(files).filter_map(|l| key_value(l, key)).find(|v| !v.is_empty()))
        .unwrap_or_default()
        .to_string()
}

/// Rows of the logical interface table:
/// `name id vsys zone forwarding tag address`, where forwarding is `vr:<name>`
/// and the zone column may be blank.
pub fn interfaces(files: &Files) -> Vec<Interface> {
    let mut out: Vec<Interface> = Vec::new();
    for line in lines(files) {
        let cols: Vec<&str> = line.split_whitespace().collect();
        let Some(vr_idx) = cols.iter().position(|c| c.starts_with("vr:")) else { continue };
        if !(vr_idx == 3 || vr_idx == 4) || !cols[1].chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        let zone = if vr_idx == 4 { cols[3] } else { "" };
        let mut ip_cidrs: Vec<String> = cols
            .iter()
            .skip(vr_idx + 2)
            .filter(|c| c.contains('/') && !c.eq_ignore_ascii_case("n/a"))
            .map(|c| c.to_string())
            .collect();
        ip_cidrs.sort();
        ip_cidrs.dedup();
        let name = cols[0].to_string();
        if out.iter().any(|i| i.name == name) {
            continue;
        }
        out.push(Interface {
            name,
            zone: zone.to_string(),
            virtual_router: cols[vr_idx].trim_start_matches("vr:").to_string(),
            ip_cidrs,
        });
    }
    out.sort_by(|a, b| a.name.cmp(&b.name));
    out
}

pub fn zones(interfaces: &[Interface]) -> Vec<String> {
    let set: BTreeSet<&str> = interfaces.iter().map(|i| i.zone.as_str()).filter(|z| !z.is_empty()).collect();
    set.into_iter().map(String::from).collect()
}

pub fn virtual_routers(interfaces: &[Interface]) -> Vec<VirtualRouter> {
    let set: BTreeSet<&str> = interfaces.iter().map(|i| i.virtual_router.as_str()).filter(|v| !v.is_empty()).collect();
    set.into_iter().map(|name| VirtualRouter { name: name.to_string() }).collect()
}

/// `Feature:` opens a license block; `Expires:` and `Expired?:` fill it.
pub fn licenses(files: &Files) -> Vec<License> {
    let mut out: Vec<License> = Vec::new();
    for line in lines(files) {
        if let Some(name) = key_value(line, "feature") {
            out.push(License { name: name.to_string(), ..License::default() });
        } else if let Some(current) = out.last_mut() {
            if let Some(v) = key_value(line, "expires") {
                current.expires = v.to_string();
            } else if let Some(v) = key_value(line, "expired?") {
                current.expired = v.eq_ignore_ascii_case("yes");
            }
        }
    }
    out.retain(|l| !l.name.is_empty());
    out.sort_by(|a, b| a.name.cmp(&b.name));
    out.dedup_by(|a, b| a.name == b.name);
    out
}

/// `device-group:` opens a group that collects the `managed_serial:` lines
/// after it; every managed serial also lands in `managed_devices`.
pub fn panorama_config(files: &Files) -> PanoramaConfig {
    let mut groups: Vec<DeviceGroup> = Vec::new();
    let mut templates = BTreeSet::new();
    let mut stacks = BTreeSet::new();
    let mut managed = BTreeSet::new();
    for line in lines(files) {
        if let Some(name) = key_value(line, "device-group").filter(|v| !v.is_empty()) {
            groups.push(DeviceGroup { name: name.to_string(), members_serials: Vec::new() });
        } else if let Some(serial) = key_value(line, "managed_serial").filter(|v| !v.is_empty()) {
            managed.insert(serial.to_string());
            if let Some(group) = groups.last_mut() {
                group.members_serials.push(serial.to_string());
            }
        } else if let Some(name) = key_value(line, "template-stack").filter(|v| !v.is_empty()) {
            stacks.insert(name.to_string());
        } else if let Some(name) = key_value(line, "template").filter(|v| !v.is_empty()) {
            templates.insert(name.to_string());
        }
    }
    for g in &mut groups {
        g.members_serials.sort();
        g.members_serials.dedup();
    }
    groups.sort_by(|a, b| a.name.cmp(&b.name));
    groups.dedup_by(|a, b| a.name == b.name);
    PanoramaConfig {
        device_groups: groups,
        templates: templates.into_iter().collect(),
        template_stacks: stacks.into_iter().map(|name| TemplateStack { name }).collect(),
        managed_devices: managed.into_iter().map(|serial| ManagedDevice { serial }).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files(body: &str) -> Files {
        Files::from([("a.txt".to_string(), body.to_string())])
    }

    #[test]
    fn key_spellings() {
        assert_eq!(key_value("  IP Address : 10.0.0.1 ", "ip address"), Some("10.0.0.1"));
        assert_eq!(key_value("sw_version: 11.0", "version"), None);
        assert_eq!(key_value("template-stack: x", "template"), None);
        let f = files("ip-address: 10.0.0.9\nsw-version: 11.2.4-h7\n");
        assert_eq!(first_value(&f, MGMT_IP_KEYS), "10.0.0.9");
        assert_eq!(first_value(&f, SW_VERSION_KEYS), "11.2.4-h7");
        assert_eq!(first_value(&f, HOSTNAME_KEYS), "");
    }

    #[test]
    fn interface_table_rows() {
        let f = files(
            "name                id    vsys zone             forwarding               tag    address\n\
             ------------------- ----- ---- ---------------- ------------------------ ------ ------------------\n\
             ethernet1/2         17    1    trust            vr:default               0      10.0.0.1/24\n\
             ethernet1/1         16    1    untrust          vr:default               0      203.0.113.2/30\n\
             ethernet1/3         18    1                     vr:lab                   0      N/A\n",
        );
        let ifs = interfaces(&f);
        assert_eq!(ifs.len(), 3);
        assert_eq!(ifs[0].name, "ethernet1/1");
        assert_eq!(ifs[1].ip_cidrs, vec!["10.0.0.1/24".to_string()]);
        assert_eq!(ifs[2].zone, "");
        assert!(ifs[2].ip_cidrs.is_empty());
        assert_eq!(zones(&ifs), vec!["trust".to_string(), "untrust".to_string()]);
        let vrs: Vec<String> = virtual_routers(&ifs).into_iter().map(|v| v.name).collect();
        assert_eq!(vrs, vec!["default".to_string(), "lab".to_string()]);
    }

    #[test]
    fn license_blocks() {
        let f = files("Feature: WildFire License\nExpires: Never\nExpired?: no\nFeature: Threat Prevention\nExpires: 2024-11-03\nExpired?: yes\n");
        let l = licenses(&f);
        assert_eq!(l.len(), 2);
        assert_eq!(l[0].name, "Threat Prevention");
        assert!(l[0].expired);
        assert_eq!(l[1].expires, "Never");
    }

    #[test]
    fn panorama_objects() {
        let f = files("managed_serial: S0\ndevice-group: branch\nmanaged_serial: S2\nmanaged_serial: S1\ntemplate: base\ntemplate-stack: stack-a\ntemplate: base\n");
        let cfg = panorama_config(&f);
        assert_eq!(cfg.device_groups.len(), 1);
        assert_eq!(cfg.device_groups[0].members_serials, vec!["S1".to_string(), "S2".to_string()]);
        assert_eq!(cfg.templates, vec!["base".to_string()]);
        assert_eq!(cfg.template_stacks[0].name, "stack-a");
        assert_eq!(cfg.managed_devices.len(), 3);
    }
}
