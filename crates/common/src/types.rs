//! Core types for PeerLab

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// Snapshot of the mesh as reported by `tailscale status --json`.
///
/// Only the fields the bootstrap needs are modelled; everything else in the
/// document is ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusSnapshot {
    #[serde(rename = "BackendState", default)]
    pub backend_state: Option<String>,

    #[serde(rename = "Self", default)]
    pub self_node: Option<PeerStatus>,

    /// Peers keyed by node key. Tailscale emits `null` when there are none.
    #[serde(rename = "Peer", default)]
    pub peer: Option<BTreeMap<String, PeerStatus>>,
}

impl StatusSnapshot {
    /// Iterate peers in identifier order
    pub fn peers(&self) -> impl Iterator<Item = (&String, &PeerStatus)> {
        self.peer.iter().flat_map(|peers| peers.iter())
    }

    pub fn peer_count(&self) -> usize {
        self.peer.as_ref().map_or(0, BTreeMap::len)
    }
}

/// A single node entry in the status snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeerStatus {
    #[serde(rename = "HostName", default, deserialize_with = "null_as_default")]
    pub host_name: String,

    #[serde(rename = "DNSName", default, deserialize_with = "null_as_default")]
    pub dns_name: String,

    #[serde(rename = "TailscaleIPs", default, deserialize_with = "nullable_addresses")]
    pub tailscale_ips: Option<Vec<String>>,

    #[serde(rename = "Online", default)]
    pub online: Option<bool>,
}

/// Treat an explicit `null` like a missing field
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// Address list where `null` entries become empty strings
fn nullable_addresses<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let ips = Option::<Vec<Option<String>>>::deserialize(deserializer)?;
    Ok(ips.map(|ips| ips.into_iter().map(Option::unwrap_or_default).collect()))
}

impl PeerStatus {
    /// First mesh address, if any
    pub fn primary_address(&self) -> Option<&str> {
        self.tailscale_ips
            .as_deref()
            .and_then(|ips| ips.first())
            .map(String::as_str)
            .filter(|ip| !ip.is_empty())
    }
}

/// An exchange-point server selected for a BGP session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerRecord {
    pub name: String,
    pub address: String,
    pub asn: u32,
    /// Fully-qualified mesh name, informational only
    pub dns_name: String,
}

/// Everything the configuration template can see
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderContext {
    pub local_address: String,
    pub local_asn: u32,
    pub peers: Vec<PeerRecord>,
    pub generation_time: String,
}

impl RenderContext {
    /// Template variables, including the names used by older templates
    /// (`local_ip`, `ixp_servers`, per-peer `ip`).
    pub fn to_template_value(&self) -> Value {
        let peers: Vec<Value> = self
            .peers
            .iter()
            .map(|peer| {
                json!({
                    "name": peer.name,
                    "address": peer.address,
                    "ip": peer.address,
                    "asn": peer.asn,
                    "dns_name": peer.dns_name,
                })
            })
            .collect();

        json!({
            "local_address": self.local_address,
            "local_ip": self.local_address,
            "local_asn": self.local_asn,
            "peers": peers,
            "ixp_servers": peers,
            "generation_time": self.generation_time,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_snapshot_null_peers() {
        let snapshot: StatusSnapshot =
            serde_json::from_str(r#"{"BackendState": "Running", "Peer": null}"#).unwrap();
        assert_eq!(snapshot.peer_count(), 0);
        assert_eq!(snapshot.peers().count(), 0);
        assert_eq!(snapshot.backend_state.as_deref(), Some("Running"));
    }

    #[test]
    fn test_status_snapshot_ignores_unknown_fields() {
        let raw = r#"{
            "Version": "1.62.0",
            "Self": {"HostName": "peerlab", "TailscaleIPs": ["100.64.0.1"]},
            "Peer": {
                "nodekey:b": {"HostName": "ixpams01", "DNSName": "ixpams01.mesh.", "TailscaleIPs": ["100.64.0.3", "fd7a::3"], "Online": true, "OS": "linux"},
                "nodekey:a": {"HostName": "laptop", "TailscaleIPs": null}
            }
        }"#;
        let snapshot: StatusSnapshot = serde_json::from_str(raw).unwrap();

        let keys: Vec<&String> = snapshot.peers().map(|(id, _)| id).collect();
        assert_eq!(keys, vec!["nodekey:a", "nodekey:b"]);

        let ams = &snapshot.peer.as_ref().unwrap()["nodekey:b"];
        assert_eq!(ams.primary_address(), Some("100.64.0.3"));
        assert_eq!(ams.online, Some(true));

        let laptop = &snapshot.peer.as_ref().unwrap()["nodekey:a"];
        assert_eq!(laptop.primary_address(), None);
        assert_eq!(
            snapshot.self_node.unwrap().primary_address(),
            Some("100.64.0.1")
        );
    }

    #[test]
    fn test_template_value_aliases() {
        let ctx = RenderContext {
            local_address: "100.64.0.1".to_string(),
            local_asn: 64512,
            peers: vec![PeerRecord {
                name: "ixpfra01".to_string(),
                address: "100.64.0.5".to_string(),
                asn: 215011,
                dns_name: "ixpfra01.mesh.".to_string(),
            }],
            generation_time: "2024-01-01 00:00:00".to_string(),
        };

        let value = ctx.to_template_value();
        assert_eq!(value["local_ip"], value["local_address"]);
        assert_eq!(value["ixp_servers"], value["peers"]);
        assert_eq!(value["peers"][0]["ip"], "100.64.0.5");
        assert_eq!(value["peers"][0]["asn"], 215011);
    }

    #[test]
    fn test_peer_status_null_fields() {
        let raw = r#"{"Peer": {
            "p1": {"HostName": "ixpfra01", "DNSName": null, "TailscaleIPs": ["100.64.0.5"]},
            "p2": {"HostName": null, "DNSName": "x.mesh.", "TailscaleIPs": null},
            "p3": {"HostName": "ixpams01", "TailscaleIPs": [null, "100.64.0.6"]}
        }}"#;
        let snapshot: StatusSnapshot = serde_json::from_str(raw).unwrap();
        assert_eq!(snapshot.peer_count(), 3);

        let peers = snapshot.peer.as_ref().unwrap();
        assert_eq!(peers["p1"].dns_name, "");
        assert_eq!(peers["p1"].primary_address(), Some("100.64.0.5"));
        assert_eq!(peers["p2"].host_name, "");
        assert_eq!(peers["p2"].primary_address(), None);
        assert_eq!(peers["p3"].primary_address(), None);
    }
}
