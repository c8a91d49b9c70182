//! Exchange-point peer selection
//!
//! Turns a raw mesh status snapshot into the list of BGP neighbours the
//! configuration template iterates over.

use tracing::debug;

use crate::types::{PeerRecord, StatusSnapshot};

/// Host-name prefix marking an exchange-point server
pub const EXCHANGE_POINT_PREFIX: &str = "ixp";

/// ASN used for exchange points missing from [`KNOWN_EXCHANGE_POINTS`]
pub const DEFAULT_EXCHANGE_ASN: u32 = 215011;

/// Known exchange-point servers and their ASNs
pub const KNOWN_EXCHANGE_POINTS: &[(&str, u32)] = &[
    ("ixpfra01", 215011),
    ("ixpams01", 215011),
    ("ixpams02", 215011),
];

/// Resolve the ASN for an exchange-point host name.
pub fn resolve_asn(name: &str) -> u32 {
    KNOWN_EXCHANGE_POINTS
        .iter()
        .find(|(known, _)| *known == name)
        .map_or(DEFAULT_EXCHANGE_ASN, |(_, asn)| *asn)
}

/// Select every exchange-point server in the snapshot.
///
/// Peers are returned in snapshot iteration order. Exchange points without a
/// mesh address are skipped.
pub fn discover_exchange_points(snapshot: &StatusSnapshot) -> Vec<PeerRecord> {
    let mut records = Vec::new();

    for (id, peer) in snapshot.peers() {
        if !peer.host_name.starts_with(EXCHANGE_POINT_PREFIX) {
            continue;
        }

        let Some(address) = peer.primary_address() else {
            debug!("Skipping exchange point '{}' ({}): no mesh address", peer.host_name, id);
            continue;
        };

        records.push(PeerRecord {
            name: peer.host_name.clone(),
            address: address.to_string(),
            asn: resolve_asn(&peer.host_name),
            dns_name: peer.dns_name.clone(),
        });
    }

    records
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(raw: &str) -> StatusSnapshot {
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn test_selects_only_exchange_points() {
        let snap = snapshot(
            r#"{"Peer": {
                "p1": {"HostName": "ixpfra01", "DNSName": "ixpfra01.mesh.", "TailscaleIPs": ["100.64.0.5"]},
                "p2": {"HostName": "other", "TailscaleIPs": ["100.64.0.9"]}
            }}"#,
        );

        let peers = discover_exchange_points(&snap);
        assert_eq!(
            peers,
            vec![PeerRecord {
                name: "ixpfra01".to_string(),
                address: "100.64.0.5".to_string(),
                asn: 215011,
                dns_name: "ixpfra01.mesh.".to_string(),
            }]
        );
    }

    #[test]
    fn test_prefix_is_case_sensitive() {
        let snap = snapshot(
            r#"{"Peer": {
                "p1": {"HostName": "IXPFRA01", "TailscaleIPs": ["100.64.0.5"]},
                "p2": {"HostName": "my-ixp", "TailscaleIPs": ["100.64.0.6"]},
                "p3": {"HostName": "ixp", "TailscaleIPs": ["100.64.0.7"]}
            }}"#,
        );

        let names: Vec<String> = discover_exchange_points(&snap)
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["ixp"]);
    }

    #[test]
    fn test_skips_peers_without_addresses() {
        let snap = snapshot(
            r#"{"Peer": {
                "p1": {"HostName": "ixpams01", "TailscaleIPs": []},
                "p2": {"HostName": "ixpams02", "TailscaleIPs": null},
                "p3": {"HostName": "ixpams03"},
                "p4": {"HostName": "ixpfra01", "TailscaleIPs": ["100.64.0.5", "fd7a:115c:a1e0::5"]}
            }}"#,
        );

        let peers = discover_exchange_points(&snap);
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].name, "ixpfra01");
        assert_eq!(peers[0].address, "100.64.0.5");
    }

    #[test]
    fn test_resolve_asn() {
        for (name, asn) in KNOWN_EXCHANGE_POINTS {
            assert_eq!(resolve_asn(name), *asn);
        }
        assert_eq!(resolve_asn("ixpxyz99"), DEFAULT_EXCHANGE_ASN);
        assert_eq!(resolve_asn("ixpxyz99"), 215011);
    }

    #[test]
    fn test_empty_snapshot() {
        assert!(discover_exchange_points(&StatusSnapshot::default()).is_empty());
        assert!(discover_exchange_points(&snapshot(r#"{"Peer": {}}"#)).is_empty());
    }

    #[test]
    fn test_output_follows_snapshot_order() {
        let snap = snapshot(
            r#"{"Peer": {
                "nodekey:c": {"HostName": "ixpams02", "TailscaleIPs": ["100.64.0.12"]},
                "nodekey:a": {"HostName": "ixpfra01", "TailscaleIPs": ["100.64.0.10"]},
                "nodekey:b": {"HostName": "ixpams01", "TailscaleIPs": ["100.64.0.11"]}
            }}"#,
        );

        let names: Vec<String> = discover_exchange_points(&snap)
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["ixpfra01", "ixpams01", "ixpams02"]);
    }
}
