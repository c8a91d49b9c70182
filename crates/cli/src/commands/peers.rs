//! Peers Command
//!
//! Lists the exchange points that a bootstrap run would configure.

use anyhow::Result;
use peerlab_common::PeerRecord;

use crate::bootstrap::Bootstrapper;
use crate::config::BootstrapConfig;
use crate::output::{print_list, OutputFormat, TableDisplay};

impl TableDisplay for PeerRecord {
    fn headers() -> Vec<&'static str> {
        vec!["Name", "Address", "ASN", "DNS Name"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.address.clone(),
            format!("AS{}", self.asn),
            self.dns_name.clone(),
        ]
    }
}

pub async fn execute(config: &BootstrapConfig, format: OutputFormat) -> Result<()> {
    let bootstrapper = Bootstrapper::new(super::tailscale(config), config.clone()).quiet(true);

    bootstrapper.wait_until_ready().await?;
    let discovery = bootstrapper.discover().await?;

    print_list(&discovery.peers, format);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_row() {
        let peer = PeerRecord {
            name: "ixpams01".to_string(),
            address: "100.64.0.11".to_string(),
            asn: 215011,
            dns_name: "ixpams01.mesh.nxthdr.dev.".to_string(),
        };
        assert_eq!(PeerRecord::headers().len(), peer.row().len());
        assert_eq!(peer.row()[2], "AS215011");
    }
}
