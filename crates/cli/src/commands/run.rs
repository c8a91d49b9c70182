//! Run Command
//!
//! The full bootstrap: wait for Tailscale, discover exchange points, render
//! the BIRD configuration.

use anyhow::Result;

use crate::bootstrap::Bootstrapper;
use crate::config::BootstrapConfig;

pub async fn execute(config: &BootstrapConfig) -> Result<()> {
    println!("🔧 PeerLab Bootstrap");
    println!("====================");
    println!();

    let bootstrapper = Bootstrapper::new(super::tailscale(config), config.clone());
    bootstrapper.run().await?;

    Ok(())
}
