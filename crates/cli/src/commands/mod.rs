//! CLI Commands

pub mod peers;
pub mod render;
pub mod run;

use peerlab_common::TailscaleCli;

use crate::config::BootstrapConfig;

/// Status provider for the configured runtime and container
pub fn tailscale(config: &BootstrapConfig) -> TailscaleCli {
    TailscaleCli::new(
        config.runtime,
        config.container.clone(),
        config.readiness.command_timeout(),
    )
}
