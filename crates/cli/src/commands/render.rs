//! Render Command
//!
//! Offline rendering from a saved `tailscale status --json` document. Skips
//! the readiness wait; useful for previewing template changes.

use anyhow::{Context, Result};
use clap::Args;
use peerlab_common::{ConfigRenderer, StaticStatus};
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use crate::bootstrap::Bootstrapper;
use crate::config::BootstrapConfig;

#[derive(Args, Debug)]
pub struct RenderArgs {
    /// Saved `tailscale status --json` output ("-" reads stdin)
    #[arg(long)]
    pub status_file: PathBuf,

    /// Local mesh address
    #[arg(long)]
    pub local_address: IpAddr,

    /// Print the configuration instead of writing it
    #[arg(long)]
    pub stdout: bool,
}

fn read_status(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        std::io::read_to_string(std::io::stdin()).context("Failed to read status from stdin")
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read status file {}", path.display()))
    }
}

pub async fn execute(args: RenderArgs, config: &BootstrapConfig) -> Result<()> {
    let raw = read_status(&args.status_file)?;
    let provider = StaticStatus::from_json(&raw, args.local_address.to_string())?;

    let bootstrapper = Bootstrapper::new(provider, config.clone()).quiet(args.stdout);
    let discovery = bootstrapper.discover().await?;

    if args.stdout {
        let context = bootstrapper.context(discovery);
        let rendered = ConfigRenderer::new(&config.template_path, &config.output_path)
            .render_to_string(&context)?;
        print!("{}", rendered);
    } else {
        bootstrapper.render(discovery)?;
    }

    Ok(())
}
