//! PeerLab Bootstrap - Main Entry Point
//!
//! Waits for the Tailscale daemon, discovers IXP servers on the mesh and
//! renders the BIRD configuration from a Jinja-style template.

use anyhow::Context;
use clap::{Parser, Subcommand};
use peerlab_common::ContainerRuntime;
use std::path::PathBuf;

use peerlab_cli::commands::{peers, render, run};
use peerlab_cli::config::{BootstrapConfig, Overrides};
use peerlab_cli::output::{self, OutputFormat};

/// PeerLab Bootstrap - BIRD configuration from the Tailscale mesh
#[derive(Parser)]
#[command(name = "peerlab-bootstrap")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// TOML configuration file
    #[arg(long, env = "PEERLAB_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Local ASN (e.g. 64512 or AS64512)
    #[arg(long, env = "USER_ASN", global = true)]
    asn: Option<String>,

    /// Container running tailscaled
    #[arg(long, env = "TAILSCALE_CONTAINER", global = true)]
    container: Option<String>,

    /// How to reach tailscale: docker, podman or host
    #[arg(long, env = "PEERLAB_RUNTIME", global = true)]
    runtime: Option<ContainerRuntime>,

    /// BIRD configuration template
    #[arg(long, env = "PEERLAB_TEMPLATE", global = true)]
    template: Option<PathBuf>,

    /// Rendered configuration destination
    #[arg(long, env = "PEERLAB_OUTPUT", global = true)]
    output: Option<PathBuf>,

    /// Seconds to wait for Tailscale to become ready
    #[arg(long, env = "PEERLAB_READY_TIMEOUT", global = true)]
    timeout: Option<u64>,

    /// Output format for listings
    #[arg(long, default_value = "table", global = true)]
    format: OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Wait for Tailscale, discover IXP servers and write the BIRD config (default)
    Run,

    /// List IXP servers visible on the mesh
    Peers,

    /// Render from a saved status document without querying Tailscale
    Render(render::RenderArgs),
}

impl Cli {
    fn load_config(&self) -> anyhow::Result<BootstrapConfig> {
        let base = match &self.config {
            Some(path) => BootstrapConfig::load(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => BootstrapConfig::default(),
        };

        let config = base.apply(Overrides {
            local_asn: self.asn.clone(),
            container: self.container.clone(),
            runtime: self.runtime,
            template_path: self.template.clone(),
            output_path: self.output.clone(),
            timeout_secs: self.timeout,
        })?;
        Ok(config)
    }
}

async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    let config = cli.load_config()?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run::execute(&config).await?,
        Commands::Peers => peers::execute(&config, cli.format).await?,
        Commands::Render(args) => render::execute(args, &config).await?,
    }

    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = dispatch(cli).await {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}
