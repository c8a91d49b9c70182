//! Bootstrap pipeline
//!
//! Waits for the mesh daemon, discovers exchange-point peers, and renders the
//! BIRD configuration. Every failure is terminal for the run.

use peerlab_common::{
    discover_exchange_points, ConfigRenderer, ContainerRuntime, Error, PeerRecord, ProbeOutcome,
    RenderContext, Result, StatusProvider,
};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, info};

use crate::config::BootstrapConfig;
use crate::output::{print_hint, print_step, print_success, print_warning};

/// Timestamp format written into generated configuration
const GENERATION_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Bounded linear readiness polling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPolicy {
    pub timeout: Duration,
    pub interval: Duration,
}

impl From<&BootstrapConfig> for ReadinessPolicy {
    fn from(config: &BootstrapConfig) -> Self {
        Self {
            timeout: config.readiness.timeout(),
            interval: config.readiness.poll_interval(),
        }
    }
}

/// Local address and exchange points found on the mesh
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discovery {
    pub local_address: String,
    pub peers: Vec<PeerRecord>,
}

/// Outcome of a successful bootstrap
#[derive(Debug, Clone)]
pub struct BootstrapReport {
    pub context: RenderContext,
    pub output_path: PathBuf,
    pub rendered: String,
}

/// Current local time in the configuration header format
pub fn generation_time() -> String {
    chrono::Local::now().format(GENERATION_TIME_FORMAT).to_string()
}

/// Drives a status provider through the bootstrap pipeline
pub struct Bootstrapper<P> {
    provider: P,
    config: BootstrapConfig,
    policy: ReadinessPolicy,
    quiet: bool,
}

impl<P: StatusProvider> Bootstrapper<P> {
    pub fn new(provider: P, config: BootstrapConfig) -> Self {
        let policy = ReadinessPolicy::from(&config);
        Self {
            provider,
            config,
            policy,
            quiet: false,
        }
    }

    pub fn with_policy(mut self, policy: ReadinessPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Suppress progress lines on stdout (hints still go to stderr)
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    pub fn config(&self) -> &BootstrapConfig {
        &self.config
    }

    fn step(&self, icon: &str, message: &str) {
        if !self.quiet {
            print_step(icon, message);
        }
    }

    fn success(&self, message: &str) {
        if !self.quiet {
            print_success(message);
        }
    }

    /// Report the local ASN, warning when the placeholder is in use
    pub fn announce(&self) {
        if self.config.uses_default_asn() && !self.quiet {
            print_warning(&format!("Using default ASN {}", self.config.local_asn));
            println!("   Consider setting a unique ASN in your .env file");
        }
        self.step("📋", &format!("Local ASN: AS{}", self.config.local_asn));
    }

    /// Poll the provider until it reports ready or the timeout elapses.
    pub async fn wait_until_ready(&self) -> Result<()> {
        self.step("⏳", "Waiting for Tailscale to become ready...");

        let start = Instant::now();
        let mut attempts = 0u32;

        let last = loop {
            attempts += 1;
            let outcome = self.provider.probe().await;
            debug!("Readiness probe {}: {}", attempts, outcome);

            if outcome == ProbeOutcome::Ready {
                info!("Mesh daemon ready after {} probe(s)", attempts);
                self.success("Tailscale is running and authenticated");
                return Ok(());
            }
            if start.elapsed() >= self.policy.timeout {
                break outcome;
            }
            sleep(self.policy.interval).await;
        };

        match last {
            ProbeOutcome::Unauthenticated => {
                print_hint(&self.authentication_hint());
                Err(Error::NotAuthenticated {
                    container: self.config.container.clone(),
                })
            }
            _ => Err(Error::ReadinessTimeout {
                seconds: self.policy.timeout.as_secs(),
                attempts,
            }),
        }
    }

    fn authentication_hint(&self) -> Vec<String> {
        let exec = match self.config.runtime {
            ContainerRuntime::Host => "sudo".to_string(),
            runtime => format!("{} exec -it {}", runtime, self.config.container),
        };
        vec![
            String::new(),
            "Please authenticate first by running:".to_string(),
            "  make auth".to_string(),
            String::new(),
            "Or manually:".to_string(),
            format!("  {} tailscale up \\", exec),
            format!("    --login-server={} \\", self.config.login_server),
            "    --accept-routes --reset".to_string(),
            String::new(),
        ]
    }

    /// Fetch status and local address, then select exchange points.
    pub async fn discover(&self) -> Result<Discovery> {
        self.step("🔍", "Getting Tailscale network information...");

        let snapshot = self.provider.status().await?;
        let local_address = self.provider.local_address().await?;
        self.success(&format!("Local IP: {}", local_address));

        let peers = discover_exchange_points(&snapshot);
        debug!(
            "{} of {} peers are exchange points",
            peers.len(),
            snapshot.peer_count()
        );

        if peers.is_empty() {
            print_hint(&[
                "Make sure you're connected to a Tailscale network with IXP servers".to_string(),
            ]);
            return Err(Error::NoMatchingPeers);
        }

        self.success(&format!("Found {} IXP server(s):", peers.len()));
        if !self.quiet {
            for peer in &peers {
                println!("   - {}: {} (AS{})", peer.name, peer.address, peer.asn);
            }
        }

        Ok(Discovery {
            local_address,
            peers,
        })
    }

    /// Build the render context for a discovery
    pub fn context(&self, discovery: Discovery) -> RenderContext {
        RenderContext {
            local_address: discovery.local_address,
            local_asn: self.config.local_asn,
            peers: discovery.peers,
            generation_time: generation_time(),
        }
    }

    /// Render and write the configuration for a discovery
    pub fn render(&self, discovery: Discovery) -> Result<BootstrapReport> {
        self.step("🔧", "Rendering BIRD configuration from template...");

        let context = self.context(discovery);
        let renderer = ConfigRenderer::new(&self.config.template_path, &self.config.output_path);
        let rendered = renderer.render(&context)?;

        self.success(&format!(
            "Configuration written to {}",
            self.config.output_path.display()
        ));
        if !self.quiet {
            println!();
            print_step("📋", "Generated BGP sessions:");
            for peer in &context.peers {
                println!("   - protocol bgp {}", peer.name);
            }
            println!();
        }

        Ok(BootstrapReport {
            context,
            output_path: self.config.output_path.clone(),
            rendered,
        })
    }

    /// Full pipeline: announce, wait, discover, render
    pub async fn run(&self) -> Result<BootstrapReport> {
        self.announce();
        self.wait_until_ready().await?;
        let discovery = self.discover().await?;
        let report = self.render(discovery)?;
        self.success("Bootstrap complete!");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use peerlab_common::StaticStatus;

    fn provider() -> StaticStatus {
        StaticStatus::from_json(
            r#"{"Peer": {
                "p1": {"HostName": "ixpfra01", "DNSName": "ixpfra01.mesh.", "TailscaleIPs": ["100.64.0.5"]},
                "p2": {"HostName": "other", "TailscaleIPs": ["100.64.0.9"]}
            }}"#,
            "100.64.0.1",
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_discover() {
        let bootstrapper = Bootstrapper::new(provider(), BootstrapConfig::default()).quiet(true);
        let discovery = bootstrapper.discover().await.unwrap();

        assert_eq!(discovery.local_address, "100.64.0.1");
        assert_eq!(discovery.peers.len(), 1);
        assert_eq!(discovery.peers[0].name, "ixpfra01");
        assert_eq!(discovery.peers[0].asn, 215011);
    }

    #[tokio::test]
    async fn test_discover_without_peers() {
        let empty = StaticStatus::from_json("{}", "100.64.0.1").unwrap();
        let err = Bootstrapper::new(empty, BootstrapConfig::default())
            .quiet(true)
            .discover()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoMatchingPeers));
    }

    #[test]
    fn test_context_uses_configured_asn() {
        let config = BootstrapConfig {
            local_asn: 65010,
            ..Default::default()
        };
        let bootstrapper = Bootstrapper::new(provider(), config);
        let ctx = bootstrapper.context(Discovery {
            local_address: "100.64.0.1".to_string(),
            peers: Vec::new(),
        });
        assert_eq!(ctx.local_asn, 65010);
        assert_eq!(ctx.generation_time.len(), "2024-01-01 00:00:00".len());
    }

    #[test]
    fn test_policy_from_config() {
        let policy = ReadinessPolicy::from(&BootstrapConfig::default());
        assert_eq!(policy.timeout, Duration::from_secs(30));
        assert_eq!(policy.interval, Duration::from_secs(1));
    }

    #[test]
    fn test_authentication_hint_names_container() {
        let bootstrapper = Bootstrapper::new(provider(), BootstrapConfig::default());
        let hint = bootstrapper.authentication_hint().join("\n");
        assert!(hint.contains("docker exec -it peerlab-tailscale tailscale up"));
        assert!(hint.contains("--login-server=https://headscale.nxthdr.dev"));
    }
}
