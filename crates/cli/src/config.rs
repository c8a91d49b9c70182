//! Bootstrap configuration
//!
//! Built-in defaults, optionally overlaid by a TOML file, then by CLI flags
//! and environment variables. Built once at startup and passed by reference.

use peerlab_common::{ContainerRuntime, Error};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Placeholder ASN used when none is configured
pub const DEFAULT_LOCAL_ASN: u32 = 64512;

/// Bootstrap configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    /// Local autonomous system number
    pub local_asn: u32,

    /// Container running the mesh daemon
    pub container: String,

    /// How to reach the `tailscale` binary
    pub runtime: ContainerRuntime,

    /// BIRD configuration template
    pub template_path: PathBuf,

    /// Rendered configuration destination
    pub output_path: PathBuf,

    /// Control server shown in the authentication hint
    pub login_server: String,

    /// Readiness polling
    pub readiness: ReadinessConfig,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            local_asn: DEFAULT_LOCAL_ASN,
            container: "peerlab-tailscale".to_string(),
            runtime: ContainerRuntime::Docker,
            template_path: PathBuf::from("/config/bird.conf.j2"),
            output_path: PathBuf::from("/output/bird.conf"),
            login_server: "https://headscale.nxthdr.dev".to_string(),
            readiness: ReadinessConfig::default(),
        }
    }
}

/// Readiness polling configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessConfig {
    /// Give up waiting for the mesh daemon after this many seconds
    pub timeout_secs: u64,

    /// Delay between probes
    pub poll_interval_secs: u64,

    /// Upper bound for a single `tailscale` invocation
    pub command_timeout_secs: u64,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            poll_interval_secs: 1,
            command_timeout_secs: 5,
        }
    }
}

impl ReadinessConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

/// Values supplied on the command line or through the environment
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub local_asn: Option<String>,
    pub container: Option<String>,
    pub runtime: Option<ContainerRuntime>,
    pub template_path: Option<PathBuf>,
    pub output_path: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
}

/// Parse an ASN given as `64512` or `AS64512`.
pub fn parse_asn(value: &str) -> Result<u32, Error> {
    let trimmed = value.trim();
    let digits = trimmed
        .strip_prefix("AS")
        .or_else(|| trimmed.strip_prefix("as"))
        .unwrap_or(trimmed);

    match digits.parse::<u32>() {
        Ok(0) => Err(Error::InvalidConfig("ASN 0 is reserved".to_string())),
        Ok(asn) => Ok(asn),
        Err(_) => Err(Error::InvalidConfig(format!("invalid ASN '{}'", value))),
    }
}

impl BootstrapConfig {
    /// Load configuration from file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Apply CLI and environment overrides
    pub fn apply(mut self, overrides: Overrides) -> Result<Self, Error> {
        if let Some(asn) = overrides.local_asn {
            self.local_asn = parse_asn(&asn)?;
        }
        if let Some(container) = overrides.container {
            self.container = container;
        }
        if let Some(runtime) = overrides.runtime {
            self.runtime = runtime;
        }
        if let Some(path) = overrides.template_path {
            self.template_path = path;
        }
        if let Some(path) = overrides.output_path {
            self.output_path = path;
        }
        if let Some(secs) = overrides.timeout_secs {
            self.readiness.timeout_secs = secs;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.local_asn == 0 {
            return Err(Error::InvalidConfig("ASN 0 is reserved".to_string()));
        }
        if self.runtime != ContainerRuntime::Host && self.container.trim().is_empty() {
            return Err(Error::InvalidConfig(format!(
                "a container name is required with the {} runtime",
                self.runtime
            )));
        }
        if self.readiness.poll_interval_secs == 0 {
            return Err(Error::InvalidConfig("poll_interval_secs must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Whether the placeholder ASN is still in use
    pub fn uses_default_asn(&self) -> bool {
        self.local_asn == DEFAULT_LOCAL_ASN
    }
}
