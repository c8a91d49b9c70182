//! Tailscale CLI status provider
//!
//! Queries `tailscale` either directly on the host or inside a container via
//! `docker exec` / `podman exec`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command as AsyncCommand;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::provider::{ProbeOutcome, StatusProvider};
use crate::types::StatusSnapshot;

/// Prefix of addresses in the mesh CGNAT range
const MESH_ADDRESS_MARKER: &str = "100.";

/// How the `tailscale` binary is reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerRuntime {
    #[default]
    Docker,
    Podman,
    /// Run `tailscale` directly on this host
    Host,
}

impl ContainerRuntime {
    /// Get the CLI command name
    pub fn command(&self) -> &'static str {
        match self {
            Self::Docker => "docker",
            Self::Podman => "podman",
            Self::Host => "tailscale",
        }
    }
}

impl std::fmt::Display for ContainerRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Docker => write!(f, "docker"),
            Self::Podman => write!(f, "podman"),
            Self::Host => write!(f, "host"),
        }
    }
}

impl std::str::FromStr for ContainerRuntime {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "docker" => Ok(Self::Docker),
            "podman" => Ok(Self::Podman),
            "host" | "none" => Ok(Self::Host),
            other => Err(format!(
                "unknown runtime '{}' (expected docker, podman or host)",
                other
            )),
        }
    }
}

/// Classify the output of `tailscale status`.
pub fn classify_status(success: bool, stdout: &str, stderr: &str) -> ProbeOutcome {
    if success && stdout.contains(MESH_ADDRESS_MARKER) {
        return ProbeOutcome::Ready;
    }

    let logged_out = [stdout, stderr].iter().any(|text| {
        let text = text.to_ascii_lowercase();
        text.contains("logged out") || text.contains("needslogin") || text.contains("log in")
    });

    if logged_out || success {
        ProbeOutcome::Unauthenticated
    } else {
        ProbeOutcome::Unreachable
    }
}

/// Status provider backed by the `tailscale` CLI
#[derive(Debug, Clone)]
pub struct TailscaleCli {
    runtime: ContainerRuntime,
    container: String,
    command_timeout: Duration,
}

impl TailscaleCli {
    pub fn new(runtime: ContainerRuntime, container: impl Into<String>, command_timeout: Duration) -> Self {
        Self {
            runtime,
            container: container.into(),
            command_timeout,
        }
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    /// Program and arguments for a `tailscale` invocation
    pub fn command_line(&self, args: &[&str]) -> (&'static str, Vec<String>) {
        let mut argv = Vec::with_capacity(args.len() + 3);
        if self.runtime != ContainerRuntime::Host {
            argv.push("exec".to_string());
            argv.push(self.container.clone());
            argv.push("tailscale".to_string());
        }
        argv.extend(args.iter().map(|a| a.to_string()));
        (self.runtime.command(), argv)
    }

    async fn exec(&self, args: &[&str]) -> Result<Output> {
        let (program, argv) = self.command_line(args);
        run_with_timeout(program, &argv, self.command_timeout).await
    }

    async fn exec_checked(&self, args: &[&str]) -> Result<String> {
        let output = self.exec(args).await?;
        check_output(args, output)
    }
}

/// Run a command, killing it once `limit` elapses
async fn run_with_timeout(program: &str, argv: &[String], limit: Duration) -> Result<Output> {
    debug!("Running {} {}", program, argv.join(" "));

    let mut cmd = AsyncCommand::new(program);
    cmd.args(argv).stdin(Stdio::null()).kill_on_drop(true);

    match timeout(limit, cmd.output()).await {
        Ok(result) => {
            result.map_err(|e| Error::StatusQuery(format!("failed to run {}: {}", program, e)))
        }
        Err(_) => Err(Error::StatusQuery(format!(
            "`{} {}` timed out after {}s",
            program,
            argv.join(" "),
            limit.as_secs()
        ))),
    }
}

/// Stdout of a successful `tailscale <args>` run; stderr (or the exit
/// status when stderr is empty) otherwise.
fn check_output(args: &[&str], output: Output) -> Result<String> {
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let detail = if stderr.trim().is_empty() {
            output.status.to_string()
        } else {
            stderr.trim().to_string()
        };
        return Err(Error::StatusQuery(format!(
            "tailscale {} failed: {}",
            args.join(" "),
            detail
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// First non-empty line of `tailscale ip -4`, which must be an IP address
fn parse_local_address(stdout: &str) -> Result<String> {
    let line = stdout
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .ok_or_else(|| Error::StatusQuery("tailscale ip -4 returned no address".to_string()))?;

    match line.parse::<IpAddr>() {
        Ok(addr) => Ok(addr.to_string()),
        Err(_) => {
            warn!("Unexpected output from tailscale ip -4: {}", line);
            Err(Error::StatusQuery(format!("invalid local address '{}'", line)))
        }
    }
}

#[async_trait]
impl StatusProvider for TailscaleCli {
    async fn probe(&self) -> ProbeOutcome {
        match self.exec(&["status"]).await {
            Ok(output) => classify_status(
                output.status.success(),
                &String::from_utf8_lossy(&output.stdout),
                &String::from_utf8_lossy(&output.stderr),
            ),
            Err(e) => {
                debug!("Probe failed: {}", e);
                ProbeOutcome::Unreachable
            }
        }
    }

    async fn status(&self) -> Result<StatusSnapshot> {
        let stdout = self.exec_checked(&["status", "--json"]).await?;
        let snapshot: StatusSnapshot = serde_json::from_str(&stdout)?;
        debug!("Status snapshot lists {} peers", snapshot.peer_count());
        Ok(snapshot)
    }

    async fn local_address(&self) -> Result<String> {
        let stdout = self.exec_checked(&["ip", "-4"]).await?;
        parse_local_address(&stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status() {
        assert_eq!(
            classify_status(true, "100.64.0.1   peerlab   user@   linux   -\n", ""),
            ProbeOutcome::Ready
        );
        assert_eq!(
            classify_status(false, "Logged out.\n", ""),
            ProbeOutcome::Unauthenticated
        );
        assert_eq!(
            classify_status(false, "", "NeedsLogin: please log in"),
            ProbeOutcome::Unauthenticated
        );
        assert_eq!(
            classify_status(true, "Tailscale is starting...\n", ""),
            ProbeOutcome::Unauthenticated
        );
        assert_eq!(
            classify_status(false, "", "failed to connect to local tailscaled; it doesn't appear to be running"),
            ProbeOutcome::Unreachable
        );
        assert_eq!(
            classify_status(false, "", "Error: No such container: peerlab-tailscale"),
            ProbeOutcome::Unreachable
        );
        // A mesh address only counts when the command succeeded.
        assert_eq!(
            classify_status(false, "100.64.0.1", ""),
            ProbeOutcome::Unreachable
        );
    }

    #[test]
    fn test_command_line() {
        let cli = TailscaleCli::new(ContainerRuntime::Docker, "peerlab-tailscale", Duration::from_secs(5));
        let (program, args) = cli.command_line(&["status", "--json"]);
        assert_eq!(program, "docker");
        assert_eq!(args, vec!["exec", "peerlab-tailscale", "tailscale", "status", "--json"]);

        let host = TailscaleCli::new(ContainerRuntime::Host, "ignored", Duration::from_secs(5));
        let (program, args) = host.command_line(&["ip", "-4"]);
        assert_eq!(program, "tailscale");
        assert_eq!(args, vec!["ip", "-4"]);
    }

    #[test]
    fn test_runtime_from_str() {
        assert_eq!("Docker".parse::<ContainerRuntime>().unwrap(), ContainerRuntime::Docker);
        assert_eq!("podman".parse::<ContainerRuntime>().unwrap(), ContainerRuntime::Podman);
        assert_eq!("host".parse::<ContainerRuntime>().unwrap(), ContainerRuntime::Host);
        assert!("lxc".parse::<ContainerRuntime>().is_err());
    }

    #[cfg(unix)]
    fn output(code: i32, stdout: &str, stderr: &str) -> Output {
        use std::os::unix::process::ExitStatusExt;
        Output {
            status: std::process::ExitStatus::from_raw(code << 8),
            stdout: stdout.as_bytes().to_vec(),
            stderr: stderr.as_bytes().to_vec(),
        }
    }

    #[test]
    fn test_parse_local_address() {
        assert_eq!(parse_local_address("100.64.0.1\n").unwrap(), "100.64.0.1");
        assert_eq!(
            parse_local_address("\n   \n 100.64.0.7 \n100.64.0.8\n").unwrap(),
            "100.64.0.7"
        );

        for stdout in ["", "\n  \n"] {
            match parse_local_address(stdout) {
                Err(Error::StatusQuery(msg)) => assert!(msg.contains("no address")),
                other => panic!("expected status query error, got {other:?}"),
            }
        }

        match parse_local_address("not-an-address\n100.64.0.1\n") {
            Err(Error::StatusQuery(msg)) => assert!(msg.contains("not-an-address")),
            other => panic!("expected status query error, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_check_output() {
        let stdout = check_output(&["ip", "-4"], output(0, "100.64.0.1\n", "")).unwrap();
        assert_eq!(stdout, "100.64.0.1\n");

        match check_output(&["status", "--json"], output(1, "", "  daemon not running\n")) {
            Err(Error::StatusQuery(msg)) => {
                assert_eq!(msg, "tailscale status --json failed: daemon not running")
            }
            other => panic!("expected status query error, got {other:?}"),
        }

        match check_output(&["ip", "-4"], output(3, "100.64.0.1", "")) {
            Err(Error::StatusQuery(msg)) => {
                assert!(msg.starts_with("tailscale ip -4 failed: "));
                assert!(msg.contains('3'));
            }
            other => panic!("expected status query error, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_timeout() {
        let err = run_with_timeout("sleep", &["5".to_string()], Duration::from_millis(50))
            .await
            .unwrap_err();
        match err {
            Error::StatusQuery(msg) => assert!(msg.contains("timed out")),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_program() {
        let err = run_with_timeout("peerlab-no-such-binary", &[], Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StatusQuery(msg) if msg.contains("failed to run")));
    }
}
