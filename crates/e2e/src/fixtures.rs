//! Scripted status providers and temporary workspaces

use async_trait::async_trait;
use parking_lot::Mutex;
use peerlab_common::{Error, ProbeOutcome, Result, StatusProvider, StatusSnapshot};
use serde_json::{json, Map, Value};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// Build a `tailscale status --json` document from `(host name, addresses)` pairs.
///
/// Peers are keyed `nodekey:000`, `nodekey:001`, ... in argument order.
pub fn status_json(peers: &[(&str, Vec<&str>)]) -> String {
    let mut map = Map::new();
    for (i, (host, ips)) in peers.iter().enumerate() {
        map.insert(
            format!("nodekey:{:03}", i),
            json!({
                "HostName": host,
                "DNSName": format!("{}.mesh.nxthdr.dev.", host),
                "TailscaleIPs": ips,
                "Online": true,
            }),
        );
    }

    json!({
        "BackendState": "Running",
        "Self": {"HostName": "peerlab", "TailscaleIPs": ["100.64.0.1"]},
        "Peer": Value::Object(map),
    })
    .to_string()
}

#[derive(Debug)]
struct ScriptState {
    probes: VecDeque<ProbeOutcome>,
    fallback: ProbeOutcome,
    probe_count: u32,
    status_calls: u32,
}

/// Status provider that replays scripted probe outcomes
#[derive(Debug, Clone)]
pub struct ScriptedProvider {
    state: Arc<Mutex<ScriptState>>,
    status: std::result::Result<String, String>,
    local_address: String,
}

impl ScriptedProvider {
    /// Provider that is immediately ready and serves `status`
    pub fn ready(status: impl Into<String>, local_address: impl Into<String>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ScriptState {
                probes: VecDeque::new(),
                fallback: ProbeOutcome::Ready,
                probe_count: 0,
                status_calls: 0,
            })),
            status: Ok(status.into()),
            local_address: local_address.into(),
        }
    }

    /// Replay `probes` first; afterwards every probe returns `then`
    pub fn with_probes(self, probes: Vec<ProbeOutcome>, then: ProbeOutcome) -> Self {
        {
            let mut state = self.state.lock();
            state.probes = probes.into();
            state.fallback = then;
        }
        self
    }

    /// Make the status query fail with `message`
    pub fn failing_status(mut self, message: impl Into<String>) -> Self {
        self.status = Err(message.into());
        self
    }

    pub fn probe_count(&self) -> u32 {
        self.state.lock().probe_count
    }

    pub fn status_calls(&self) -> u32 {
        self.state.lock().status_calls
    }
}

#[async_trait]
impl StatusProvider for ScriptedProvider {
    async fn probe(&self) -> ProbeOutcome {
        let mut state = self.state.lock();
        state.probe_count += 1;
        let fallback = state.fallback;
        state.probes.pop_front().unwrap_or(fallback)
    }

    async fn status(&self) -> Result<StatusSnapshot> {
        self.state.lock().status_calls += 1;
        match &self.status {
            Ok(raw) => Ok(serde_json::from_str(raw)?),
            Err(message) => Err(Error::StatusQuery(message.clone())),
        }
    }

    async fn local_address(&self) -> Result<String> {
        Ok(self.local_address.clone())
    }
}

/// Temporary directory holding a template and an output path
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    pub fn new() -> std::io::Result<Self> {
        Ok(Self {
            dir: TempDir::new()?,
        })
    }

    /// Workspace with `template` written to [`Workspace::template_path`]
    pub fn with_template(template: &str) -> std::io::Result<Self> {
        let workspace = Self::new()?;
        std::fs::write(workspace.template_path(), template)?;
        Ok(workspace)
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn template_path(&self) -> PathBuf {
        self.dir.path().join("bird.conf.j2")
    }

    pub fn output_path(&self) -> PathBuf {
        self.dir.path().join("bird.conf")
    }

    /// Rendered output, if any was written
    pub fn output(&self) -> Option<String> {
        std::fs::read_to_string(self.output_path()).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_json_shape() {
        let raw = status_json(&[("ixpfra01", vec!["100.64.0.5"]), ("laptop", vec![])]);
        let snapshot: StatusSnapshot = serde_json::from_str(&raw).unwrap();
        assert_eq!(snapshot.peer_count(), 2);
        let first = snapshot.peers().next().unwrap().1;
        assert_eq!(first.host_name, "ixpfra01");
        assert_eq!(first.dns_name, "ixpfra01.mesh.nxthdr.dev.");
    }

    #[tokio::test]
    async fn test_scripted_probes() {
        let provider = ScriptedProvider::ready("{}", "100.64.0.1").with_probes(
            vec![ProbeOutcome::Unreachable, ProbeOutcome::Unauthenticated],
            ProbeOutcome::Ready,
        );
        assert_eq!(provider.probe().await, ProbeOutcome::Unreachable);
        assert_eq!(provider.probe().await, ProbeOutcome::Unauthenticated);
        assert_eq!(provider.probe().await, ProbeOutcome::Ready);
        assert_eq!(provider.probe().await, ProbeOutcome::Ready);
        assert_eq!(provider.probe_count(), 4);
    }
}
