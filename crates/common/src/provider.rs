//! Mesh status provider interface

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::StatusSnapshot;

/// Result of a single readiness probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeOutcome {
    /// The mesh daemon (or its container) did not answer
    Unreachable,
    /// The daemon answers but holds no mesh address
    Unauthenticated,
    /// The daemon is up and joined to the mesh
    Ready,
}

impl std::fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeOutcome::Unreachable => write!(f, "unreachable"),
            ProbeOutcome::Unauthenticated => write!(f, "unauthenticated"),
            ProbeOutcome::Ready => write!(f, "ready"),
        }
    }
}

/// Source of mesh status and the local mesh address
#[async_trait]
pub trait StatusProvider: Send + Sync {
    /// Check whether the mesh daemon is ready to be queried
    async fn probe(&self) -> ProbeOutcome;

    /// Fetch the current status snapshot
    async fn status(&self) -> Result<StatusSnapshot>;

    /// Fetch the local mesh address
    async fn local_address(&self) -> Result<String>;
}

/// Provider over a fixed snapshot, used for offline rendering
#[derive(Debug, Clone)]
pub struct StaticStatus {
    snapshot: StatusSnapshot,
    local_address: String,
}

impl StaticStatus {
    pub fn new(snapshot: StatusSnapshot, local_address: impl Into<String>) -> Self {
        Self {
            snapshot,
            local_address: local_address.into(),
        }
    }

    /// Parse a saved `tailscale status --json` document
    pub fn from_json(raw: &str, local_address: impl Into<String>) -> Result<Self> {
        Ok(Self::new(serde_json::from_str(raw)?, local_address))
    }
}

#[async_trait]
impl StatusProvider for StaticStatus {
    async fn probe(&self) -> ProbeOutcome {
        ProbeOutcome::Ready
    }

    async fn status(&self) -> Result<StatusSnapshot> {
        Ok(self.snapshot.clone())
    }

    async fn local_address(&self) -> Result<String> {
        Ok(self.local_address.clone())
    }
}
