//! PeerLab E2E Test Fixtures
//!
//! Drives the bootstrap pipeline end to end without Docker or Tailscale:
//!
//! - [`ScriptedProvider`] replays a sequence of readiness probes and serves a
//!   fixed status snapshot
//! - [`status_json`] builds `tailscale status --json` documents
//! - [`Workspace`] holds a temporary template/output pair

pub mod fixtures;

pub use fixtures::{status_json, ScriptedProvider, Workspace};
