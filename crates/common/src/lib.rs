//! PeerLab Common Library
//!
//! Peer discovery, template rendering and mesh status providers shared by the
//! PeerLab bootstrap tooling.

pub mod error;
pub mod peers;
pub mod provider;
pub mod render;
pub mod tailscale;
pub mod template;
pub mod types;

// Re-export commonly used types
pub use error::{Error, Result};
pub use peers::{discover_exchange_points, resolve_asn, DEFAULT_EXCHANGE_ASN, EXCHANGE_POINT_PREFIX};
pub use provider::{ProbeOutcome, StaticStatus, StatusProvider};
pub use render::ConfigRenderer;
pub use tailscale::{ContainerRuntime, TailscaleCli};
pub use template::Template;
pub use types::*;

/// PeerLab version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
