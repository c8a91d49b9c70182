//! PeerLab Bootstrap CLI
//!
//! Discovers exchange-point servers on the PeerLab mesh and renders the BIRD
//! configuration for them.

pub mod bootstrap;
pub mod commands;
pub mod config;
pub mod output;

pub use bootstrap::{Bootstrapper, BootstrapReport, Discovery, ReadinessPolicy};
pub use config::{BootstrapConfig, Overrides, ReadinessConfig};
