//! Error types for PeerLab

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using PeerLab Error
pub type Result<T> = std::result::Result<T, Error>;

/// PeerLab error types
///
/// Every variant is terminal for a bootstrap run: the orchestrator reports it
/// and exits non-zero.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed status JSON: {0}")]
    MalformedStatus(#[from] serde_json::Error),

    #[error("Status query failed: {0}")]
    StatusQuery(String),

    #[error("Mesh daemon not ready after {seconds}s ({attempts} probes)")]
    ReadinessTimeout { seconds: u64, attempts: u32 },

    #[error("Mesh daemon in {container} is not authenticated")]
    NotAuthenticated { container: String },

    #[error("No exchange-point servers found on the mesh network")]
    NoMatchingPeers,

    #[error("Template not found at {}", .0.display())]
    TemplateNotFound(PathBuf),

    #[error("Template error at line {line}: {message}")]
    TemplateSyntax { line: usize, message: String },

    #[error("Failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Shorthand for a template error at a given line
    pub(crate) fn template(line: usize, message: impl Into<String>) -> Self {
        Error::TemplateSyntax {
            line,
            message: message.into(),
        }
    }
}
