//! BIRD configuration rendering

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::template::Template;
use crate::types::RenderContext;

/// Renders a configuration template into an output file
#[derive(Debug, Clone)]
pub struct ConfigRenderer {
    template_path: PathBuf,
    output_path: PathBuf,
}

impl ConfigRenderer {
    pub fn new(template_path: impl Into<PathBuf>, output_path: impl Into<PathBuf>) -> Self {
        Self {
            template_path: template_path.into(),
            output_path: output_path.into(),
        }
    }

    pub fn template_path(&self) -> &Path {
        &self.template_path
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Load and parse the template
    fn load_template(&self) -> Result<Template> {
        let source = std::fs::read_to_string(&self.template_path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => Error::TemplateNotFound(self.template_path.clone()),
            _ => Error::Io(e),
        })?;
        debug!("Loaded template {} ({} bytes)", self.template_path.display(), source.len());
        Template::parse(&source)
    }

    /// Render the template without touching the output path
    pub fn render_to_string(&self, ctx: &RenderContext) -> Result<String> {
        self.load_template()?.render(&ctx.to_template_value())
    }

    /// Render the template and write the result, replacing any existing file.
    ///
    /// Nothing is written unless rendering succeeds. Returns the rendered text.
    pub fn render(&self, ctx: &RenderContext) -> Result<String> {
        let config = self.render_to_string(ctx)?;

        std::fs::write(&self.output_path, &config).map_err(|source| Error::Write {
            path: self.output_path.clone(),
            source,
        })?;

        info!(
            "Wrote {} ({} peers, {} bytes)",
            self.output_path.display(),
            ctx.peers.len(),
            config.len()
        );
        Ok(config)
    }
}
