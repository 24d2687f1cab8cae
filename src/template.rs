//! Template rendering for message bodies
//!
//! Templates whose name ends in `.html`, `.htm` or `.xml` are
//! auto-escaped. Render failures surface as [`Error::Template`].

use crate::error::{Error, Result};
use minijinja::Environment;
use serde::Serialize;
use std::path::Path;
use tracing::debug;

/// Renders named templates against a serializable context.
pub trait TemplateEngine: Send + Sync {
    /// Render template `name` with `context`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Template`] if the template is missing or fails.
    fn render(&self, name: &str, context: &serde_json::Value) -> Result<String>;

    fn has_template(&self, name: &str) -> bool;

    /// Register a template from source.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Template`] if the source does not parse.
    fn register_template(&mut self, name: &str, source: &str) -> Result<()>;
}

/// [`TemplateEngine`] backed by minijinja.
#[derive(Debug)]
pub struct TemplateRenderer {
    env: Environment<'static>,
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateRenderer {
    /// A renderer with no templates; add them with
    /// [`TemplateEngine::register_template`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            env: Environment::new(),
        }
    }

    /// A renderer that loads templates from files under `dir` on first
    /// use. Template names are paths relative to `dir`.
    #[must_use]
    pub fn from_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        debug!("Loading templates from {}", dir.display());
        let mut env = Environment::new();
        env.set_loader(minijinja::path_loader(dir));
        Self { env }
    }

    /// Render any serializable context.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Template`] if the template is missing or fails.
    pub fn render_with<S: Serialize>(&self, name: &str, context: S) -> Result<String> {
        let template = self
            .env
            .get_template(name)
            .map_err(|e| Error::Template(e.to_string()))?;
        template
            .render(context)
            .map_err(|e| Error::Template(e.to_string()))
    }
}

impl TemplateEngine for TemplateRenderer {
    fn render(&self, name: &str, context: &serde_json::Value) -> Result<String> {
        self.render_with(name, context)
    }

    fn has_template(&self, name: &str) -> bool {
        self.env.get_template(name).is_ok()
    }

    fn register_template(&mut self, name: &str, source: &str) -> Result<()> {
        self.env
            .add_template_owned(name.to_string(), source.to_string())
            .map_err(|e| Error::Template(e.to_string()))
    }
}
