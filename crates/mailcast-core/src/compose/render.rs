//! Body template rendering.

use crate::Result;
use crate::store::Recipient;
use std::path::Path;
use tera::{Context, Tera};
use tracing::debug;

/// Renders a named template for one recipient.
pub trait Renderer {
    /// Renders `template` with the recipient's `id`, `first_name`,
    /// `last_name` and `email`.
    ///
    /// # Errors
    ///
    /// Returns an error if the template is unknown or fails to render.
    fn render(&self, template: &str, recipient: &Recipient) -> Result<String>;
}

/// Templates loaded from a directory with Tera.
///
/// Files ending in `.html` are autoescaped.
#[derive(Debug)]
pub struct TeraRenderer {
    tera: Tera,
}

impl TeraRenderer {
    /// Loads the named templates from `root`, each registered under its
    /// name. Other files in the directory are not read.
    ///
    /// # Errors
    ///
    /// Returns an error if a template cannot be read or fails to parse.
    pub fn load(root: &Path, names: &[&str]) -> Result<Self> {
        let mut tera = Tera::default();
        tera.add_template_files(names.iter().map(|name| (root.join(name), Some(*name))))?;
        debug!(root = %root.display(), templates = names.len(), "templates loaded");
        Ok(Self { tera })
    }

    /// Builds a renderer from in-memory `(name, source)` pairs.
    ///
    /// # Errors
    ///
    /// Returns an error if a template fails to parse.
    pub fn from_sources(sources: &[(&str, &str)]) -> Result<Self> {
        let mut tera = Tera::default();
        tera.add_raw_templates(sources.iter().copied())?;
        Ok(Self { tera })
    }
}

impl Renderer for TeraRenderer {
    fn render(&self, template: &str, recipient: &Recipient) -> Result<String> {
        let context = Context::from_serialize(recipient)?;
        Ok(self.tera.render(template, &context)?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn jane() -> Recipient {
        Recipient {
            id: 7,
            first_name: Some("Jane".into()),
            last_name: Some("O'Neil <Dr>".into()),
            email: Some("jane@example.com".into()),
        }
    }

    #[test]
    fn renders_recipient_fields() {
        let renderer = TeraRenderer::from_sources(&[(
            "body.txt",
            "Hi {{ first_name }} {{ last_name }} ({{ email }}, #{{ id }})",
        )])
        .unwrap();

        let text = renderer.render("body.txt", &jane()).unwrap();
        assert_eq!(text, "Hi Jane O'Neil <Dr> (jane@example.com, #7)");
    }

    #[test]
    fn html_templates_are_escaped() {
        let renderer =
            TeraRenderer::from_sources(&[("body.html", "<p>{{ last_name }}</p>")]).unwrap();
        let html = renderer.render("body.html", &jane()).unwrap();
        assert_eq!(html, "<p>O&#x27;Neil &lt;Dr&gt;</p>");
    }

    #[test]
    fn unknown_template_is_an_error() {
        let renderer = TeraRenderer::from_sources(&[]).unwrap();
        assert!(renderer.render("nope.txt", &jane()).is_err());
    }

    #[test]
    fn loads_named_templates_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("campaign.txt"), "Hello {{ email }}").unwrap();
        std::fs::write(dir.path().join("campaign.html"), "<p>{{ last_name }}</p>").unwrap();
        std::fs::write(dir.path().join("logo.png"), [0x89, b'P', b'N', b'G', 0xff, 0xfe]).unwrap();
        std::fs::write(dir.path().join("broken.txt"), "{{ unclosed").unwrap();

        let renderer = TeraRenderer::load(dir.path(), &["campaign.txt", "campaign.html"]).unwrap();
        assert_eq!(
            renderer.render("campaign.txt", &jane()).unwrap(),
            "Hello jane@example.com"
        );
        assert_eq!(
            renderer.render("campaign.html", &jane()).unwrap(),
            "<p>O&#x27;Neil &lt;Dr&gt;</p>"
        );
        assert!(renderer.render("broken.txt", &jane()).is_err());
    }

    #[test]
    fn missing_template_file_fails_load() {
        let dir = tempfile::tempdir().unwrap();
        assert!(TeraRenderer::load(dir.path(), &["campaign.txt"]).is_err());
    }
}
