//! Campaign message composition.

mod render;

pub use render::{Renderer, TeraRenderer};

use crate::Result;
use crate::config::Config;
use crate::store::Recipient;
use crate::token;
use mailcast_mime::{Alternative, Boundary};

/// Per-campaign settings shared by every message.
#[derive(Debug, Clone, Default)]
pub struct Campaign {
    /// `From` header value.
    pub from: String,
    /// Subject line.
    pub subject: String,
    /// `List-Unsubscribe` template.
    pub list_unsubscribe: String,
    /// Secret for unsubscribe tokens.
    pub unsubscribe_secret: String,
    /// Plain-text template name.
    pub text_template: String,
    /// HTML template name.
    pub html_template: String,
}

impl Campaign {
    /// Takes the campaign settings from the configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            from: config.from.clone(),
            subject: config.subject.clone(),
            list_unsubscribe: config.list_unsubscribe.clone(),
            unsubscribe_secret: config.unsubscribe_secret.clone(),
            text_template: config.text_template.clone(),
            html_template: config.html_template.clone(),
        }
    }
}

/// Builds the `multipart/alternative` message for one recipient.
#[derive(Debug)]
pub struct Composer<R> {
    renderer: R,
    campaign: Campaign,
}

impl<R: Renderer> Composer<R> {
    /// Creates a composer.
    pub const fn new(renderer: R, campaign: Campaign) -> Self {
        Self { renderer, campaign }
    }

    /// Composes the message to `email` with a fresh boundary.
    ///
    /// # Errors
    ///
    /// Returns an error if either template fails to render or a header
    /// value cannot be written.
    pub fn compose(&self, recipient: &Recipient, email: &str) -> Result<Vec<u8>> {
        self.compose_with_boundary(recipient, email, Boundary::random())
    }

    /// Composes the message with a caller-chosen boundary.
    ///
    /// # Errors
    ///
    /// See [`Composer::compose`].
    pub fn compose_with_boundary(
        &self,
        recipient: &Recipient,
        email: &str,
        boundary: Boundary,
    ) -> Result<Vec<u8>> {
        let campaign = &self.campaign;
        let text = self.renderer.render(&campaign.text_template, recipient)?;
        let html = self.renderer.render(&campaign.html_template, recipient)?;
        let list_unsubscribe = token::unsubscribe_url(
            &campaign.list_unsubscribe,
            email,
            recipient.id,
            &campaign.unsubscribe_secret,
        );

        let message = Alternative::new()
            .boundary(boundary)
            .header("From", &campaign.from)
            .header("To", email)
            .header("Subject", &campaign.subject)
            .header("List-Unsubscribe", list_unsubscribe)
            .trailing_header("Precedence", "bulk")
            .text(text)
            .html(html)
            .to_bytes()?;
        Ok(message)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::Error;

    fn campaign() -> Campaign {
        Campaign {
            from: "\"Example\" <news@example.com>".into(),
            subject: "Spring news".into(),
            list_unsubscribe: "<https://example.com/u/%s>".into(),
            unsubscribe_secret: "s3cret".into(),
            text_template: "campaign.txt".into(),
            html_template: "campaign.html".into(),
        }
    }

    fn composer() -> Composer<TeraRenderer> {
        let renderer = TeraRenderer::from_sources(&[
            ("campaign.txt", "Hi {{ first_name }}"),
            ("campaign.html", "<p>Hi {{ first_name }}</p>"),
        ])
        .unwrap();
        Composer::new(renderer, campaign())
    }

    fn jane() -> Recipient {
        Recipient {
            id: 42,
            first_name: Some("Jane".into()),
            last_name: None,
            email: Some("jane@example.com".into()),
        }
    }

    #[test]
    fn full_message_layout() {
        let bytes = composer()
            .compose_with_boundary(&jane(), "jane@example.com", Boundary::new("XYZ"))
            .unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let token = token::derive("jane@example.com", 42, "s3cret");

        let expected = format!(
            "From: \"Example\" <news@example.com>\r\n\
             To: jane@example.com\r\n\
             Subject: Spring news\r\n\
             List-Unsubscribe: <https://example.com/u/{token}>\r\n\
             MIME-Version: 1.0\r\n\
             Content-Type: multipart/alternative; boundary=\"XYZ\"\r\n\
             Precedence: bulk\r\n\
             \r\n\
             --XYZ\r\n\
             Content-Type: text/plain\r\n\
             \r\n\
             Hi Jane\r\n\
             --XYZ\r\n\
             Content-Type: text/html\r\n\
             \r\n\
             <p>Hi Jane</p>\r\n\
             --XYZ--\r\n"
        );
        assert_eq!(text, expected);
    }

    #[test]
    fn boundaries_are_unique_per_message() {
        let composer = composer();
        let a = composer.compose(&jane(), "jane@example.com").unwrap();
        let b = composer.compose(&jane(), "jane@example.com").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn render_failure_propagates() {
        let renderer = TeraRenderer::from_sources(&[("campaign.txt", "ok")]).unwrap();
        let composer = Composer::new(renderer, campaign());
        let err = composer.compose(&jane(), "jane@example.com").unwrap_err();
        assert!(matches!(err, Error::Template(_)));
    }
}
