//! Address extraction strategies.

use super::{ClassifyError, ExtractionStrategy, Outcome};
use crate::Result;
use crate::mailbox::Message;
use regex::Regex;
use tracing::debug;

const DELIVERY_STATUS: &str = "message/delivery-status";
const TEXT_PLAIN: &str = "text/plain";
const TEXT_HTML: &str = "text/html";
const QMAIL_PREFIX: &str = "Hi. This is the qmail-send program at";

/// Decoded text of the first part with `mime_type`, if any.
fn part_text(message: &Message, mime_type: &str) -> std::result::Result<Option<String>, ClassifyError> {
    Ok(message
        .payload
        .find(mime_type)
        .map(mailcast_mime::Part::body_text)
        .transpose()?)
}

/// Finds the list footer in a reply: "This email was sent to Name
/// (address)".
#[derive(Debug)]
pub struct ReplyFooter {
    quote: Regex,
    sent_to: Regex,
}

impl ReplyFooter {
    /// Strategy name.
    pub const NAME: &'static str = "reply-footer";

    /// Compiles the patterns.
    ///
    /// # Errors
    ///
    /// Returns an error if a pattern fails to compile.
    pub fn new() -> Result<Self> {
        Ok(Self {
            quote: Regex::new(r"(?:^|\n)>[ ]*")?,
            sent_to: Regex::new(r"(?i:this email) was sent to [^(]*\(([^@]*@[^)<\s]*)")?,
        })
    }

    /// Plain-text body, or the HTML body when there is no usable plain one.
    fn body(message: &Message) -> std::result::Result<String, ClassifyError> {
        for mime_type in [TEXT_PLAIN, TEXT_HTML] {
            if let Some(text) = part_text(message, mime_type)?
                && !text.is_empty()
            {
                return Ok(text);
            }
        }
        Err(ClassifyError::NoParseableBody)
    }
}

impl ExtractionStrategy for ReplyFooter {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn extract(&self, message: &Message) -> Outcome {
        let body = match Self::body(message) {
            Ok(body) => body,
            Err(e) => return Outcome::Error(e),
        };
        let unquoted = self.quote.replace_all(&body, "");
        self.sent_to
            .captures(&unquoted)
            .and_then(|c| c.get(1))
            .map_or(Outcome::Error(ClassifyError::NoParseableAddress), |m| {
                Outcome::Matched(m.as_str().to_string())
            })
    }
}

/// Takes the `X-Failed-Recipients` header as is.
#[derive(Debug, Default)]
pub struct FailedRecipientsHeader;

impl FailedRecipientsHeader {
    /// Strategy name.
    pub const NAME: &'static str = "x-failed-recipients";
    const HEADER: &'static str = "X-Failed-Recipients";
}

impl ExtractionStrategy for FailedRecipientsHeader {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn extract(&self, message: &Message) -> Outcome {
        message
            .header(Self::HEADER)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map_or(Outcome::NoMatch, |value| Outcome::Matched(value.to_string()))
    }
}

/// Reads `Action` and `Final-Recipient` out of a delivery-status report.
#[derive(Debug)]
pub struct DeliveryStatus {
    action: Regex,
    recipient: Regex,
}

impl DeliveryStatus {
    /// Strategy name.
    pub const NAME: &'static str = "delivery-status";

    /// Compiles the patterns.
    ///
    /// # Errors
    ///
    /// Returns an error if a pattern fails to compile.
    pub fn new() -> Result<Self> {
        Ok(Self {
            action: Regex::new(r"(?i:action):\s*([a-z]*)")?,
            recipient: Regex::new(
                r"(?i:final)[-_](?i:recipient):(?:[^\n]*;)?\s*<?([^\s<>;@]+@[^\s<>;]+)",
            )?,
        })
    }
}

impl ExtractionStrategy for DeliveryStatus {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn extract(&self, message: &Message) -> Outcome {
        let Some(report) = message.payload.find(DELIVERY_STATUS) else {
            return Outcome::NoMatch;
        };
        let content = report.find(TEXT_PLAIN).unwrap_or(report);
        let text = match content.body_text() {
            Ok(text) => text,
            Err(e) => return Outcome::Error(e.into()),
        };

        let action = self.action.captures(&text).and_then(|c| c.get(1));
        let recipient = self.recipient.captures(&text).and_then(|c| c.get(1));
        match (action.map(|m| m.as_str()), recipient) {
            (Some("failed"), Some(recipient)) => Outcome::Matched(recipient.as_str().to_string()),
            (action, recipient) => {
                debug!(
                    message = %message.id,
                    ?action,
                    recipient = recipient.map(|m| m.as_str()),
                    "delivery status is not a permanent failure"
                );
                Outcome::NoMatch
            }
        }
    }
}

/// Recognizes qmail bounces, which carry no delivery-status part.
#[derive(Debug)]
pub struct Qmail {
    recipient_line: Regex,
}

impl Qmail {
    /// Strategy name.
    pub const NAME: &'static str = "qmail";

    /// Compiles the pattern.
    ///
    /// # Errors
    ///
    /// Returns an error if the pattern fails to compile.
    pub fn new() -> Result<Self> {
        Ok(Self {
            recipient_line: Regex::new(r"(?m)^<([^\s<>@]+@[^\s<>]+)>:")?,
        })
    }
}

impl ExtractionStrategy for Qmail {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn extract(&self, message: &Message) -> Outcome {
        let text = match part_text(message, TEXT_PLAIN) {
            Ok(Some(text)) => text,
            Ok(None) => return Outcome::NoMatch,
            Err(e) => return Outcome::Error(e),
        };
        if !text.starts_with(QMAIL_PREFIX) {
            return Outcome::NoMatch;
        }
        self.recipient_line
            .captures(&text)
            .and_then(|c| c.get(1))
            .map_or(Outcome::NoMatch, |m| Outcome::Matched(m.as_str().to_string()))
    }
}
