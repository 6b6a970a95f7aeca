//! Inbound message part trees.

use crate::encoding::decode_base64_lenient;
use crate::error::Result;

/// A single header field.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Header {
    /// Field name as received.
    pub name: String,
    /// Field value, unfolded.
    pub value: String,
}

impl Header {
    /// Creates a header.
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Returns the value of the first header named `name` (case-insensitive).
#[must_use]
pub fn find_header<'a>(headers: &'a [Header], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| h.value.as_str())
}

/// Part body as delivered by the mailbox API.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase", default))]
pub struct Body {
    /// Decoded size in bytes.
    pub size: u64,
    /// URL-safe base64 content; absent for containers and attachments.
    pub data: Option<String>,
    /// Attachment handle for bodies not delivered inline.
    pub attachment_id: Option<String>,
}

/// One node of a message part tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase", default))]
pub struct Part {
    /// Part identifier within the message (`""` for the root).
    pub part_id: String,
    /// Media type, e.g. `text/plain`.
    pub mime_type: String,
    /// Attachment file name, empty if none.
    pub filename: String,
    /// Part headers.
    pub headers: Vec<Header>,
    /// Inline body.
    pub body: Body,
    /// Child parts of a multipart container.
    pub parts: Vec<Part>,
}

impl Part {
    /// Creates a leaf part with `data` encoded as the API would deliver it.
    #[must_use]
    pub fn leaf(mime_type: impl Into<String>, data: &[u8]) -> Self {
        Self {
            mime_type: mime_type.into(),
            body: Body {
                size: data.len() as u64,
                data: Some(crate::encoding::encode_base64_url(data)),
                attachment_id: None,
            },
            ..Self::default()
        }
    }

    /// Creates a container part.
    #[must_use]
    pub fn container(mime_type: impl Into<String>, parts: Vec<Self>) -> Self {
        Self {
            mime_type: mime_type.into(),
            parts,
            ..Self::default()
        }
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(Header::new(name, value));
        self
    }

    /// Returns the value of the first header named `name`.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Finds the first part with exactly `mime_type`, depth first and
    /// starting at `self`.
    ///
    /// A match with a single child is a wrapper: the child is returned in
    /// its place.
    #[must_use]
    pub fn find(&self, mime_type: &str) -> Option<&Self> {
        if self.mime_type == mime_type {
            return Some(match self.parts.as_slice() {
                [only] => only,
                _ => self,
            });
        }
        self.parts.iter().find_map(|child| child.find(mime_type))
    }

    /// Decodes the inline body; an absent body decodes to nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if the body data is not valid base64.
    pub fn decoded_body(&self) -> Result<Vec<u8>> {
        self.body
            .data
            .as_deref()
            .map_or_else(|| Ok(Vec::new()), decode_base64_lenient)
    }

    /// Decodes the inline body as text, replacing invalid UTF-8.
    ///
    /// # Errors
    ///
    /// Returns an error if the body data is not valid base64.
    pub fn body_text(&self) -> Result<String> {
        let bytes = self.decoded_body()?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn bounce_tree() -> Part {
        Part::container(
            "multipart/report",
            vec![
                Part::leaf("text/plain", b"delivery failed"),
                Part::leaf(
                    "message/delivery-status",
                    b"Final-Recipient: rfc822; x@example.com\nAction: failed\n",
                ),
            ],
        )
    }

    #[test]
    fn finds_root_part() {
        let tree = bounce_tree();
        assert_eq!(tree.find("multipart/report").unwrap().mime_type, "multipart/report");
    }

    #[test]
    fn finds_nested_part_depth_first() {
        let tree = Part::container(
            "multipart/mixed",
            vec![
                Part::container(
                    "multipart/alternative",
                    vec![
                        Part::leaf("text/plain", b"first"),
                        Part::leaf("text/html", b"<p>first</p>"),
                    ],
                ),
                Part::leaf("text/plain", b"second"),
            ],
        );
        let found = tree.find("text/plain").unwrap();
        assert_eq!(found.body_text().unwrap(), "first");
    }

    #[test]
    fn single_child_wrapper_yields_child() {
        let tree = Part::container(
            "multipart/report",
            vec![
                Part::leaf("text/plain", b"delivery failed"),
                Part::container(
                    "message/delivery-status",
                    vec![Part::leaf("text/plain", b"Action: failed\n")],
                ),
            ],
        );
        let status = tree.find("message/delivery-status").unwrap();
        assert_eq!(status.mime_type, "text/plain");
        assert_eq!(status.body_text().unwrap(), "Action: failed\n");
    }

    #[test]
    fn searches_below_single_child_container() {
        let tree = Part::container("multipart/mixed", vec![bounce_tree()]);
        let status = tree.find("message/delivery-status").unwrap();
        assert!(status.body_text().unwrap().contains("Action: failed"));
    }

    #[test]
    fn media_type_match_is_exact() {
        assert!(bounce_tree().find("TEXT/PLAIN").is_none());
        assert!(bounce_tree().find("text").is_none());
    }

    #[test]
    fn missing_body_decodes_empty() {
        let part = Part::container("multipart/alternative", Vec::new());
        assert_eq!(part.body_text().unwrap(), "");
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let part = Part::leaf("text/plain", &[b'o', b'k', 0xff]);
        assert_eq!(part.body_text().unwrap(), "ok\u{fffd}");
    }

    #[test]
    fn header_lookup_ignores_case() {
        let part = Part::default().with_header("X-Failed-Recipients", "a@b.c");
        assert_eq!(part.header("x-failed-recipients"), Some("a@b.c"));
        assert_eq!(part.header("From"), None);
    }
}
