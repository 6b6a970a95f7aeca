//! `multipart/alternative` message writer.

use crate::encoding::{encode_header_value, hex};
use crate::error::{Error, Result};
use crate::part::Header;
use rand::RngCore;
use std::fmt;

const CRLF: &str = "\r\n";

/// Random bytes behind a generated boundary.
const BOUNDARY_BYTES: usize = 30;

/// Multipart boundary delimiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Boundary(String);

impl Boundary {
    /// Generates a fresh boundary from 30 random bytes, hex encoded.
    #[must_use]
    pub fn random() -> Self {
        let mut bytes = [0u8; BOUNDARY_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(hex(&bytes))
    }

    /// Uses a caller-chosen boundary.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the boundary text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Boundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Builder for a two-part `multipart/alternative` message.
///
/// Headers are written in insertion order, then `MIME-Version` and
/// `Content-Type`, then any trailing headers. Non-ASCII header values are
/// RFC 2047 encoded.
#[derive(Debug, Clone)]
pub struct Alternative {
    headers: Vec<Header>,
    trailing: Vec<Header>,
    boundary: Boundary,
    text: Vec<u8>,
    html: Vec<u8>,
}

impl Default for Alternative {
    fn default() -> Self {
        Self::new()
    }
}

impl Alternative {
    /// Starts a message with a random boundary.
    #[must_use]
    pub fn new() -> Self {
        Self {
            headers: Vec::new(),
            trailing: Vec::new(),
            boundary: Boundary::random(),
            text: Vec::new(),
            html: Vec::new(),
        }
    }

    /// Adds a header written before the MIME headers.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(Header::new(name, value));
        self
    }

    /// Adds a header written after the MIME headers.
    #[must_use]
    pub fn trailing_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.trailing.push(Header::new(name, value));
        self
    }

    /// Replaces the boundary.
    #[must_use]
    pub fn boundary(mut self, boundary: Boundary) -> Self {
        self.boundary = boundary;
        self
    }

    /// Sets the `text/plain` alternative.
    #[must_use]
    pub fn text(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.text = body.into();
        self
    }

    /// Sets the `text/html` alternative.
    #[must_use]
    pub fn html(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.html = body.into();
        self
    }

    /// Returns the boundary in use.
    #[must_use]
    pub const fn boundary_ref(&self) -> &Boundary {
        &self.boundary
    }

    /// Serializes the message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHeader`] if a header name is empty or a
    /// header value contains a line break.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.text.len() + self.html.len() + 512);
        self.write_to(&mut out)?;
        Ok(out)
    }

    /// Appends the serialized message to `out`.
    ///
    /// # Errors
    ///
    /// See [`Alternative::to_bytes`].
    pub fn write_to(&self, out: &mut Vec<u8>) -> Result<()> {
        for header in &self.headers {
            write_header(out, header)?;
        }
        write_raw_header(out, "MIME-Version", "1.0");
        write_raw_header(
            out,
            "Content-Type",
            &format!("multipart/alternative; boundary=\"{}\"", self.boundary),
        );
        for header in &self.trailing {
            write_header(out, header)?;
        }
        out.extend_from_slice(CRLF.as_bytes());

        self.write_part(out, "text/plain", &self.text);
        self.write_part(out, "text/html", &self.html);
        out.extend_from_slice(format!("--{}--{CRLF}", self.boundary).as_bytes());
        Ok(())
    }

    fn write_part(&self, out: &mut Vec<u8>, content_type: &str, body: &[u8]) {
        out.extend_from_slice(format!("--{}{CRLF}", self.boundary).as_bytes());
        write_raw_header(out, "Content-Type", content_type);
        out.extend_from_slice(CRLF.as_bytes());
        out.extend_from_slice(body);
        if !body.ends_with(b"\n") {
            out.extend_from_slice(CRLF.as_bytes());
        }
    }
}

fn write_header(out: &mut Vec<u8>, header: &Header) -> Result<()> {
    if header.name.is_empty() || header.name.contains([':', ' ', '\r', '\n']) {
        return Err(Error::InvalidHeader {
            name: header.name.clone(),
            reason: "name must be a non-empty token",
        });
    }
    if header.value.contains(['\r', '\n']) {
        return Err(Error::InvalidHeader {
            name: header.name.clone(),
            reason: "value contains a line break",
        });
    }
    write_raw_header(out, &header.name, &encode_header_value(&header.value));
    Ok(())
}

fn write_raw_header(out: &mut Vec<u8>, name: &str, value: &str) {
    out.extend_from_slice(format!("{name}: {value}{CRLF}").as_bytes());
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sample() -> Alternative {
        Alternative::new()
            .boundary(Boundary::new("b1"))
            .header("From", "news@example.com")
            .header("To", "jane@example.org")
            .header("Subject", "Hello")
            .trailing_header("Precedence", "bulk")
            .text("plain body")
            .html("<p>html</p>\r\n")
    }

    #[test]
    fn writes_expected_layout() {
        let bytes = sample().to_bytes().unwrap();
        let expected = "From: news@example.com\r\n\
            To: jane@example.org\r\n\
            Subject: Hello\r\n\
            MIME-Version: 1.0\r\n\
            Content-Type: multipart/alternative; boundary=\"b1\"\r\n\
            Precedence: bulk\r\n\
            \r\n\
            --b1\r\n\
            Content-Type: text/plain\r\n\
            \r\n\
            plain body\r\n\
            --b1\r\n\
            Content-Type: text/html\r\n\
            \r\n\
            <p>html</p>\r\n\
            --b1--\r\n";
        assert_eq!(String::from_utf8(bytes).unwrap(), expected);
    }

    #[test]
    fn random_boundaries_differ() {
        let a = Boundary::random();
        let b = Boundary::random();
        assert_eq!(a.as_str().len(), 60);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn encodes_non_ascii_subject() {
        let bytes = Alternative::new()
            .header("Subject", "Grüße")
            .to_bytes()
            .unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("Subject: =?utf-8?B?R3LDvMOfZQ==?=\r\n"));
    }

    #[test]
    fn rejects_header_injection() {
        let err = Alternative::new()
            .header("Subject", "hi\r\nBcc: victim@example.com")
            .to_bytes()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidHeader { .. }));
    }
}
