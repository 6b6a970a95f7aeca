//! # mailcast-mime
//!
//! The two halves of MIME that a bulk mailer needs:
//!
//! - **Outbound**: [`Alternative`] writes a `multipart/alternative`
//!   message (plain text + HTML) with a fresh boundary per message.
//! - **Inbound**: [`Part`] is a parsed message tree as delivered by a
//!   mailbox API, with depth-first lookup by media type and lenient
//!   URL-safe base64 body decoding.
//!
//! ## Building a message
//!
//! ```ignore
//! use mailcast_mime::Alternative;
//!
//! let bytes = Alternative::new()
//!     .header("From", "news@example.com")
//!     .header("To", "jane@example.org")
//!     .header("Subject", "Hello")
//!     .text("plain body")
//!     .html("<p>html body</p>")
//!     .to_bytes()?;
//! ```
//!
//! ## Searching a received message
//!
//! ```ignore
//! let report = message.payload.find("message/delivery-status");
//! let text = report.map(Part::body_text).transpose()?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod alternative;
mod error;
mod part;

pub mod encoding;

pub use alternative::{Alternative, Boundary};
pub use error::{Error, Result};
pub use part::{Body, Header, Part, find_header};
