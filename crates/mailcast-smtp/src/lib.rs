//! # mailcast-smtp
//!
//! Async SMTP submission client (RFC 5321) built for long-running batch
//! senders: one authenticated session is reused for many messages, each
//! message being its own `RSET`/`MAIL`/`RCPT`/`DATA` transaction.
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailcast_smtp::{Address, Client, Security, connect};
//!
//! let stream = connect("smtp.example.com", 587, Security::StartTls).await?;
//! let client = Client::greet(stream)
//!     .await?
//!     .ehlo("mailer.example.com")
//!     .await?
//!     .starttls("smtp.example.com", "mailer.example.com")
//!     .await?
//!     .auth_plain("user", "password")
//!     .await?;
//!
//! let from = Address::new("bounces@example.com")?;
//! let to = Address::new("reader@example.org")?;
//! let mut client = client;
//! client.deliver(&from, &to, b"Subject: hi\r\n\r\nhello\r\n").await?;
//! client.quit().await?;
//! ```
//!
//! ## Connection States
//!
//! ```text
//! Connected ── auth_plain() / without_auth() ──→ Ready
//!                                                  │
//!   Ready ── mail_from() ──→ MailTransaction ── rcpt_to() ──→ RecipientAdded
//!     ↑                                                            │
//!     └──────────── send_message() ←── Data ←────── data() ────────┘
//! ```
//!
//! Every transition consumes the client, so a failed step drops the
//! session. `Client<Ready>::deliver` runs the whole transaction in place
//! instead: after a refused recipient or message the client is still ready,
//! and [`Error::keeps_session`] tells whether the connection survived.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod address;
mod capabilities;
mod client;
pub mod command;
mod error;
pub mod reply;
mod stream;

pub use address::Address;
pub use capabilities::{AuthMechanism, Capabilities};
pub use client::{Client, Connected, Data, MailTransaction, Ready, RecipientAdded};
pub use error::{Error, Result};
pub use reply::{Reply, ReplyCode};
pub use stream::{Security, SmtpStream, connect};
