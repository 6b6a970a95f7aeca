//! # mailcast-core
//!
//! Campaign logic for `mailcast`.
//!
//! This crate provides:
//! - Configuration loading and validation
//! - The recipient store (`SQLite`)
//! - Unsubscribe tokens
//! - Message composition from templates
//! - The dispatch loop over SMTP sessions
//! - A Gmail mailbox client
//! - Bounce and unsubscribe classification, and the reconcile run

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod classify;
pub mod compose;
pub mod config;
pub mod dispatch;
mod error;
pub mod mailbox;
pub mod reconcile;
pub mod store;
pub mod token;

pub use classify::{Classification, ClassifyError, Classifier, ExtractionStrategy, Outcome};
pub use compose::{Campaign, Composer, Renderer, TeraRenderer};
pub use config::Config;
pub use dispatch::{Connector, DispatchReport, Dispatcher, Session, SmtpConnector};
pub use error::{Error, Result};
pub use mailbox::{GmailClient, Label, Mailbox, Message, MessageRef};
pub use reconcile::{Pass, PassReport, Reconciler};
pub use store::{
    EventKind, Recipient, RecipientId, RecipientStatus, RecipientStore, SendState,
    SqliteRecipientStore, StuckRecipient,
};
