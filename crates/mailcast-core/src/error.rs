//! Error types for the core library.

use thiserror::Error;

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// SMTP session failed.
    #[error("SMTP error: {0}")]
    Smtp(#[from] mailcast_smtp::Error),

    /// Message could not be assembled.
    #[error("MIME error: {0}")]
    Mime(#[from] mailcast_mime::Error),

    /// Mailbox API authorization failed.
    #[error("OAuth error: {0}")]
    OAuth(#[from] mailcast_oauth::Error),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Template could not be loaded or rendered.
    #[error("Template error: {0}")]
    Template(#[from] tera::Error),

    /// HTTP transport to the mailbox API failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Mailbox API answered with an error status.
    #[error("Mailbox API error {status}: {message}")]
    Mailbox {
        /// HTTP status code.
        status: u16,
        /// Error message from the response body.
        message: String,
    },

    /// Mailbox API URL could not be built.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// Extraction pattern failed to compile.
    #[error("Pattern error: {0}")]
    Pattern(#[from] regex::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
