//! Error types for SMTP operations.

use std::io;

/// Result type alias for SMTP operations.
pub type Result<T> = std::result::Result<T, Error>;

/// SMTP error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The server closed the connection mid-reply.
    #[error("Connection closed by server")]
    ConnectionClosed,

    /// Server rejected a command.
    #[error("{command} rejected with {code}: {message}")]
    Rejected {
        /// Command verb that was rejected (e.g., `RCPT`).
        command: &'static str,
        /// Reply code (e.g., 550).
        code: u16,
        /// Error message from server.
        message: String,
    },

    /// Protocol error (unexpected or malformed response).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Invalid envelope address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Hostname cannot be used for TLS verification.
    #[error("Invalid TLS server name: {0}")]
    InvalidServerName(String),

    /// Message larger than the server's advertised `SIZE`.
    #[error("Message of {size} bytes exceeds server limit of {limit}")]
    MessageTooLarge {
        /// Message size in bytes.
        size: usize,
        /// Advertised limit.
        limit: usize,
    },

    /// Feature not advertised by the server.
    #[error("Server does not support {0}")]
    NotSupported(&'static str),
}

impl Error {
    /// Creates a rejection error from a reply.
    #[must_use]
    pub fn rejected(command: &'static str, reply: &crate::Reply) -> Self {
        Self::Rejected {
            command,
            code: reply.code.as_u16(),
            message: reply.message_text(),
        }
    }

    /// Returns true if this is a permanent rejection (5xx).
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::Rejected { code, .. } if *code >= 500 && *code < 600)
    }

    /// Returns true if this is a transient rejection (4xx).
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Rejected { code, .. } if *code >= 400 && *code < 500)
    }

    /// Returns true if the rejection came from the `AUTH` command.
    #[must_use]
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Rejected { command: "AUTH", .. })
    }

    /// Returns true if a ready client that returned this error from
    /// `deliver` can run another transaction.
    ///
    /// Refusals leave the connection usable, except 421 which announces
    /// the server is closing it.
    #[must_use]
    pub const fn keeps_session(&self) -> bool {
        match self {
            Self::Rejected { code, .. } => *code != 421,
            Self::MessageTooLarge { .. } | Self::InvalidAddress(_) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Reply, ReplyCode};

    #[test]
    fn rejection_classification() {
        let busy = Reply::new(ReplyCode::new(451), vec!["try later".into()]);
        let err = Error::rejected("RCPT", &busy);
        assert!(err.is_transient());
        assert!(!err.is_permanent());
        assert_eq!(err.to_string(), "RCPT rejected with 451: try later");

        let denied = Reply::new(ReplyCode::AUTH_FAILED, vec!["bad credentials".into()]);
        let err = Error::rejected("AUTH", &denied);
        assert!(err.is_permanent());
        assert!(err.is_auth_failure());
    }

    #[test]
    fn refusals_keep_the_session() {
        let unknown = Reply::new(ReplyCode::new(550), vec!["no such user".into()]);
        assert!(Error::rejected("RCPT", &unknown).keeps_session());

        let closing = Reply::new(ReplyCode::new(421), vec!["shutting down".into()]);
        assert!(!Error::rejected("MAIL", &closing).keeps_session());

        assert!(Error::MessageTooLarge { size: 10, limit: 5 }.keeps_session());
        assert!(!Error::ConnectionClosed.keeps_session());
        assert!(!Error::Protocol("garbage".into()).keeps_session());
    }

    #[test]
    fn io_errors_are_not_rejections() {
        let err = Error::from(io::Error::new(io::ErrorKind::BrokenPipe, "gone"));
        assert!(!err.is_permanent());
        assert!(!err.is_transient());
        assert!(!err.keeps_session());
    }
}
