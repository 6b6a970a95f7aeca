//! Recipient records and campaign state.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Store-assigned recipient id.
pub type RecipientId = i64;

/// A row selected for sending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Recipient {
    /// Row id.
    pub id: RecipientId,
    /// First name, if known.
    pub first_name: Option<String>,
    /// Last name, if known.
    pub last_name: Option<String>,
    /// Address; `None` means the recipient cannot be mailed.
    pub email: Option<String>,
}

impl Recipient {
    /// Creates a recipient with only an address.
    #[must_use]
    pub fn new(id: RecipientId, email: impl Into<String>) -> Self {
        Self {
            id,
            first_name: None,
            last_name: None,
            email: Some(email.into()),
        }
    }
}

/// Send marker (`send1` column).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendState {
    /// Claimed for delivery; never selected again.
    InProgress,
    /// Accepted by the SMTP server.
    Sent,
}

impl SendState {
    /// Stored column value.
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::InProgress => 1,
            Self::Sent => 2,
        }
    }

    /// Parses a stored column value.
    #[must_use]
    pub const fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::InProgress),
            2 => Some(Self::Sent),
            _ => None,
        }
    }
}

/// Observation about an address taken from inbound mail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// The address asked to be removed.
    Unsubscribe,
    /// Mail to the address bounced permanently.
    Fail,
}

impl EventKind {
    /// Timestamp column the event is written to.
    #[must_use]
    pub const fn column(self) -> &'static str {
        match self {
            Self::Unsubscribe => "unsubscribe",
            Self::Fail => "fail",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

/// A recipient that was claimed but never marked sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StuckRecipient {
    /// Row id.
    pub id: RecipientId,
    /// Address at claim time.
    pub email: Option<String>,
    /// Failure recorded by the dispatch loop; `None` after a crash or a
    /// failed final update.
    pub error: Option<String>,
}

/// Full campaign state of one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipientStatus {
    /// Identity and address.
    pub recipient: Recipient,
    /// Send marker.
    pub send_state: Option<SendState>,
    /// When an unsubscribe was recorded.
    pub unsubscribed_at: Option<DateTime<Utc>>,
    /// When a permanent failure was recorded.
    pub failed_at: Option<DateTime<Utc>>,
    /// Recorded send failure.
    pub send_error: Option<String>,
}

impl RecipientStatus {
    /// True if the dispatch loop would select this row.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.send_state.is_none() && self.unsubscribed_at.is_none() && self.failed_at.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_state_codes() {
        assert_eq!(SendState::from_code(SendState::InProgress.code()), Some(SendState::InProgress));
        assert_eq!(SendState::from_code(SendState::Sent.code()), Some(SendState::Sent));
        assert_eq!(SendState::from_code(0), None);
    }

    #[test]
    fn event_columns() {
        assert_eq!(EventKind::Unsubscribe.column(), "unsubscribe");
        assert_eq!(EventKind::Fail.to_string(), "fail");
    }
}
