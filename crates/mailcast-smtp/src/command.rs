//! SMTP command serialization.

use crate::address::Address;
use crate::capabilities::AuthMechanism;

/// SMTP command issued by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command<'a> {
    /// EHLO - Extended greeting
    Ehlo(&'a str),
    /// STARTTLS - Upgrade to TLS
    StartTls,
    /// AUTH with an initial response (SASL-IR)
    Auth {
        /// Authentication mechanism
        mechanism: AuthMechanism,
        /// Base64 initial response
        initial_response: &'a str,
    },
    /// MAIL FROM - Start mail transaction
    MailFrom(&'a Address),
    /// RCPT TO - Add recipient
    RcptTo(&'a Address),
    /// DATA - Begin message data
    Data,
    /// RSET - Reset transaction
    Rset,
    /// QUIT - Close connection
    Quit,
}

impl Command<'_> {
    /// Returns the command verb, used when reporting rejections.
    #[must_use]
    pub const fn verb(&self) -> &'static str {
        match self {
            Self::Ehlo(_) => "EHLO",
            Self::StartTls => "STARTTLS",
            Self::Auth { .. } => "AUTH",
            Self::MailFrom(_) => "MAIL",
            Self::RcptTo(_) => "RCPT",
            Self::Data => "DATA",
            Self::Rset => "RSET",
            Self::Quit => "QUIT",
        }
    }

    /// Serializes the command to wire bytes, CRLF included.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let line = match self {
            Self::Ehlo(hostname) => format!("EHLO {hostname}"),
            Self::Auth {
                mechanism,
                initial_response,
            } => format!("AUTH {} {initial_response}", mechanism.as_str()),
            Self::MailFrom(from) => format!("MAIL FROM:<{from}>"),
            Self::RcptTo(to) => format!("RCPT TO:<{to}>"),
            Self::StartTls | Self::Data | Self::Rset | Self::Quit => self.verb().to_string(),
        };

        let mut buf = line.into_bytes();
        buf.extend_from_slice(b"\r\n");
        buf
    }
}

/// Prepares message content for the DATA phase.
///
/// Line endings are normalized to CRLF, lines starting with `.` are
/// dot-stuffed and the terminating `.` line is appended.
#[must_use]
pub fn encode_data(message: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(message.len() + 64);
    let body = message.strip_suffix(b"\n").unwrap_or(message);
    let body = body.strip_suffix(b"\r").unwrap_or(body);

    if !body.is_empty() {
        for line in body.split(|&b| b == b'\n') {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            if line.first() == Some(&b'.') {
                out.push(b'.');
            }
            out.extend_from_slice(line);
            out.extend_from_slice(b"\r\n");
        }
    }

    out.extend_from_slice(b".\r\n");
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn serializes_session_commands() {
        assert_eq!(
            Command::Ehlo("mailer.example.com").serialize(),
            b"EHLO mailer.example.com\r\n"
        );
        assert_eq!(Command::StartTls.serialize(), b"STARTTLS\r\n");
        assert_eq!(Command::Rset.serialize(), b"RSET\r\n");
        assert_eq!(Command::Data.serialize(), b"DATA\r\n");
        assert_eq!(Command::Quit.serialize(), b"QUIT\r\n");
    }

    #[test]
    fn serializes_auth_with_initial_response() {
        let cmd = Command::Auth {
            mechanism: AuthMechanism::Plain,
            initial_response: "AHVzZXIAcGFzcw==",
        };
        assert_eq!(cmd.serialize(), b"AUTH PLAIN AHVzZXIAcGFzcw==\r\n");
        assert_eq!(cmd.verb(), "AUTH");
    }

    #[test]
    fn serializes_envelope() {
        let from = Address::new("bounces@example.com").unwrap();
        let to = Address::new("jane@example.org").unwrap();
        assert_eq!(
            Command::MailFrom(&from).serialize(),
            b"MAIL FROM:<bounces@example.com>\r\n"
        );
        assert_eq!(
            Command::RcptTo(&to).serialize(),
            b"RCPT TO:<jane@example.org>\r\n"
        );
    }

    #[test]
    fn data_is_normalized_and_stuffed() {
        let encoded = encode_data(b"Subject: x\n\n.hidden\r\nlast");
        assert_eq!(encoded, b"Subject: x\r\n\r\n..hidden\r\nlast\r\n.\r\n");
    }

    #[test]
    fn trailing_newline_does_not_add_blank_line() {
        assert_eq!(encode_data(b"body\r\n"), b"body\r\n.\r\n");
        assert_eq!(encode_data(b""), b".\r\n");
    }
}
