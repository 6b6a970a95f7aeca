//! Server capabilities advertised in the EHLO reply.

use crate::reply::Reply;

/// SASL authentication mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthMechanism {
    /// PLAIN - plaintext authentication
    Plain,
    /// LOGIN - legacy plaintext
    Login,
    /// `XOAUTH2` - `OAuth2` (Google/Microsoft)
    XOAuth2,
}

impl AuthMechanism {
    /// Parses an authentication mechanism name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "PLAIN" => Some(Self::Plain),
            "LOGIN" => Some(Self::Login),
            "XOAUTH2" => Some(Self::XOAuth2),
            _ => None,
        }
    }

    /// Returns the mechanism name as a string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Plain => "PLAIN",
            Self::Login => "LOGIN",
            Self::XOAuth2 => "XOAUTH2",
        }
    }
}

/// What the server told us about itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// Server hostname from the greeting.
    pub hostname: String,
    /// Whether `STARTTLS` was advertised.
    pub starttls: bool,
    /// Advertised `AUTH` mechanisms, in server order.
    pub auth: Vec<AuthMechanism>,
    /// Advertised `SIZE` limit, if any.
    pub max_size: Option<usize>,
    /// Whether `8BITMIME` was advertised.
    pub eight_bit_mime: bool,
}

impl Capabilities {
    /// Rebuilds the capability set from an EHLO reply, keeping the
    /// greeting hostname.
    ///
    /// The first reply line is the server's greeting and is skipped.
    pub fn update_from_ehlo(&mut self, reply: &Reply) {
        self.starttls = false;
        self.auth.clear();
        self.max_size = None;
        self.eight_bit_mime = false;

        for line in reply.message.iter().skip(1) {
            let mut words = line.split_whitespace();
            let Some(keyword) = words.next() else {
                continue;
            };
            match keyword.to_ascii_uppercase().as_str() {
                "STARTTLS" => self.starttls = true,
                "AUTH" => self.auth = words.filter_map(AuthMechanism::parse).collect(),
                "SIZE" => self.max_size = words.next().and_then(|s| s.parse().ok()),
                "8BITMIME" => self.eight_bit_mime = true,
                _ => {}
            }
        }
    }

    /// Returns true if the server accepts the given mechanism.
    ///
    /// Servers that list no mechanisms at all are given the benefit of the
    /// doubt; the `AUTH` reply decides.
    #[must_use]
    pub fn accepts(&self, mechanism: AuthMechanism) -> bool {
        self.auth.is_empty() || self.auth.contains(&mechanism)
    }
}
