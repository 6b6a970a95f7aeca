//! JSON configuration shared by the send and parse runs.

use crate::error::{Error, Result};
use mailcast_smtp::Security;
use serde::Deserialize;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Path value that selects standard input.
pub const STDIN_PATH: &str = "-";

const DEFAULT_ROTATE_AFTER: usize = 10;
const DEFAULT_UNSUBSCRIBE_QUERY: &str = "subject:unsubscribe";
const DEFAULT_UNDELIVERABLE_QUERY: &str =
    "from:mailer-daemon OR subject:\"delivery status notification\"";

/// Complete configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Directory holding the campaign templates.
    pub template_root: PathBuf,
    /// HTML body template name, relative to `template_root`.
    pub html_template: String,
    /// Plain-text body template name, relative to `template_root`.
    pub text_template: String,
    /// Submission server, `host:port`; fallback for `smtp.server`.
    pub mail_server: String,
    /// Store connection string.
    pub dsn: String,
    /// Recipient table name.
    pub recipient_table: String,
    /// Campaign subject line.
    pub subject: String,
    /// `From` header value.
    pub from: String,
    /// Secret mixed into unsubscribe tokens.
    pub unsubscribe_secret: String,
    /// `List-Unsubscribe` value; a `%s` receives the token.
    pub list_unsubscribe: String,
    /// SMTP session settings.
    pub smtp: SmtpSettings,
    /// Mailbox API credentials.
    pub oauth: OAuthSettings,
    /// Mailbox owner, usually `me`.
    pub user_id: String,
    /// Label ids applied after classification.
    pub labels: Labels,
    /// Address the authorization redirect is received on.
    pub server_bind: String,
    /// Mailbox search queries.
    pub queries: Queries,
}

/// SMTP session settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SmtpSettings {
    /// Server `host:port`; empty means `mailServer`.
    pub server: String,
    /// EHLO name, also the TLS server name for STARTTLS.
    pub hello: String,
    /// Envelope sender.
    pub from: String,
    /// AUTH PLAIN user; empty skips authentication.
    pub username: String,
    /// AUTH PLAIN password.
    pub password: String,
    /// Transport security mode.
    pub security: SecurityMode,
    /// Recipients per session before it is replaced.
    pub rotate_after: usize,
}

impl Default for SmtpSettings {
    fn default() -> Self {
        Self {
            server: String::new(),
            hello: String::new(),
            from: String::new(),
            username: String::new(),
            password: String::new(),
            security: SecurityMode::default(),
            rotate_after: DEFAULT_ROTATE_AFTER,
        }
    }
}

/// Transport security as written in the config file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityMode {
    /// Plain connection upgraded with STARTTLS.
    #[default]
    Starttls,
    /// Implicit TLS.
    Tls,
    /// No encryption.
    None,
}

impl SecurityMode {
    /// Port used when the server address has none.
    #[must_use]
    pub const fn default_port(self) -> u16 {
        match self {
            Self::Starttls => 587,
            Self::Tls => 465,
            Self::None => 25,
        }
    }
}

impl From<SecurityMode> for Security {
    fn from(mode: SecurityMode) -> Self {
        match mode {
            SecurityMode::Starttls => Self::StartTls,
            SecurityMode::Tls => Self::Tls,
            SecurityMode::None => Self::None,
        }
    }
}

/// Mailbox API OAuth client settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OAuthSettings {
    /// OAuth client id.
    pub client_id: String,
    /// OAuth client secret.
    pub client_secret: String,
    /// Redirect URL registered with the provider.
    #[serde(rename = "redirectURL")]
    pub redirect_url: String,
    /// Token cache file.
    pub token_file: PathBuf,
}

/// Label ids (not names) used when relabeling.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Labels {
    /// Label for subscription requests.
    pub subscribe: String,
    /// Label for processed unsubscribe replies.
    pub unsubscribe: String,
    /// Label for processed bounces.
    pub undeliverable: String,
}

/// Mailbox search queries for the two reconcile passes.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Queries {
    /// Query matching unsubscribe replies.
    pub unsubscribe: String,
    /// Query matching bounces.
    pub undeliverable: String,
}

impl Default for Queries {
    fn default() -> Self {
        Self {
            unsubscribe: DEFAULT_UNSUBSCRIBE_QUERY.to_string(),
            undeliverable: DEFAULT_UNDELIVERABLE_QUERY.to_string(),
        }
    }
}

/// Resolved SMTP endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Host name or address.
    pub host: String,
    /// TCP port.
    pub port: u16,
}

impl Config {
    /// Loads the configuration from `path`, or standard input for `-`.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be read or is not valid JSON
    /// for this structure.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = if path.as_os_str() == STDIN_PATH {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        } else {
            std::fs::read_to_string(path)?
        };
        Self::from_json(&raw)
    }

    /// Parses a configuration document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document does not match this structure.
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// SMTP endpoint: `smtp.server`, falling back to `mailServer`.
    ///
    /// # Errors
    ///
    /// Returns an error if neither is set or the port is not a number.
    pub fn smtp_endpoint(&self) -> Result<Endpoint> {
        let server = if self.smtp.server.is_empty() {
            &self.mail_server
        } else {
            &self.smtp.server
        };
        if server.is_empty() {
            return Err(Error::Config("smtp.server or mailServer is required".into()));
        }

        match server.rsplit_once(':') {
            Some((host, port)) if !host.contains(':') || host.starts_with('[') => {
                let port = port
                    .parse()
                    .map_err(|_| Error::Config(format!("invalid port in {server}")))?;
                Ok(Endpoint {
                    host: host.trim_start_matches('[').trim_end_matches(']').to_string(),
                    port,
                })
            }
            _ => Ok(Endpoint {
                host: server.clone(),
                port: self.smtp.security.default_port(),
            }),
        }
    }

    /// Checks everything the send run needs.
    ///
    /// # Errors
    ///
    /// Returns a [`Error::Config`] naming every missing or invalid key.
    pub fn validate_for_send(&self) -> Result<()> {
        let mut problems = self.common_problems();
        for (key, value) in [
            ("htmlTemplate", &self.html_template),
            ("textTemplate", &self.text_template),
            ("from", &self.from),
            ("smtp.hello", &self.smtp.hello),
            ("smtp.from", &self.smtp.from),
        ] {
            if value.is_empty() {
                problems.push(format!("{key} is required"));
            }
        }
        if self.list_unsubscribe.contains("%s") && self.unsubscribe_secret.is_empty() {
            problems.push("unsubscribeSecret is required when listUnsubscribe has %s".into());
        }
        if self.smtp.rotate_after == 0 {
            problems.push("smtp.rotateAfter must be at least 1".into());
        }
        if let Err(Error::Config(problem)) = self.smtp_endpoint() {
            problems.push(problem);
        }
        into_result(problems)
    }

    /// Checks everything the parse run needs.
    ///
    /// # Errors
    ///
    /// Returns a [`Error::Config`] naming every missing or invalid key.
    pub fn validate_for_parse(&self) -> Result<()> {
        let mut problems = self.common_problems();
        for (key, value) in [
            ("oauth.clientId", &self.oauth.client_id),
            ("userId", &self.user_id),
            ("serverBind", &self.server_bind),
            ("labels.unsubscribe", &self.labels.unsubscribe),
            ("labels.undeliverable", &self.labels.undeliverable),
        ] {
            if value.is_empty() {
                problems.push(format!("{key} is required"));
            }
        }
        if self.oauth.token_file.as_os_str().is_empty() {
            problems.push("oauth.tokenFile is required".into());
        }
        into_result(problems)
    }

    /// Checks what the read-only commands need.
    ///
    /// # Errors
    ///
    /// Returns a [`Error::Config`] naming every missing or invalid key.
    pub fn validate_for_store(&self) -> Result<()> {
        into_result(self.common_problems())
    }

    fn common_problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.dsn.is_empty() {
            problems.push("dsn is required".to_string());
        }
        if !is_identifier(&self.recipient_table) {
            problems.push(format!(
                "recipientTable must be a plain identifier, got {:?}",
                self.recipient_table
            ));
        }
        problems
    }
}

fn into_result(problems: Vec<String>) -> Result<()> {
    if problems.is_empty() {
        Ok(())
    } else {
        Err(Error::Config(problems.join("; ")))
    }
}

/// True for `[A-Za-z_][A-Za-z0-9_]*`.
#[must_use]
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
