//! SMTP sessions as seen by the dispatch loop.

use crate::Result;
use crate::config::{Config, Endpoint};
use mailcast_smtp::{Address, Client, Ready, Security, connect};
use tracing::{debug, info, warn};

/// Opens authenticated sessions.
#[allow(async_fn_in_trait)]
pub trait Connector {
    /// Session type produced.
    type Session: Session;

    /// Connects, greets, secures and authenticates a new session.
    ///
    /// # Errors
    ///
    /// Returns an error if any step fails, including authentication.
    async fn open(&self) -> Result<Self::Session>;
}

/// One open session able to deliver messages one at a time.
#[allow(async_fn_in_trait)]
pub trait Session: Sized {
    /// Runs one transaction delivering `message` to `to`.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid or the server rejects
    /// any step. A connection failure leaves the session broken.
    async fn deliver(&mut self, to: &str, message: &[u8]) -> Result<()>;

    /// True once the session can no longer be used.
    fn is_broken(&self) -> bool;

    /// Ends the session politely.
    ///
    /// # Errors
    ///
    /// Returns an error if QUIT fails.
    async fn quit(self) -> Result<()>;
}

/// Connector for a real submission server.
#[derive(Debug, Clone)]
pub struct SmtpConnector {
    endpoint: Endpoint,
    security: Security,
    hello: String,
    username: String,
    password: String,
    envelope_from: Address,
}

impl SmtpConnector {
    /// Builds the connector from the `smtp` section.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint or envelope sender is invalid.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            endpoint: config.smtp_endpoint()?,
            security: config.smtp.security.into(),
            hello: config.smtp.hello.clone(),
            username: config.smtp.username.clone(),
            password: config.smtp.password.clone(),
            envelope_from: Address::new(&config.smtp.from)?,
        })
    }
}

impl Connector for SmtpConnector {
    type Session = SmtpSession;

    async fn open(&self) -> Result<SmtpSession> {
        let Endpoint { host, port } = &self.endpoint;
        debug!(%host, port, security = ?self.security, "dialing smtp server");

        let stream = connect(host, *port, self.security).await?;
        let mut client = Client::greet(stream).await?.ehlo(&self.hello).await?;
        if self.security == Security::StartTls {
            // The EHLO name doubles as the certificate name.
            client = client.starttls(&self.hello, &self.hello).await?;
        }
        let client = if self.username.is_empty() {
            client.without_auth()
        } else {
            client.auth_plain(&self.username, &self.password).await?
        };

        info!(%host, port, "smtp session ready");
        Ok(SmtpSession {
            client: Some(client),
            envelope_from: self.envelope_from.clone(),
        })
    }
}

/// Session over the type-state client. A refused transaction keeps the
/// connection; a connection failure leaves the session broken.
#[derive(Debug)]
pub struct SmtpSession {
    client: Option<Client<Ready>>,
    envelope_from: Address,
}

impl Session for SmtpSession {
    async fn deliver(&mut self, to: &str, message: &[u8]) -> Result<()> {
        let to = Address::new(to)?;
        let client = self
            .client
            .as_mut()
            .ok_or(mailcast_smtp::Error::ConnectionClosed)?;
        if let Err(e) = client.deliver(&self.envelope_from, &to, message).await {
            if !e.keeps_session() {
                warn!(error = %e, "smtp session lost");
                self.client = None;
            }
            return Err(e.into());
        }
        Ok(())
    }

    fn is_broken(&self) -> bool {
        self.client.is_none()
    }

    async fn quit(self) -> Result<()> {
        if let Some(client) = self.client {
            client.quit().await?;
        }
        Ok(())
    }
}
