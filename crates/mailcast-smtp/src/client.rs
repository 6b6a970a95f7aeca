//! Type-state SMTP client.

use crate::address::Address;
use crate::capabilities::{AuthMechanism, Capabilities};
use crate::command::{Command, encode_data};
use crate::error::{Error, Result};
use crate::reply::{Reply, ReplyCode, is_last_reply_line, parse_reply};
use crate::stream::SmtpStream;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::marker::PhantomData;
use tracing::{debug, trace};

/// Type-state marker: greeted, not yet authenticated.
#[derive(Debug)]
pub struct Connected;

/// Type-state marker: ready to start a mail transaction.
#[derive(Debug)]
pub struct Ready;

/// Type-state marker: `MAIL FROM` accepted.
#[derive(Debug)]
pub struct MailTransaction;

/// Type-state marker: at least one `RCPT TO` accepted.
#[derive(Debug)]
pub struct RecipientAdded;

/// Type-state marker: `DATA` accepted, waiting for content.
#[derive(Debug)]
pub struct Data;

/// SMTP client with type-state pattern.
#[derive(Debug)]
pub struct Client<State> {
    stream: SmtpStream,
    capabilities: Capabilities,
    _state: PhantomData<State>,
}

impl<S> Client<S> {
    fn transition<T>(self) -> Client<T> {
        Client {
            stream: self.stream,
            capabilities: self.capabilities,
            _state: PhantomData,
        }
    }

    /// Returns what the server advertised.
    #[must_use]
    pub const fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    async fn command(&mut self, cmd: Command<'_>) -> Result<Reply> {
        trace!(command = cmd.verb(), "smtp >>");
        self.stream.write_all(&cmd.serialize()).await?;
        Self::read_reply(&mut self.stream).await
    }

    /// Sends a command and requires a 2xx reply.
    async fn expect_success(&mut self, cmd: Command<'_>) -> Result<Reply> {
        let verb = cmd.verb();
        let reply = self.command(cmd).await?;
        if reply.is_success() {
            Ok(reply)
        } else {
            Err(Error::rejected(verb, &reply))
        }
    }

    fn check_size(&self, message: &[u8]) -> Result<()> {
        match self.capabilities.max_size {
            Some(limit) if limit > 0 && message.len() > limit => Err(Error::MessageTooLarge {
                size: message.len(),
                limit,
            }),
            _ => Ok(()),
        }
    }

    async fn read_reply(stream: &mut SmtpStream) -> Result<Reply> {
        let mut lines = Vec::new();
        loop {
            let line = stream.read_line().await?;
            if line.is_empty() {
                continue;
            }
            let is_last = is_last_reply_line(&line);
            lines.push(line);
            if is_last {
                break;
            }
        }
        let reply = parse_reply(&lines)?;
        trace!(code = %reply.code, "smtp <<");
        Ok(reply)
    }

    /// Sends QUIT and closes the connection (available in any state).
    ///
    /// # Errors
    ///
    /// Returns an error if QUIT cannot be written or is answered with
    /// something other than a 2xx.
    pub async fn quit(mut self) -> Result<()> {
        self.expect_success(Command::Quit).await?;
        Ok(())
    }
}

impl Client<Connected> {
    /// Reads the server greeting from a freshly opened stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the greeting cannot be read or is not a 2xx.
    pub async fn greet(mut stream: SmtpStream) -> Result<Self> {
        let greeting = Self::read_reply(&mut stream).await?;
        if !greeting.is_success() {
            return Err(Error::rejected("CONNECT", &greeting));
        }

        let hostname = greeting
            .message
            .first()
            .and_then(|msg| msg.split_whitespace().next())
            .unwrap_or("unknown")
            .to_string();
        debug!(server = %hostname, "smtp greeting received");

        Ok(Self {
            stream,
            capabilities: Capabilities {
                hostname,
                ..Capabilities::default()
            },
            _state: PhantomData,
        })
    }

    /// Sends EHLO and records the advertised capabilities.
    ///
    /// # Errors
    ///
    /// Returns an error if the EHLO command fails.
    pub async fn ehlo(mut self, client_hostname: &str) -> Result<Self> {
        let reply = self.expect_success(Command::Ehlo(client_hostname)).await?;
        self.capabilities.update_from_ehlo(&reply);
        Ok(self)
    }

    /// Upgrades the connection with STARTTLS and repeats EHLO.
    ///
    /// `server_name` is verified against the server certificate.
    ///
    /// # Errors
    ///
    /// Returns an error if STARTTLS is not advertised or the upgrade fails.
    pub async fn starttls(mut self, server_name: &str, client_hostname: &str) -> Result<Self> {
        if !self.capabilities.starttls {
            return Err(Error::NotSupported("STARTTLS"));
        }

        self.expect_success(Command::StartTls).await?;
        self.stream = self.stream.upgrade_to_tls(server_name).await?;
        debug!(server = %server_name, "smtp session upgraded to TLS");

        self.ehlo(client_hostname).await
    }

    /// Authenticates with the PLAIN mechanism.
    ///
    /// # Errors
    ///
    /// Returns an error if the server does not offer PLAIN or rejects the
    /// credentials.
    pub async fn auth_plain(mut self, username: &str, password: &str) -> Result<Client<Ready>> {
        if !self.capabilities.accepts(AuthMechanism::Plain) {
            return Err(Error::NotSupported("AUTH PLAIN"));
        }

        let credentials = format!("\0{username}\0{password}");
        let encoded = STANDARD.encode(credentials.as_bytes());
        self.expect_success(Command::Auth {
            mechanism: AuthMechanism::Plain,
            initial_response: &encoded,
        })
        .await?;

        debug!(user = %username, "smtp authenticated");
        Ok(self.transition())
    }

    /// Skips authentication (relays that accept unauthenticated mail).
    #[must_use]
    pub fn without_auth(self) -> Client<Ready> {
        self.transition()
    }
}

impl Client<Ready> {
    /// Clears any transaction state on the server.
    ///
    /// # Errors
    ///
    /// Returns an error if the RSET command fails.
    pub async fn reset(mut self) -> Result<Self> {
        self.expect_success(Command::Rset).await?;
        Ok(self)
    }

    /// Starts a mail transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the MAIL FROM command fails.
    pub async fn mail_from(mut self, from: &Address) -> Result<Client<MailTransaction>> {
        self.expect_success(Command::MailFrom(from)).await?;
        Ok(self.transition())
    }

    /// Runs one complete transaction: RSET, MAIL, RCPT, DATA and content.
    ///
    /// The client stays in the ready state whatever happens. After an
    /// error, [`Error::keeps_session`] tells whether it can still be used;
    /// the next transaction starts with RSET either way.
    ///
    /// # Errors
    ///
    /// Returns an error if any step is rejected, the message exceeds the
    /// advertised size limit or the connection fails.
    pub async fn deliver(&mut self, from: &Address, to: &Address, message: &[u8]) -> Result<()> {
        self.check_size(message)?;
        self.expect_success(Command::Rset).await?;
        self.expect_success(Command::MailFrom(from)).await?;
        self.expect_success(Command::RcptTo(to)).await?;
        let reply = self.command(Command::Data).await?;
        if reply.code != ReplyCode::START_DATA {
            return Err(Error::rejected("DATA", &reply));
        }
        self.stream.write_all(&encode_data(message)).await?;
        let reply = Self::read_reply(&mut self.stream).await?;
        if !reply.is_success() {
            return Err(Error::rejected("DATA", &reply));
        }
        debug!(to = %to, "message accepted");
        Ok(())
    }
}

impl Client<MailTransaction> {
    /// Adds a recipient to the transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the RCPT TO command fails.
    pub async fn rcpt_to(mut self, to: &Address) -> Result<Client<RecipientAdded>> {
        self.expect_success(Command::RcptTo(to)).await?;
        Ok(self.transition())
    }
}

impl Client<RecipientAdded> {
    /// Adds another recipient to the transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the RCPT TO command fails.
    pub async fn rcpt_to(mut self, to: &Address) -> Result<Self> {
        self.expect_success(Command::RcptTo(to)).await?;
        Ok(self)
    }

    /// Begins sending message data.
    ///
    /// # Errors
    ///
    /// Returns an error unless the server answers 354.
    pub async fn data(mut self) -> Result<Client<Data>> {
        let reply = self.command(Command::Data).await?;
        if reply.code != ReplyCode::START_DATA {
            return Err(Error::rejected("DATA", &reply));
        }
        Ok(self.transition())
    }
}

impl Client<Data> {
    /// Sends the message content and completes the transaction.
    ///
    /// Line endings are normalized to CRLF and the terminating `.` line is
    /// added automatically.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails or the server rejects the message.
    pub async fn send_message(mut self, message: &[u8]) -> Result<Client<Ready>> {
        self.check_size(message)?;

        self.stream.write_all(&encode_data(message)).await?;
        let reply = Self::read_reply(&mut self.stream).await?;
        if !reply.is_success() {
            return Err(Error::rejected("DATA", &reply));
        }
        Ok(self.transition())
    }
}
