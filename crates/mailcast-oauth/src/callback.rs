//! Loopback HTTP listener that receives the authorization redirect.

use crate::error::{Error, Result};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, warn};
use url::Url;

const DONE_PAGE: &str = "Authorization complete. You can close this window.";
const FAILED_PAGE: &str = "Authorization failed. Check the terminal for details.";

/// Listens on the configured bind address for the provider redirect.
#[derive(Debug)]
pub struct CallbackListener {
    listener: TcpListener,
}

enum Redirect {
    Code { code: String, state: Option<String> },
    Denied { error: String, description: String },
    Unrelated,
}

impl CallbackListener {
    /// Binds the listener, e.g. to `127.0.0.1:8080`.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn bind(addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener })
    }

    /// Returns the bound address.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket address cannot be read.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Waits for the redirect and returns its authorization code.
    ///
    /// Requests without `code` or `error` (a browser asking for a favicon)
    /// are answered with 404 and ignored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] if nothing arrives in time,
    /// [`Error::AccessDenied`] or [`Error::OAuth`] if the provider reports a
    /// failure, and [`Error::Callback`] if `state` does not match.
    pub async fn wait_for_code(&self, expected_state: &str, timeout: Duration) -> Result<String> {
        tokio::time::timeout(timeout, self.accept_code(expected_state))
            .await
            .map_err(|_| Error::Timeout(timeout.as_secs()))?
    }

    async fn accept_code(&self, expected_state: &str) -> Result<String> {
        loop {
            let (mut stream, peer) = self.listener.accept().await?;
            debug!(%peer, "authorization callback connection");

            let redirect = match read_redirect(&mut stream).await {
                Ok(redirect) => redirect,
                Err(e) => {
                    warn!(error = %e, "unreadable callback request");
                    respond(&mut stream, "400 Bad Request", FAILED_PAGE).await;
                    continue;
                }
            };

            match redirect {
                Redirect::Unrelated => {
                    respond(&mut stream, "404 Not Found", "").await;
                }
                Redirect::Denied { error, description } => {
                    respond(&mut stream, "200 OK", FAILED_PAGE).await;
                    if error == "access_denied" {
                        return Err(Error::AccessDenied);
                    }
                    return Err(Error::oauth_error(error, description));
                }
                Redirect::Code { code, state } => {
                    if state.as_deref() != Some(expected_state) {
                        respond(&mut stream, "400 Bad Request", FAILED_PAGE).await;
                        return Err(Error::Callback("state parameter mismatch".into()));
                    }
                    respond(&mut stream, "200 OK", DONE_PAGE).await;
                    return Ok(code);
                }
            }
        }
    }
}

async fn read_redirect(stream: &mut TcpStream) -> Result<Redirect> {
    let mut reader = BufReader::new(stream);
    let mut request_line = String::new();
    reader.read_line(&mut request_line).await?;

    // Drain the remaining request headers.
    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line).await?;
        if n == 0 || line == "\r\n" || line == "\n" {
            break;
        }
    }

    parse_request_line(&request_line)
}

fn parse_request_line(line: &str) -> Result<Redirect> {
    let mut fields = line.split_whitespace();
    let (Some(method), Some(target)) = (fields.next(), fields.next()) else {
        return Err(Error::Callback(format!("malformed request line: {}", line.trim())));
    };
    if method != "GET" {
        return Ok(Redirect::Unrelated);
    }

    let url = Url::parse("http://localhost/")?.join(target)?;
    let mut code = None;
    let mut state = None;
    let mut error = None;
    let mut description = String::new();
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            "error_description" => description = value.into_owned(),
            _ => {}
        }
    }

    Ok(match (code, error) {
        (_, Some(error)) => Redirect::Denied { error, description },
        (Some(code), None) => Redirect::Code { code, state },
        (None, None) => Redirect::Unrelated,
    })
}

async fn respond(stream: &mut TcpStream, status: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    if let Err(e) = stream.write_all(response.as_bytes()).await {
        debug!(error = %e, "could not answer callback request");
    }
    let _ = stream.shutdown().await;
}
