//! Token lifecycle: cached token, refresh, or interactive consent.

use crate::callback::CallbackListener;
use crate::error::{Error, Result};
use crate::flow::{AuthorizationCodeFlow, OAuthClient};
use crate::token::{Token, TokenCache};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};
use url::Url;

/// How long the interactive flow waits for the browser redirect.
pub const CONSENT_TIMEOUT: Duration = Duration::from_secs(300);

/// Hands out valid access tokens, persisting every new one.
#[derive(Debug)]
pub struct Authorizer {
    client: OAuthClient,
    cache: TokenCache,
    bind: String,
    current: Mutex<Option<Token>>,
}

impl Authorizer {
    /// Creates an authorizer; `bind` is where the redirect is received.
    #[must_use]
    pub fn new(client: OAuthClient, cache: TokenCache, bind: impl Into<String>) -> Self {
        Self {
            client,
            cache,
            bind: bind.into(),
            current: Mutex::new(None),
        }
    }

    /// Establishes a usable token.
    ///
    /// Uses the cached token when still valid, refreshes it when expired,
    /// and otherwise runs the authorization code flow: `prompt` receives
    /// the consent URL and the redirect is awaited on the bind address.
    ///
    /// # Errors
    ///
    /// Returns an error if no token can be obtained.
    pub async fn authorize<F>(&self, prompt: F) -> Result<Token>
    where
        F: FnOnce(&Url),
    {
        let mut current = self.current.lock().await;
        if let Some(token) = current.as_ref().filter(|t| !t.is_expired()) {
            return Ok(token.clone());
        }

        let token = match self.cache.load().await? {
            Some(cached) if !cached.is_expired() => {
                debug!(path = %self.cache.path().display(), "using cached token");
                cached
            }
            Some(cached) if cached.refresh_token.is_some() => self.refresh(&cached).await?,
            _ => self.consent(prompt).await?,
        };

        *current = Some(token.clone());
        Ok(token)
    }

    /// Returns a bearer token, refreshing it first if it has expired.
    ///
    /// Never starts the interactive flow.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotAuthorized`] if there is no token to refresh, or
    /// an error from the token endpoint.
    pub async fn access_token(&self) -> Result<Token> {
        let mut current = self.current.lock().await;
        let token = match current.take() {
            Some(token) => token,
            None => self.cache.load().await?.ok_or(Error::NotAuthorized)?,
        };
        let token = if token.is_expired() {
            self.refresh(&token).await?
        } else {
            token
        };
        *current = Some(token.clone());
        Ok(token)
    }

    async fn refresh(&self, token: &Token) -> Result<Token> {
        let fresh = self.client.refresh_token(token).await?;
        self.cache.save(&fresh).await?;
        Ok(fresh)
    }

    async fn consent<F>(&self, prompt: F) -> Result<Token>
    where
        F: FnOnce(&Url),
    {
        let listener = CallbackListener::bind(&self.bind).await?;
        let flow = AuthorizationCodeFlow::new(self.client.clone()).with_pkce();
        let state = random_state();
        let url = flow.authorization_url(None, Some(&state))?;

        info!(bind = %self.bind, "waiting for authorization redirect");
        prompt(&url);

        let code = listener.wait_for_code(&state, CONSENT_TIMEOUT).await?;
        let token = flow.exchange_code(&code).await?;
        self.cache.save(&token).await?;
        info!(path = %self.cache.path().display(), "authorization stored");
        Ok(token)
    }
}

fn random_state() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
