//! # mailcast-oauth
//!
//! `OAuth2` access to the Gmail REST API for the reconcile run.
//!
//! - **Authorization Code Flow** with PKCE, requesting offline access
//! - **Loopback callback**: the redirect is received on a local bind address
//! - **Token cache**: the issued token is kept in a JSON file and refreshed
//!   when it expires
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailcast_oauth::{Authorizer, OAuthClient, Provider, TokenCache};
//!
//! let client = OAuthClient::new("client-id", Provider::google()?)
//!     .with_client_secret("secret")
//!     .with_redirect_uri("http://localhost:8080");
//! let auth = Authorizer::new(client, TokenCache::new("token.json"), "127.0.0.1:8080");
//!
//! // First run prints the consent URL; later runs reuse the cached token.
//! auth.authorize(|url| println!("Visit: {url}")).await?;
//! let token = auth.access_token().await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod authorizer;
mod callback;
mod error;
pub mod flow;
pub mod provider;
pub mod token;

pub use authorizer::{Authorizer, CONSENT_TIMEOUT};
pub use callback::CallbackListener;
pub use error::{Error, Result};
pub use flow::{AuthorizationCodeFlow, OAuthClient, PkceChallenge};
pub use provider::{GMAIL_MODIFY_SCOPE, Provider};
pub use token::{Token, TokenCache};
