//! Gmail REST client.

use super::{Label, Mailbox, Message, MessagePage};
use crate::{Error, Result};
use mailcast_oauth::Authorizer;
use reqwest::header::AUTHORIZATION;
use reqwest::{RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

/// Root of the Gmail v1 API.
pub const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1/";

/// Mailbox over the Gmail API, authorized with a bearer token.
#[derive(Debug)]
pub struct GmailClient {
    http: reqwest::Client,
    base: Url,
    user_id: String,
    authorizer: Authorizer,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ModifyRequest<'a> {
    add_label_ids: &'a [&'a str],
    remove_label_ids: &'a [&'a str],
}

#[derive(Deserialize)]
struct LabelList {
    #[serde(default)]
    labels: Vec<Label>,
}

#[derive(Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

impl GmailClient {
    /// Creates a client for the mailbox of `user_id` (usually `me`).
    ///
    /// # Errors
    ///
    /// Returns an error if the API base URL cannot be parsed.
    pub fn new(authorizer: Authorizer, user_id: impl Into<String>) -> Result<Self> {
        Ok(Self {
            http: reqwest::Client::new(),
            base: Url::parse(GMAIL_API_BASE)?,
            user_id: user_id.into(),
            authorizer,
        })
    }

    /// Points the client at another API root.
    #[must_use]
    pub fn with_base_url(mut self, base: Url) -> Self {
        self.base = base;
        self
    }

    /// The authorizer supplying bearer tokens.
    #[must_use]
    pub const fn authorizer(&self) -> &Authorizer {
        &self.authorizer
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| Error::Config(format!("mailbox URL {} has no path", self.base)))?
            .pop_if_empty()
            .push("users")
            .push(&self.user_id)
            .extend(segments);
        Ok(url)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let token = self.authorizer.access_token().await?;
        let response = request
            .header(AUTHORIZATION, token.authorization_header())
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiError>(&body).map_or(body, |e| e.error.message);
        Err(Error::Mailbox {
            status: status.as_u16(),
            message,
        })
    }
}

impl Mailbox for GmailClient {
    async fn list_page(
        &self,
        label: &str,
        query: &str,
        page_token: Option<&str>,
    ) -> Result<MessagePage> {
        let mut url = self.endpoint(&["messages"])?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("labelIds", label);
            if !query.is_empty() {
                pairs.append_pair("q", query);
            }
            if let Some(token) = page_token {
                pairs.append_pair("pageToken", token);
            }
        }
        debug!(%label, %query, ?page_token, "listing messages");

        let page = self.send(self.http.get(url)).await?.json().await?;
        Ok(page)
    }

    async fn fetch(&self, id: &str) -> Result<Message> {
        let mut url = self.endpoint(&["messages", id])?;
        url.query_pairs_mut().append_pair("format", "full");

        let message = self.send(self.http.get(url)).await?.json().await?;
        Ok(message)
    }

    async fn relabel(&self, id: &str, remove: &[&str], add: &[&str]) -> Result<()> {
        let url = self.endpoint(&["messages", id, "modify"])?;
        let body = ModifyRequest {
            add_label_ids: add,
            remove_label_ids: remove,
        };

        self.send(self.http.post(url).json(&body)).await?;
        debug!(message = id, ?remove, ?add, "relabelled");
        Ok(())
    }

    async fn list_labels(&self) -> Result<Vec<Label>> {
        let url = self.endpoint(&["labels"])?;
        let list: LabelList = self.send(self.http.get(url)).await?.json().await?;
        Ok(list.labels)
    }
}
