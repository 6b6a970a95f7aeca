//! Remote mailbox access: search, fetch and relabel.

mod gmail;

pub use gmail::{GMAIL_API_BASE, GmailClient};

use crate::Result;
use mailcast_mime::Part;
use serde::Deserialize;

/// Label every search is restricted to, and removed on reconcile.
pub const INBOX: &str = "INBOX";

/// A search hit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MessageRef {
    /// Message id.
    pub id: String,
    /// Conversation id.
    pub thread_id: String,
}

/// One page of search results.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MessagePage {
    /// Hits on this page; absent when nothing matched.
    pub messages: Vec<MessageRef>,
    /// Continuation token for the next page.
    pub next_page_token: Option<String>,
}

/// A fully fetched message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Message {
    /// Message id.
    pub id: String,
    /// Conversation id.
    pub thread_id: String,
    /// Labels currently applied.
    pub label_ids: Vec<String>,
    /// Short plain-text excerpt.
    pub snippet: String,
    /// Root of the part tree; its headers are the message headers.
    pub payload: Part,
}

impl Message {
    /// Value of the first top-level header named `name`.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.payload.header(name)
    }
}

/// A mailbox label.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Label {
    /// Label id used in relabel requests.
    pub id: String,
    /// Display name.
    pub name: String,
    /// `system` or `user`.
    #[serde(rename = "type")]
    pub kind: String,
}

/// Search, fetch and relabel over a remote mailbox.
#[allow(async_fn_in_trait)]
pub trait Mailbox {
    /// Returns one page of messages carrying `label` and matching `query`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    async fn list_page(
        &self,
        label: &str,
        query: &str,
        page_token: Option<&str>,
    ) -> Result<MessagePage>;

    /// Fetches a message in full.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    async fn fetch(&self, id: &str) -> Result<Message>;

    /// Removes and adds labels on a message.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    async fn relabel(&self, id: &str, remove: &[&str], add: &[&str]) -> Result<()>;

    /// Lists every label of the mailbox.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    async fn list_labels(&self) -> Result<Vec<Label>>;

    /// Collects the ids of every message carrying `label` and matching
    /// `query`, following continuation tokens until exhausted.
    ///
    /// # Errors
    ///
    /// Returns an error if any page request fails.
    async fn search(&self, label: &str, query: &str) -> Result<Vec<MessageRef>> {
        let mut refs = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let page = self.list_page(label, query, token.as_deref()).await?;
            refs.extend(page.messages);
            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(next) => token = Some(next),
                None => return Ok(refs),
            }
        }
    }
}
