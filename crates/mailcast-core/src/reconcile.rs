//! The parse run: replies and bounces written back to the recipient store.

use crate::Result;
use crate::classify::Classifier;
use crate::config::Config;
use crate::mailbox::{INBOX, Mailbox};
use crate::store::{EventKind, RecipientStore};
use chrono::Utc;
use tracing::{info, warn};

/// One search-and-classify pass.
#[derive(Debug)]
pub struct Pass {
    /// Chain applied to every hit.
    pub classifier: Classifier,
    /// Mailbox search query.
    pub query: String,
    /// Label id that replaces `INBOX` once recorded.
    pub label: String,
}

impl Pass {
    /// Unsubscribe replies.
    ///
    /// # Errors
    ///
    /// Returns an error if the classifier cannot be built.
    pub fn unsubscribe(config: &Config) -> Result<Self> {
        Ok(Self {
            classifier: Classifier::unsubscribe()?,
            query: config.queries.unsubscribe.clone(),
            label: config.labels.unsubscribe.clone(),
        })
    }

    /// Delivery-failure notifications.
    ///
    /// # Errors
    ///
    /// Returns an error if the classifier cannot be built.
    pub fn undeliverable(config: &Config) -> Result<Self> {
        Ok(Self {
            classifier: Classifier::undeliverable()?,
            query: config.queries.undeliverable.clone(),
            label: config.labels.undeliverable.clone(),
        })
    }
}

/// Counters for one pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassReport {
    /// Event kind of the pass.
    pub kind: EventKind,
    /// Search hits.
    pub found: usize,
    /// Recorded in the store and relabelled.
    pub matched: usize,
    /// No address found; left in the inbox.
    pub unmatched: usize,
    /// Recorded in the store but still in the inbox.
    pub relabel_failed: usize,
    /// Fetch or store failures.
    pub errors: usize,
}

impl PassReport {
    const fn new(kind: EventKind) -> Self {
        Self {
            kind,
            found: 0,
            matched: 0,
            unmatched: 0,
            relabel_failed: 0,
            errors: 0,
        }
    }
}

/// Runs passes against a mailbox and a store.
pub struct Reconciler<'a, S, M> {
    store: &'a S,
    mailbox: &'a M,
}

impl<'a, S, M> Reconciler<'a, S, M>
where
    S: RecipientStore,
    M: Mailbox,
{
    /// Creates a reconciler.
    pub const fn new(store: &'a S, mailbox: &'a M) -> Self {
        Self { store, mailbox }
    }

    /// Runs the passes in order.
    ///
    /// # Errors
    ///
    /// Returns an error as soon as a search fails; see [`Self::run_pass`].
    pub async fn run(&self, passes: &[Pass]) -> Result<Vec<PassReport>> {
        let mut reports = Vec::with_capacity(passes.len());
        for pass in passes {
            reports.push(self.run_pass(pass).await?);
        }
        Ok(reports)
    }

    /// Searches `INBOX` with the pass query and handles every hit.
    ///
    /// A message is relabelled only after its event was stored, so a
    /// message left in the inbox is picked up again by the next run.
    ///
    /// # Errors
    ///
    /// Returns an error if the search fails. Per-message failures are
    /// logged and counted.
    pub async fn run_pass(&self, pass: &Pass) -> Result<PassReport> {
        let kind = pass.classifier.kind();
        let refs = self.mailbox.search(INBOX, &pass.query).await?;
        let mut report = PassReport::new(kind);
        report.found = refs.len();
        info!(%kind, query = %pass.query, found = report.found, "searching inbox");

        for message_ref in &refs {
            let id = message_ref.id.as_str();
            let message = match self.mailbox.fetch(id).await {
                Ok(message) => message,
                Err(e) => {
                    warn!(message = id, error = %e, "fetch failed");
                    report.errors += 1;
                    continue;
                }
            };

            let classification = match pass.classifier.classify(&message) {
                Ok(classification) => classification,
                Err(e) => {
                    warn!(message = id, %kind, error = %e, "not classified, left in inbox");
                    report.unmatched += 1;
                    continue;
                }
            };
            let address = classification.address.as_str();

            if let Err(e) = self.store.upsert_address_event(address, kind, Utc::now()).await {
                warn!(message = id, %address, error = %e, "could not record event, left in inbox");
                report.errors += 1;
                continue;
            }
            info!(message = id, %kind, %address, strategy = classification.strategy, "recorded");

            match self.mailbox.relabel(id, &[INBOX], &[pass.label.as_str()]).await {
                Ok(()) => report.matched += 1,
                Err(e) => {
                    warn!(message = id, label = %pass.label, error = %e, "relabel failed");
                    report.relabel_failed += 1;
                }
            }
        }

        info!(
            %kind,
            found = report.found,
            matched = report.matched,
            unmatched = report.unmatched,
            relabel_failed = report.relabel_failed,
            errors = report.errors,
            "pass finished"
        );
        Ok(report)
    }
}
