//! The send run: every pending recipient is attempted at most once.
//!
//! A recipient is claimed (`in-progress`) before delivery and marked
//! `sent` only afterwards. Anything going wrong in between leaves the
//! claim in place, so a recipient is never mailed twice; such rows show
//! up in [`RecipientStore::stuck`] with the recorded error.

mod transport;

pub use transport::{Connector, Session, SmtpConnector, SmtpSession};

use crate::Result;
use crate::compose::{Composer, Renderer};
use crate::store::{Recipient, RecipientStore, SendState};
use tracing::{debug, info, warn};

/// Recipients per session when not configured.
pub const DEFAULT_ROTATE_AFTER: usize = 10;

/// Counters for one send run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Recipients selected as pending.
    pub selected: usize,
    /// Delivered and marked sent.
    pub sent: usize,
    /// Skipped because the row has no address.
    pub missing_email: usize,
    /// Skipped because the claim was not written.
    pub not_claimed: usize,
    /// Claimed but not delivered.
    pub failed: usize,
    /// Delivered but the final mark was not written.
    pub unconfirmed: usize,
    /// Sessions replaced after `rotate_after` recipients.
    pub rotations: usize,
    /// Sessions replaced after breaking.
    pub reconnects: usize,
}

/// Drives one send run over a store, a connector and a composer.
pub struct Dispatcher<'a, S, C, R> {
    store: &'a S,
    connector: &'a C,
    composer: &'a Composer<R>,
    rotate_after: usize,
}

impl<'a, S, C, R> Dispatcher<'a, S, C, R>
where
    S: RecipientStore,
    C: Connector,
    R: Renderer,
{
    /// Creates a dispatcher rotating sessions every
    /// [`DEFAULT_ROTATE_AFTER`] recipients.
    pub const fn new(store: &'a S, connector: &'a C, composer: &'a Composer<R>) -> Self {
        Self {
            store,
            connector,
            composer,
            rotate_after: DEFAULT_ROTATE_AFTER,
        }
    }

    /// Sets how many recipients share one session (at least one).
    #[must_use]
    pub fn rotate_after(mut self, recipients: usize) -> Self {
        self.rotate_after = recipients.max(1);
        self
    }

    /// Runs the send loop.
    ///
    /// # Errors
    ///
    /// Returns an error if the pending query fails or a session cannot be
    /// opened (initially or when replacing one). Per-recipient failures are
    /// logged and counted instead.
    pub async fn run(&self) -> Result<DispatchReport> {
        let pending = self.store.select_pending().await?;
        let mut report = DispatchReport {
            selected: pending.len(),
            ..DispatchReport::default()
        };
        info!(pending = report.selected, "starting send run");

        let mut slot = Some(self.connector.open().await?);
        let mut since_open = 0;

        for recipient in &pending {
            let session = match slot.take() {
                Some(session) if !session.is_broken() && since_open < self.rotate_after => {
                    slot.insert(session)
                }
                previous => {
                    if let Some(old) = previous {
                        if old.is_broken() {
                            report.reconnects += 1;
                            debug!("replacing broken smtp session");
                        } else {
                            report.rotations += 1;
                            debug!(after = since_open, "rotating smtp session");
                            if let Err(e) = old.quit().await {
                                warn!(error = %e, "QUIT failed during rotation");
                            }
                        }
                    }
                    since_open = 0;
                    slot.insert(self.connector.open().await?)
                }
            };
            since_open += 1;

            self.send_one(session, recipient, &mut report).await;
        }

        if let Some(session) = slot.filter(|s| !s.is_broken())
            && let Err(e) = session.quit().await
        {
            warn!(error = %e, "QUIT failed at end of run");
        }

        info!(
            selected = report.selected,
            sent = report.sent,
            missing_email = report.missing_email,
            not_claimed = report.not_claimed,
            failed = report.failed,
            unconfirmed = report.unconfirmed,
            "send run finished"
        );
        Ok(report)
    }

    async fn send_one(
        &self,
        session: &mut C::Session,
        recipient: &Recipient,
        report: &mut DispatchReport,
    ) {
        let id = recipient.id;
        let Some(email) = recipient.email.as_deref() else {
            warn!(recipient = id, "no email address, left pending");
            report.missing_email += 1;
            return;
        };

        match self.store.set_send_state(id, SendState::InProgress).await {
            Ok(true) => {}
            Ok(false) => {
                info!(recipient = id, "no longer pending, skipped");
                report.not_claimed += 1;
                return;
            }
            Err(e) => {
                warn!(recipient = id, error = %e, "could not claim recipient, skipped");
                report.not_claimed += 1;
                return;
            }
        }

        let delivered = match self.composer.compose(recipient, email) {
            Ok(message) => session.deliver(email, &message).await,
            Err(e) => Err(e),
        };
        if let Err(e) = delivered {
            warn!(recipient = id, %email, error = %e, "delivery failed, left in progress");
            report.failed += 1;
            if let Err(store_err) = self.store.record_send_failure(id, &e.to_string()).await {
                warn!(recipient = id, error = %store_err, "could not record send failure");
            }
            return;
        }

        match self.store.set_send_state(id, SendState::Sent).await {
            Ok(true) => {
                info!(recipient = id, %email, "sent");
                report.sent += 1;
            }
            Ok(false) => {
                warn!(recipient = id, %email, "sent, but claim was gone when marking");
                report.unconfirmed += 1;
            }
            Err(e) => {
                warn!(recipient = id, %email, error = %e, "sent, but could not mark as sent");
                report.unconfirmed += 1;
            }
        }
    }
}
