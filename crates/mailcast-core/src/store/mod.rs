//! Recipient list persistence.

mod model;
mod repository;

pub use model::{EventKind, Recipient, RecipientId, RecipientStatus, SendState, StuckRecipient};
pub use repository::SqliteRecipientStore;

use crate::Result;
use chrono::{DateTime, Utc};

/// Keyed recipient store with atomic single-row updates.
#[allow(async_fn_in_trait)]
pub trait RecipientStore {
    /// Recipients with no send state and no unsubscribe or failure
    /// recorded, in id order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    async fn select_pending(&self) -> Result<Vec<Recipient>>;

    /// Moves a recipient to `state`.
    ///
    /// [`SendState::InProgress`] is only written while the row is still
    /// pending and [`SendState::Sent`] only from in-progress. Returns
    /// whether the row changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    async fn set_send_state(&self, id: RecipientId, state: SendState) -> Result<bool>;

    /// Records why an in-progress recipient was not delivered.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    async fn record_send_failure(&self, id: RecipientId, reason: &str) -> Result<()>;

    /// Recipients left in progress, in id order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    async fn stuck(&self) -> Result<Vec<StuckRecipient>>;

    /// Stamps `kind` on every row with exactly `address`, inserting a new
    /// row when there is none.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction fails.
    async fn upsert_address_event(
        &self,
        address: &str,
        kind: EventKind,
        at: DateTime<Utc>,
    ) -> Result<()>;
}
