//! `SQLite` recipient table.

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use tracing::debug;

use super::RecipientStore;
use super::model::{EventKind, Recipient, RecipientId, RecipientStatus, SendState, StuckRecipient};
use crate::config::is_identifier;
use crate::{Error, Result};

const PENDING: &str = "send1 IS NULL AND unsubscribe IS NULL AND fail IS NULL";

/// Recipient table in an `SQLite` database.
///
/// The table name comes from configuration and is interpolated into SQL,
/// so it is checked to be a plain identifier first.
pub struct SqliteRecipientStore {
    pool: SqlitePool,
    table: String,
}

impl SqliteRecipientStore {
    /// Opens the database at `dsn` (an sqlx `SQLite` URL).
    ///
    /// Creates the database and table if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the table name is not an identifier, the
    /// connection fails or schema creation fails.
    pub async fn connect(dsn: &str, table: &str) -> Result<Self> {
        let table = checked_table(table)?;
        let options = SqliteConnectOptions::from_str(dsn)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool, table };
        store.initialize().await?;
        Ok(store)
    }

    /// Create an in-memory store for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn in_memory(table: &str) -> Result<Self> {
        let table = checked_table(table)?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let store = Self { pool, table };
        store.initialize().await?;
        Ok(store)
    }

    /// Initialize database schema.
    async fn initialize(&self) -> Result<()> {
        let table = &self.table;
        sqlx::query(&format!(
            r"
            CREATE TABLE IF NOT EXISTS {table} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                first TEXT,
                last TEXT,
                email TEXT,
                send1 INTEGER,
                unsubscribe TEXT,
                fail TEXT,
                send_error TEXT
            )
            "
        ))
        .execute(&self.pool)
        .await?;

        // Tables created before failures were recorded lack `send_error`.
        let columns: Vec<String> =
            sqlx::query_scalar(&format!("SELECT name FROM pragma_table_info('{table}')"))
                .fetch_all(&self.pool)
                .await?;
        if !columns.iter().any(|c| c == "send_error") {
            debug!(%table, "adding send_error column");
            sqlx::query(&format!("ALTER TABLE {table} ADD COLUMN send_error TEXT"))
                .execute(&self.pool)
                .await?;
        }

        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_email ON {table}(email)"
        ))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Adds a recipient and returns its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub async fn insert(
        &self,
        first_name: Option<&str>,
        last_name: Option<&str>,
        email: Option<&str>,
    ) -> Result<RecipientId> {
        let result = sqlx::query(&format!(
            "INSERT INTO {} (first, last, email) VALUES (?, ?, ?)",
            self.table
        ))
        .bind(first_name)
        .bind(last_name)
        .bind(email)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Full state of one row.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn status(&self, id: RecipientId) -> Result<Option<RecipientStatus>> {
        let row = sqlx::query(&format!(
            "SELECT id, first, last, email, send1, unsubscribe, fail, send_error FROM {} WHERE id = ?",
            self.table
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(status_from_row))
    }

    /// Full state of every row carrying exactly `email`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn status_by_email(&self, email: &str) -> Result<Vec<RecipientStatus>> {
        let rows = sqlx::query(&format!(
            "SELECT id, first, last, email, send1, unsubscribe, fail, send_error FROM {} WHERE email = ? ORDER BY id",
            self.table
        ))
        .bind(email)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(status_from_row).collect())
    }
}

impl RecipientStore for SqliteRecipientStore {
    async fn select_pending(&self) -> Result<Vec<Recipient>> {
        let rows = sqlx::query(&format!(
            "SELECT id, first, last, email FROM {} WHERE {PENDING} ORDER BY id",
            self.table
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(recipient_from_row).collect())
    }

    async fn set_send_state(&self, id: RecipientId, state: SendState) -> Result<bool> {
        let guard = match state {
            SendState::InProgress => PENDING.to_string(),
            SendState::Sent => format!("send1 = {}", SendState::InProgress.code()),
        };
        let result = sqlx::query(&format!(
            "UPDATE {} SET send1 = ? WHERE id = ? AND {guard}",
            self.table
        ))
        .bind(state.code())
        .bind(id)
        .execute(&self.pool)
        .await?;

        let changed = result.rows_affected() > 0;
        debug!(recipient = id, ?state, changed, "send state update");
        Ok(changed)
    }

    async fn record_send_failure(&self, id: RecipientId, reason: &str) -> Result<()> {
        sqlx::query(&format!(
            "UPDATE {} SET send_error = ? WHERE id = ? AND send1 = ?",
            self.table
        ))
        .bind(reason)
        .bind(id)
        .bind(SendState::InProgress.code())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn stuck(&self) -> Result<Vec<StuckRecipient>> {
        let rows = sqlx::query(&format!(
            "SELECT id, email, send_error FROM {} WHERE send1 = ? ORDER BY id",
            self.table
        ))
        .bind(SendState::InProgress.code())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| StuckRecipient {
                id: row.get("id"),
                email: row.get("email"),
                error: row.get("send_error"),
            })
            .collect())
    }

    async fn upsert_address_event(
        &self,
        address: &str,
        kind: EventKind,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let column = kind.column();
        let stamp = at.to_rfc3339_opts(SecondsFormat::Secs, true);
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(&format!(
            "UPDATE {} SET {column} = ? WHERE email = ?",
            self.table
        ))
        .bind(&stamp)
        .bind(address)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            sqlx::query(&format!(
                "INSERT INTO {} (email, {column}) VALUES (?, ?)",
                self.table
            ))
            .bind(address)
            .bind(&stamp)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(%address, %kind, inserted = updated == 0, "address event stored");
        Ok(())
    }
}

fn checked_table(table: &str) -> Result<String> {
    if is_identifier(table) {
        Ok(table.to_string())
    } else {
        Err(Error::Config(format!("invalid table name {table:?}")))
    }
}

fn recipient_from_row(row: &SqliteRow) -> Recipient {
    Recipient {
        id: row.get("id"),
        first_name: row.get("first"),
        last_name: row.get("last"),
        email: row.get("email"),
    }
}

fn status_from_row(row: &SqliteRow) -> RecipientStatus {
    RecipientStatus {
        recipient: recipient_from_row(row),
        send_state: row
            .get::<Option<i64>, _>("send1")
            .and_then(SendState::from_code),
        unsubscribed_at: parse_stamp(row.get("unsubscribe")),
        failed_at: parse_stamp(row.get("fail")),
        send_error: row.get("send_error"),
    }
}

fn parse_stamp(value: Option<String>) -> Option<DateTime<Utc>> {
    value
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    async fn store() -> SqliteRecipientStore {
        SqliteRecipientStore::in_memory("sendlist").await.unwrap()
    }

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, hour, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn rejects_bad_table_name() {
        let result = SqliteRecipientStore::in_memory("x; DROP TABLE y").await;
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn pending_excludes_every_marker() {
        let store = store().await;
        let fresh = store.insert(Some("Ann"), None, Some("ann@example.com")).await.unwrap();
        let claimed = store.insert(None, None, Some("bob@example.com")).await.unwrap();
        let sent = store.insert(None, None, Some("cy@example.com")).await.unwrap();
        let _unsub = store.insert(None, None, Some("dee@example.com")).await.unwrap();
        let _failed = store.insert(None, None, Some("eve@example.com")).await.unwrap();
        let no_email = store.insert(Some("Nobody"), None, None).await.unwrap();

        assert!(store.set_send_state(claimed, SendState::InProgress).await.unwrap());
        assert!(store.set_send_state(sent, SendState::InProgress).await.unwrap());
        assert!(store.set_send_state(sent, SendState::Sent).await.unwrap());
        store
            .upsert_address_event("dee@example.com", EventKind::Unsubscribe, at(1))
            .await
            .unwrap();
        store
            .upsert_address_event("eve@example.com", EventKind::Fail, at(1))
            .await
            .unwrap();

        let ids: Vec<_> = store
            .select_pending()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![fresh, no_email]);

        let pending = store.select_pending().await.unwrap();
        assert_eq!(pending[0].first_name.as_deref(), Some("Ann"));
        assert_eq!(pending[1].email, None);
    }

    #[tokio::test]
    async fn claim_only_succeeds_while_pending() {
        let store = store().await;
        let id = store.insert(None, None, Some("ann@example.com")).await.unwrap();

        store
            .upsert_address_event("ann@example.com", EventKind::Unsubscribe, at(2))
            .await
            .unwrap();
        assert!(!store.set_send_state(id, SendState::InProgress).await.unwrap());
        assert_eq!(store.status(id).await.unwrap().unwrap().send_state, None);
    }

    #[tokio::test]
    async fn sent_requires_in_progress() {
        let store = store().await;
        let id = store.insert(None, None, Some("ann@example.com")).await.unwrap();

        assert!(!store.set_send_state(id, SendState::Sent).await.unwrap());
        assert!(store.set_send_state(id, SendState::InProgress).await.unwrap());
        assert!(!store.set_send_state(id, SendState::InProgress).await.unwrap());
        assert!(store.set_send_state(id, SendState::Sent).await.unwrap());
        assert_eq!(
            store.status(id).await.unwrap().unwrap().send_state,
            Some(SendState::Sent)
        );
    }

    #[tokio::test]
    async fn failures_are_listed_as_stuck() {
        let store = store().await;
        let a = store.insert(None, None, Some("a@example.com")).await.unwrap();
        let b = store.insert(None, None, Some("b@example.com")).await.unwrap();
        let c = store.insert(None, None, Some("c@example.com")).await.unwrap();
        for id in [a, b, c] {
            store.set_send_state(id, SendState::InProgress).await.unwrap();
        }
        store.set_send_state(c, SendState::Sent).await.unwrap();
        store.record_send_failure(a, "550 mailbox unavailable").await.unwrap();

        let stuck = store.stuck().await.unwrap();
        assert_eq!(
            stuck,
            vec![
                StuckRecipient {
                    id: a,
                    email: Some("a@example.com".into()),
                    error: Some("550 mailbox unavailable".into()),
                },
                StuckRecipient {
                    id: b,
                    email: Some("b@example.com".into()),
                    error: None,
                },
            ]
        );
    }

    #[tokio::test]
    async fn adds_send_error_to_existing_table() {
        let dir = tempfile::tempdir().unwrap();
        let dsn = format!("sqlite://{}", dir.path().join("list.db").display());
        let legacy = SqlitePool::connect_with(
            SqliteConnectOptions::from_str(&dsn).unwrap().create_if_missing(true),
        )
        .await
        .unwrap();
        sqlx::query(
            "CREATE TABLE sendlist (id INTEGER PRIMARY KEY, first TEXT, last TEXT, \
             email TEXT, send1 INTEGER, unsubscribe TEXT, fail TEXT)",
        )
        .execute(&legacy)
        .await
        .unwrap();
        sqlx::query("INSERT INTO sendlist (id, email, send1) VALUES (1, 'old@example.com', 1)")
            .execute(&legacy)
            .await
            .unwrap();
        legacy.close().await;

        let store = SqliteRecipientStore::connect(&dsn, "sendlist").await.unwrap();
        store.record_send_failure(1, "421 try later").await.unwrap();
        let stuck = store.stuck().await.unwrap();
        assert_eq!(stuck[0].error.as_deref(), Some("421 try later"));

        // Opening again finds the column in place.
        SqliteRecipientStore::connect(&dsn, "sendlist").await.unwrap();
    }

    #[tokio::test]
    async fn upsert_updates_existing_row() {
        let store = store().await;
        let id = store.insert(Some("Ann"), None, Some("ann@example.com")).await.unwrap();

        store
            .upsert_address_event("ann@example.com", EventKind::Fail, at(3))
            .await
            .unwrap();

        let status = store.status(id).await.unwrap().unwrap();
        assert_eq!(status.failed_at, Some(at(3)));
        assert_eq!(status.unsubscribed_at, None);
        assert!(!status.is_pending());
    }

    #[tokio::test]
    async fn upsert_inserts_unknown_address() {
        let store = store().await;
        store
            .upsert_address_event("stranger@example.com", EventKind::Unsubscribe, at(4))
            .await
            .unwrap();

        let rows = store.status_by_email("stranger@example.com").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].unsubscribed_at, Some(at(4)));
        assert_eq!(rows[0].recipient.first_name, None);
        assert!(store.select_pending().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn upsert_is_idempotent_and_keeps_latest() {
        let store = store().await;
        let first = at(5);
        let later = first + Duration::hours(2);

        store
            .upsert_address_event("x@example.com", EventKind::Fail, first)
            .await
            .unwrap();
        store
            .upsert_address_event("x@example.com", EventKind::Fail, later)
            .await
            .unwrap();

        let rows = store.status_by_email("x@example.com").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].failed_at, Some(later));
    }

    #[tokio::test]
    async fn address_match_is_exact() {
        let store = store().await;
        store.insert(None, None, Some("Ann@Example.com")).await.unwrap();
        store
            .upsert_address_event("ann@example.com", EventKind::Fail, at(6))
            .await
            .unwrap();

        let original = store.status_by_email("Ann@Example.com").await.unwrap();
        assert!(original[0].is_pending());
        assert_eq!(store.status_by_email("ann@example.com").await.unwrap().len(), 1);
    }
}
