use std::str::FromStr;

use chrono::{DateTime, Utc};
use courier_core::{
    courier::Journal,
    identity::Identity,
    message::{Message, MessageId, MessageStatus},
    registry::{Authorization, KeyEnvelope},
};
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DBError {
    #[error("db failure: {0}")]
    Query(#[from] sqlx::Error),
    #[error("unreadable row in db: {0}")]
    BadRow(String),
}

/// Sqlite-backed journal. Authorizations are upserted by `(user, sender)`;
/// sqlite keeps a row's rowid across upserts, so replaying rows in rowid
/// order reproduces each user's original grant order.
pub struct DBJournal {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct AuthorizationRow {
    user: String,
    sender: String,
    oracle: String,
    is_authorized: i64,
    message_count: i64,
    encrypted_data: String,
    encrypted_symmetric_key: String,
    iv: String,
}

impl AuthorizationRow {
    fn into_record(self) -> (Identity, Authorization) {
        (
            self.user.into(),
            Authorization {
                sender: self.sender.into(),
                oracle: self.oracle.into(),
                is_authorized: self.is_authorized != 0,
                message_count: self.message_count as u64,
                key_envelope: KeyEnvelope {
                    encrypted_data: self.encrypted_data,
                    encrypted_symmetric_key: self.encrypted_symmetric_key,
                    iv: self.iv,
                },
            },
        )
    }
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: i64,
    sender: String,
    recipient: String,
    subject: String,
    body: String,
    status: String,
    sent_at: String,
}

impl MessageRow {
    fn into_message(self) -> Result<Message, DBError> {
        let status = MessageStatus::from_str(&self.status)
            .map_err(|error| DBError::BadRow(error.to_string()))?;
        let sent_at = DateTime::parse_from_rfc3339(&self.sent_at)
            .map_err(|error| DBError::BadRow(error.to_string()))?
            .with_timezone(&Utc);

        Ok(Message {
            id: MessageId(self.id as u64),
            sender: self.sender.into(),
            recipient: self.recipient.into(),
            subject: self.subject,
            body: self.body,
            status,
            sent_at,
        })
    }
}

impl DBJournal {
    pub async fn new(db_url: &str) -> Result<Self, DBError> {
        let options = SqliteConnectOptions::from_str(db_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS authorizations (
                user TEXT NOT NULL,
                sender TEXT NOT NULL,
                oracle TEXT NOT NULL,
                is_authorized INTEGER NOT NULL,
                message_count INTEGER NOT NULL,
                encrypted_data TEXT NOT NULL,
                encrypted_symmetric_key TEXT NOT NULL,
                iv TEXT NOT NULL,
                UNIQUE(user, sender)
            )",
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY,
                sender TEXT NOT NULL,
                recipient TEXT NOT NULL,
                subject TEXT NOT NULL,
                body TEXT NOT NULL,
                status TEXT NOT NULL,
                sent_at TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }

    /// Reload both tables for `Courier::restore`.
    pub async fn restore(
        &self,
    ) -> Result<(Vec<(Identity, Authorization)>, Vec<Message>), DBError> {
        let authorization_rows: Vec<AuthorizationRow> =
            sqlx::query_as("SELECT * FROM authorizations ORDER BY rowid")
                .fetch_all(&self.pool)
                .await?;

        let message_rows: Vec<MessageRow> = sqlx::query_as("SELECT * FROM messages ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        let records = authorization_rows
            .into_iter()
            .map(|row| row.into_record())
            .collect();
        let messages = message_rows
            .into_iter()
            .map(|row| row.into_message())
            .collect::<Result<_, _>>()?;

        Ok((records, messages))
    }
}

impl Journal for DBJournal {
    type Error = DBError;

    async fn record_authorization(
        &mut self,
        user: &Identity,
        authorization: &Authorization,
    ) -> Result<(), DBError> {
        sqlx::query(
            "INSERT INTO authorizations
                 (user, sender, oracle, is_authorized, message_count,
                  encrypted_data, encrypted_symmetric_key, iv)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(user, sender) DO UPDATE SET
                 oracle = excluded.oracle,
                 is_authorized = excluded.is_authorized,
                 message_count = excluded.message_count,
                 encrypted_data = excluded.encrypted_data,
                 encrypted_symmetric_key = excluded.encrypted_symmetric_key,
                 iv = excluded.iv",
        )
        .bind(user.as_str())
        .bind(authorization.sender.as_str())
        .bind(authorization.oracle.as_str())
        .bind(authorization.is_authorized)
        .bind(authorization.message_count as i64)
        .bind(&authorization.key_envelope.encrypted_data)
        .bind(&authorization.key_envelope.encrypted_symmetric_key)
        .bind(&authorization.key_envelope.iv)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn record_messages(&mut self, messages: &[Message]) -> Result<(), DBError> {
        let mut tx = self.pool.begin().await?;

        for message in messages {
            sqlx::query(
                "INSERT INTO messages (id, sender, recipient, subject, body, status, sent_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(message.id.0 as i64)
            .bind(message.sender.as_str())
            .bind(message.recipient.as_str())
            .bind(&message.subject)
            .bind(&message.body)
            .bind(message.status.as_str())
            .bind(message.sent_at.to_rfc3339())
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                "UPDATE authorizations SET message_count = message_count + 1
                 WHERE user = ? AND sender = ?",
            )
            .bind(message.recipient.as_str())
            .bind(message.sender.as_str())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn record_delivery(&mut self, id: MessageId) -> Result<(), DBError> {
        sqlx::query("UPDATE messages SET status = ? WHERE id = ?")
            .bind(MessageStatus::Delivered.as_str())
            .bind(id.0 as i64)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
