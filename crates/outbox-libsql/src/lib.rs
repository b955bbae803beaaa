//! Durable outbox storage on an embedded [libsql](https://github.com/tursodatabase/libsql)
//! database file.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;

pub use error::Error;

use std::fmt::Debug;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use courier_outbox::{OutboxMessage, OutboxStore};
use libsql::{Builder, Connection, Row, Value};
use tracing::debug;
use uuid::Uuid;

static CREATE_OUTBOX_TABLE_SQL: &str = include_str!("../sql/create_outbox_table.sql");
static CREATE_OUTBOX_INDEX_SQL: &str = include_str!("../sql/create_outbox_index.sql");
static INSERT_OUTBOX_MESSAGE_SQL: &str = include_str!("../sql/insert_outbox_message.sql");
static MARK_OUTBOX_MESSAGE_PROCESSED_SQL: &str =
    include_str!("../sql/mark_outbox_message_processed.sql");
static SELECT_OUTBOX_MESSAGE_SQL: &str = include_str!("../sql/select_outbox_message.sql");
static SELECT_UNPROCESSED_OUTBOX_MESSAGES_SQL: &str =
    include_str!("../sql/select_unprocessed_outbox_messages.sql");

/// Outbox store backed by a local libsql database.
///
/// Timestamps are stored as microseconds since the Unix epoch, so anything
/// finer is truncated on insert.
#[derive(Clone)]
pub struct LibsqlOutboxStore {
    connection: Connection,
}

impl Debug for LibsqlOutboxStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibsqlOutboxStore").finish()
    }
}

impl LibsqlOutboxStore {
    /// Opens (creating if needed) the database at `path` and ensures the
    /// outbox table exists. `:memory:` opens a private in-memory database.
    ///
    /// # Errors
    ///
    /// This function will return an error if the database cannot be opened
    /// or the schema cannot be created.
    pub async fn connect(path: impl AsRef<Path> + Send) -> Result<Self, Error> {
        let connection = Builder::new_local(path).build().await?.connect()?;

        connection.execute(CREATE_OUTBOX_TABLE_SQL, ()).await?;
        connection.execute(CREATE_OUTBOX_INDEX_SQL, ()).await?;

        Ok(Self { connection })
    }

    fn message_from_row(row: &Row) -> Result<OutboxMessage, Error> {
        let id = text(row, 0)?;
        let id = Uuid::parse_str(&id)
            .map_err(|e| Error::InvalidRow(format!("bad id `{id}`: {e}")))?;

        let created_at_utc = timestamp(integer(row, 4)?)?;
        let processed_at_utc = match row.get_value(5)? {
            Value::Null => None,
            Value::Integer(micros) => Some(timestamp(micros)?),
            _ => return Err(Error::InvalidRow("processed_at_utc is not an integer".into())),
        };

        Ok(OutboxMessage::from_parts(
            id,
            text(row, 1)?,
            text(row, 2)?,
            text(row, 3)?,
            created_at_utc,
            processed_at_utc,
        ))
    }
}

fn text(row: &Row, index: i32) -> Result<String, Error> {
    match row.get_value(index)? {
        Value::Text(s) => Ok(s),
        _ => Err(Error::InvalidRow(format!("column {index} is not text"))),
    }
}

fn integer(row: &Row, index: i32) -> Result<i64, Error> {
    match row.get_value(index)? {
        Value::Integer(i) => Ok(i),
        _ => Err(Error::InvalidRow(format!("column {index} is not an integer"))),
    }
}

fn timestamp(micros: i64) -> Result<DateTime<Utc>, Error> {
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| Error::InvalidRow(format!("timestamp {micros} out of range")))
}

#[async_trait]
impl OutboxStore for LibsqlOutboxStore {
    type Error = Error;

    async fn insert(&self, message: OutboxMessage) -> Result<(), Self::Error> {
        let params = vec![
            Value::Text(message.id().to_string()),
            Value::Text(message.subscription().to_string()),
            Value::Text(message.message_type().to_string()),
            Value::Text(message.payload().to_string()),
            Value::Integer(message.created_at_utc().timestamp_micros()),
            message
                .processed_at_utc()
                .map_or(Value::Null, |at| Value::Integer(at.timestamp_micros())),
        ];

        let inserted = self
            .connection
            .execute(INSERT_OUTBOX_MESSAGE_SQL, params)
            .await?;

        if inserted == 0 {
            return Err(Error::DuplicateId(message.id()));
        }

        debug!(message_id = %message.id(), "outbox message stored");

        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<OutboxMessage>, Self::Error> {
        let mut rows = self
            .connection
            .query(SELECT_OUTBOX_MESSAGE_SQL, vec![Value::Text(id.to_string())])
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::message_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn fetch_unprocessed(&self, limit: usize) -> Result<Vec<OutboxMessage>, Self::Error> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let mut rows = self
            .connection
            .query(
                SELECT_UNPROCESSED_OUTBOX_MESSAGES_SQL,
                vec![Value::Integer(limit)],
            )
            .await?;

        let mut messages = Vec::new();
        while let Some(row) = rows.next().await? {
            messages.push(Self::message_from_row(&row)?);
        }

        Ok(messages)
    }

    async fn mark_processed(
        &self,
        id: Uuid,
        processed_at_utc: DateTime<Utc>,
    ) -> Result<bool, Self::Error> {
        let changed = self
            .connection
            .execute(
                MARK_OUTBOX_MESSAGE_PROCESSED_SQL,
                vec![
                    Value::Text(id.to_string()),
                    Value::Integer(processed_at_utc.timestamp_micros()),
                ],
            )
            .await?;

        Ok(changed > 0)
    }
}
