use chrono::{DateTime, Utc};
use courier_messaging::Message;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Errors from turning an [`OutboxMessage`] back into a typed message.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The row was recorded for a different message type.
    #[error("outbox message holds `{found}`, not `{expected}`")]
    TypeMismatch {
        /// The type the caller asked for.
        expected: &'static str,
        /// The type recorded on the row.
        found: String,
    },

    /// The payload is not a valid encoding of the requested type.
    #[error(transparent)]
    Deserialize(#[from] serde_json::Error),
}

/// A message awaiting (or past) delivery, as recorded in the outbox.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
pub struct OutboxMessage {
    id: Uuid,
    subscription: String,
    message_type: String,
    payload: String,
    created_at_utc: DateTime<Utc>,
    processed_at_utc: Option<DateTime<Utc>>,
}

impl OutboxMessage {
    /// Records `message` for later delivery to `subscription`.
    ///
    /// # Errors
    ///
    /// Returns an error if the message cannot be serialized.
    pub fn new<T>(subscription: impl Into<String>, message: &T) -> Result<Self, serde_json::Error>
    where
        T: Message,
    {
        Ok(Self {
            id: Uuid::new_v4(),
            subscription: subscription.into(),
            message_type: T::type_name().to_string(),
            payload: message.to_json()?,
            created_at_utc: Utc::now(),
            processed_at_utc: None,
        })
    }

    /// Rebuilds a row read back from storage.
    #[must_use]
    pub fn from_parts(
        id: Uuid,
        subscription: String,
        message_type: String,
        payload: String,
        created_at_utc: DateTime<Utc>,
        processed_at_utc: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id,
            subscription,
            message_type,
            payload,
            created_at_utc,
            processed_at_utc,
        }
    }

    /// Unique identifier of the row.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Subscription the message is destined for.
    #[must_use]
    pub fn subscription(&self) -> &str {
        &self.subscription
    }

    /// Fully-qualified name of the recorded message type.
    #[must_use]
    pub fn message_type(&self) -> &str {
        &self.message_type
    }

    /// JSON text of the recorded message.
    #[must_use]
    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// When the message was recorded.
    #[must_use]
    pub const fn created_at_utc(&self) -> DateTime<Utc> {
        self.created_at_utc
    }

    /// When the message was handed to the broker, if it has been.
    #[must_use]
    pub const fn processed_at_utc(&self) -> Option<DateTime<Utc>> {
        self.processed_at_utc
    }

    /// Whether the message has been handed to the broker.
    #[must_use]
    pub const fn is_processed(&self) -> bool {
        self.processed_at_utc.is_some()
    }

    /// Sets the processed timestamp unless one is already set.
    ///
    /// Returns whether the row changed.
    pub fn mark_processed(&mut self, processed_at_utc: DateTime<Utc>) -> bool {
        if self.processed_at_utc.is_some() {
            return false;
        }

        self.processed_at_utc = Some(processed_at_utc);
        true
    }

    /// Re-materialises the recorded message as a `T`.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::TypeMismatch`] if the row was recorded for a
    /// different type, or [`DecodeError::Deserialize`] if the payload does not
    /// parse.
    pub fn decode<T>(&self) -> Result<T, DecodeError>
    where
        T: Message,
    {
        if self.message_type != T::type_name() {
            return Err(DecodeError::TypeMismatch {
                expected: T::type_name(),
                found: self.message_type.clone(),
            });
        }

        Ok(T::from_json(&self.payload)?)
    }
}
