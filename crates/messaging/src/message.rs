use std::fmt::Debug;

use serde::Serialize;
use serde::de::DeserializeOwned;

/// A domain event or command that can cross a service boundary.
///
/// Messages travel as JSON. The type name is recorded alongside outboxed
/// copies so the same type can be chosen again when the copy is replayed, so
/// implementors that get renamed or moved should pin `type_name` explicitly.
pub trait Message: Clone + Debug + DeserializeOwned + Serialize + Send + Sync + 'static {
    /// Fully-qualified name of the message type.
    #[must_use]
    fn type_name() -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Unqualified name of the message type, without generic arguments.
    #[must_use]
    fn short_name() -> &'static str {
        let full = Self::type_name();
        let base = full.split('<').next().unwrap_or(full);
        base.rsplit("::").next().unwrap_or(base)
    }

    /// Serializes the message to its JSON text form.
    ///
    /// # Errors
    ///
    /// Returns an error if the message cannot be represented as JSON.
    fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parses a message from its JSON text form.
    ///
    /// # Errors
    ///
    /// Returns an error if `payload` is not a valid encoding of `Self`.
    fn from_json(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }
}

/// Derives the subscription identifier for messages of type `T`.
///
/// The identifier is `{prefix}_{ShortName}`, or just `ShortName` when the
/// prefix is empty. Publishers and the handler registry both use this so
/// they agree on the channel without configuration.
#[must_use]
pub fn subscription_id<T: Message>(prefix: &str) -> String {
    if prefix.is_empty() {
        T::short_name().to_string()
    } else {
        format!("{prefix}_{}", T::short_name())
    }
}
