//! Shared wire schemas for the `TaskDeck` client.
//!
//! Every body exchanged with the task API or pushed by the event broker has
//! an explicit type here. Payloads that do not match their schema are
//! rejected with [`DecodeError`] at the boundary.

pub mod api;
pub mod events;
pub mod model;
pub mod packet;

/// Error returned when a payload does not match its schema.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The JSON value could not be mapped onto the expected type.
    #[error("{context} payload did not match schema: {source}")]
    Schema {
        /// What was being decoded (event name or endpoint).
        context: String,
        /// Underlying serde error.
        source: serde_json::Error,
    },

    /// The event name is not one this client understands.
    #[error("unknown event: {0}")]
    UnknownEvent(String),
}

impl DecodeError {
    /// Wraps a serde error with the name of the payload being decoded.
    #[must_use]
    pub fn schema(context: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Schema {
            context: context.into(),
            source,
        }
    }
}
