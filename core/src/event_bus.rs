//! Broker producer contract.
//!
//! Dispatch workers hand one [`OutboundEvent`] per run to an [`EventPublisher`]
//! and only flip item statuses once the broker acknowledged it. Delivery is
//! therefore at-least-once; consumers deduplicate on the idempotency key.
//!
//! # Implementations
//!
//! - `RedpandaPublisher` (in `tradew-inventory-redpanda`): production (Kafka-compatible)
//! - `RecordingPublisher` (in `tradew-inventory-testing`): captures envelopes for assertions

use crate::event::OutboundEvent;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur while publishing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PublishError {
    /// The broker rejected or failed to acknowledge the record.
    #[error("Publish failed for topic '{topic}': {reason}")]
    PublishFailed {
        /// The topic that failed
        topic: String,
        /// The reason for failure
        reason: String,
    },

    /// Failed to connect to the broker
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The envelope could not be turned into a record
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// No acknowledgment within the producer timeout
    #[error("Publish timed out for topic '{0}'")]
    Timeout(String),
}

/// Broker acknowledgment of a published record.
///
/// For Kafka-compatible brokers this is `"{topic}/{partition}/{offset}"`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MessageId(String);

impl MessageId {
    /// Wrap a broker-specific acknowledgment.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Acknowledgment of a Kafka-compatible broker.
    #[must_use]
    pub fn from_offset(topic: &str, partition: i32, offset: i64) -> Self {
        Self(format!("{topic}/{partition}/{offset}"))
    }

    /// Get the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Producer side of the message broker.
///
/// # Dyn Compatibility
///
/// Returns `Pin<Box<dyn Future>>` so workers can hold an `Arc<dyn EventPublisher>`.
pub trait EventPublisher: Send + Sync {
    /// Publish one envelope to `topic` and wait for the acknowledgment.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError`] if the broker didn't acknowledge the record.
    fn publish<'a>(
        &'a self,
        topic: &'a str,
        event: &'a OutboundEvent,
    ) -> Pin<Box<dyn Future<Output = Result<MessageId, PublishError>> + Send + 'a>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kafka_message_ids() {
        let id = MessageId::from_offset("items-created", 2, 41);
        assert_eq!(id.as_str(), "items-created/2/41");
    }
}
