//! Redpanda event publisher for the Tradew inventory outbox.
//!
//! This crate provides the production [`EventPublisher`] used by the dispatch
//! workers. It uses rdkafka, so any Kafka-compatible broker works (Redpanda,
//! Apache Kafka, MSK, ...).
//!
//! # Record layout
//!
//! | Record part | Content                                         |
//! |-------------|-------------------------------------------------|
//! | key         | envelope idempotency key                        |
//! | payload     | JSON event payload                              |
//! | headers     | `event_type`, `idempotency_key`, `correlation_id` |
//! | timestamp   | `occurred_at` in milliseconds                   |
//!
//! Keying by the idempotency key keeps a re-published batch on the same
//! partition as its first delivery, so consumers deduplicate locally.
//!
//! # Delivery Semantics
//!
//! **At-least-once**: [`EventPublisher::publish`] resolves only once the broker
//! acknowledged the record. The workers mark items available afterwards; a
//! crash in between re-publishes the same batch with the same key.
//!
//! # Example
//!
//! ```no_run
//! use tradew_inventory_redpanda::RedpandaPublisher;
//! use std::time::Duration;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let publisher = RedpandaPublisher::builder()
//!     .brokers("localhost:9092")
//!     .producer_acks("all")
//!     .compression("lz4")
//!     .timeout(Duration::from_secs(5))
//!     .build()?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use rdkafka::config::ClientConfig;
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tradew_inventory_core::{EventPublisher, MessageId, OutboundEvent, PublishError};

/// Record header carrying [`OutboundEvent::event_type`].
pub const EVENT_TYPE_HEADER: &str = "event_type";
/// Record header carrying [`OutboundEvent::idempotency_key`].
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency_key";
/// Record header carrying [`OutboundEvent::correlation_id`], when present.
pub const CORRELATION_ID_HEADER: &str = "correlation_id";

/// Redpanda-backed [`EventPublisher`].
///
/// Wraps a single rdkafka [`FutureProducer`], which batches and is safe to
/// share between every dispatch worker of the process.
pub struct RedpandaPublisher {
    producer: FutureProducer,
    brokers: String,
    timeout: Duration,
}

impl RedpandaPublisher {
    /// Create a publisher with default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::ConnectionFailed`] if the producer can't be created.
    pub fn new(brokers: &str) -> Result<Self, PublishError> {
        Self::builder().brokers(brokers).build()
    }

    /// Create a new builder for configuring the publisher.
    #[must_use]
    pub fn builder() -> RedpandaPublisherBuilder {
        RedpandaPublisherBuilder::default()
    }

    /// Get a reference to the brokers string.
    #[must_use]
    pub fn brokers(&self) -> &str {
        &self.brokers
    }
}

/// Builder for configuring a [`RedpandaPublisher`].
#[derive(Default)]
pub struct RedpandaPublisherBuilder {
    brokers: Option<String>,
    producer_acks: Option<String>,
    compression: Option<String>,
    timeout: Option<Duration>,
}

impl RedpandaPublisherBuilder {
    /// Set the broker addresses.
    ///
    /// # Parameters
    ///
    /// - `brokers`: Comma-separated list of broker addresses (e.g., "localhost:9092")
    #[must_use]
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// Set the producer acknowledgment mode.
    ///
    /// # Parameters
    ///
    /// - `acks`: "0" (no acks), "1" (leader ack), "all" (all replicas ack)
    ///
    /// Default: "all"
    #[must_use]
    pub fn producer_acks(mut self, acks: impl Into<String>) -> Self {
        self.producer_acks = Some(acks.into());
        self
    }

    /// Set the compression codec.
    ///
    /// # Parameters
    ///
    /// - `compression`: "none", "gzip", "snappy", "lz4", "zstd"
    ///
    /// Default: "none"
    #[must_use]
    pub fn compression(mut self, compression: impl Into<String>) -> Self {
        self.compression = Some(compression.into());
        self
    }

    /// Set the delivery timeout (local queueing plus broker acknowledgment).
    ///
    /// Default: 5 seconds
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the [`RedpandaPublisher`].
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::ConnectionFailed`] if:
    /// - Brokers not set
    /// - Cannot create producer
    /// - Invalid configuration
    pub fn build(self) -> Result<RedpandaPublisher, PublishError> {
        let brokers = self
            .brokers
            .filter(|brokers| !brokers.trim().is_empty())
            .ok_or_else(|| PublishError::ConnectionFailed("Brokers not configured".to_string()))?;
        let timeout = self.timeout.unwrap_or(Duration::from_secs(5));
        let acks = self.producer_acks.as_deref().unwrap_or("all");
        let compression = self.compression.as_deref().unwrap_or("none");

        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &brokers)
            .set("message.timeout.ms", timeout.as_millis().to_string())
            .set("acks", acks)
            .set("compression.type", compression)
            .create()
            .map_err(|e| {
                PublishError::ConnectionFailed(format!("Failed to create producer: {e}"))
            })?;

        tracing::info!(
            brokers = %brokers,
            acks,
            compression,
            timeout_ms = timeout.as_millis(),
            "RedpandaPublisher created"
        );

        Ok(RedpandaPublisher {
            producer,
            brokers,
            timeout,
        })
    }
}

impl EventPublisher for RedpandaPublisher {
    fn publish<'a>(
        &'a self,
        topic: &'a str,
        event: &'a OutboundEvent,
    ) -> Pin<Box<dyn Future<Output = Result<MessageId, PublishError>> + Send + 'a>> {
        Box::pin(async move {
            let record = FutureRecord::to(topic)
                .key(event.idempotency_key.as_str())
                .payload(event.payload.as_slice())
                .headers(event_headers(event))
                .timestamp(event.occurred_at.timestamp_millis());

            match self.producer.send(record, Timeout::After(self.timeout)).await {
                Ok((partition, offset)) => {
                    tracing::debug!(
                        topic,
                        partition,
                        offset,
                        event_type = %event.event_type,
                        idempotency_key = %event.idempotency_key,
                        "Event published"
                    );
                    Ok(MessageId::from_offset(topic, partition, offset))
                }
                Err((kafka_error, _)) => {
                    tracing::error!(
                        topic,
                        event_type = %event.event_type,
                        error = %kafka_error,
                        "Failed to publish event"
                    );
                    Err(classify(topic, &kafka_error))
                }
            }
        })
    }
}

/// Headers attached to every record.
fn event_headers(event: &OutboundEvent) -> OwnedHeaders {
    let headers = OwnedHeaders::new()
        .insert(Header {
            key: EVENT_TYPE_HEADER,
            value: Some(event.event_type.as_str()),
        })
        .insert(Header {
            key: IDEMPOTENCY_KEY_HEADER,
            value: Some(event.idempotency_key.as_str()),
        });

    match event.correlation_id.as_deref() {
        Some(correlation_id) => headers.insert(Header {
            key: CORRELATION_ID_HEADER,
            value: Some(correlation_id),
        }),
        None => headers,
    }
}

fn classify(topic: &str, error: &KafkaError) -> PublishError {
    match error {
        KafkaError::MessageProduction(RDKafkaErrorCode::MessageTimedOut) => {
            PublishError::Timeout(format!("No acknowledgment from {topic}: {error}"))
        }
        KafkaError::MessageProduction(
            RDKafkaErrorCode::AllBrokersDown | RDKafkaErrorCode::BrokerTransportFailure,
        ) => PublishError::ConnectionFailed(error.to_string()),
        _ => PublishError::PublishFailed {
            topic: topic.to_string(),
            reason: error.to_string(),
        },
    }
}
