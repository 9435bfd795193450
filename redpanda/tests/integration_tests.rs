//! Integration tests for [`RedpandaPublisher`] with a real Kafka instance.
//!
//! These tests use testcontainers to spin up Kafka and validate:
//! - Acknowledgments map to `topic/partition/offset`
//! - Record key, payload and headers as consumers see them
//! - Re-publishing a batch lands on the same partition
//!
//! # Running These Tests
//!
//! These tests are marked as `#[ignore]` by default because they need Docker
//! and take 15-60 seconds to spin up Kafka:
//!
//! ```bash
//! cargo test -p tradew-inventory-redpanda --test integration_tests -- --ignored
//! ```

#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use rdkafka::Message;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Headers;
use std::time::Duration;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::kafka::{KAFKA_PORT, Kafka};
use tradew_inventory_core::{EventPublisher, OutboundEvent, Utc};
use tradew_inventory_redpanda::RedpandaPublisher;

fn test_event(key: &str, correlation_id: Option<&str>) -> OutboundEvent {
    OutboundEvent {
        event_type: "ItemsUpdated.v1".to_string(),
        idempotency_key: key.to_string(),
        correlation_id: correlation_id.map(ToString::to_string),
        occurred_at: Utc::now(),
        payload: br#"{"items":[]}"#.to_vec(),
    }
}

/// Start Kafka and return the container (to keep it alive) and its brokers.
async fn start_kafka() -> (ContainerAsync<Kafka>, String) {
    let kafka = Kafka::default()
        .with_env_var("KAFKA_AUTO_CREATE_TOPICS_ENABLE", "true")
        .start()
        .await
        .expect("Failed to start Kafka container");

    let host = kafka.get_host().await.expect("Failed to get host");
    let port = kafka
        .get_host_port_ipv4(KAFKA_PORT)
        .await
        .expect("Failed to get port");
    (kafka, format!("{host}:{port}"))
}

/// Publish warmup events until the broker acknowledges one.
async fn wait_for_kafka_ready(publisher: &RedpandaPublisher, topic: &str) {
    let warmup = test_event("warmup", None);
    for attempt in 1..=60 {
        if publisher.publish(topic, &warmup).await.is_ok() {
            // Give topic metadata time to propagate
            tokio::time::sleep(Duration::from_millis(500)).await;
            return;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(attempt != 60, "Kafka failed to become ready");
    }
}

fn consumer(brokers: &str, topic: &str) -> StreamConsumer {
    let consumer: StreamConsumer = ClientConfig::new()
        .set("bootstrap.servers", brokers)
        .set("group.id", format!("inventory-test-{topic}"))
        .set("auto.offset.reset", "earliest")
        .set("enable.partition.eof", "false")
        .create()
        .expect("Failed to create consumer");
    consumer
        .subscribe(&[topic])
        .expect("Failed to subscribe");
    consumer
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_publish_returns_broker_offsets() {
    let (_kafka, brokers) = start_kafka().await;
    let publisher = RedpandaPublisher::builder()
        .brokers(&brokers)
        .producer_acks("all")
        .build()
        .expect("Failed to create publisher");
    wait_for_kafka_ready(&publisher, "items-updated").await;

    let first = publisher
        .publish("items-updated", &test_event("key-1", None))
        .await
        .expect("Failed to publish");
    let second = publisher
        .publish("items-updated", &test_event("key-1", None))
        .await
        .expect("Failed to publish");

    let parse = |id: &str| -> (String, i32, i64) {
        let mut parts = id.split('/');
        let topic = parts.next().expect("topic").to_string();
        let partition = parts.next().expect("partition").parse().expect("number");
        let offset = parts.next().expect("offset").parse().expect("number");
        (topic, partition, offset)
    };
    let (topic, first_partition, first_offset) = parse(first.as_str());
    let (_, second_partition, second_offset) = parse(second.as_str());

    assert_eq!(topic, "items-updated");
    assert_eq!(first_partition, second_partition, "same key, same partition");
    assert!(second_offset > first_offset);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_records_carry_key_payload_and_headers() {
    let (_kafka, brokers) = start_kafka().await;
    let publisher = RedpandaPublisher::new(&brokers).expect("Failed to create publisher");
    wait_for_kafka_ready(&publisher, "items-created").await;

    let event = test_event("batch-key", Some("run-42"));
    publisher
        .publish("items-created", &event)
        .await
        .expect("Failed to publish");

    let consumer = consumer(&brokers, "items-created");
    let received = tokio::time::timeout(Duration::from_secs(30), async {
        loop {
            let message = consumer.recv().await.expect("Failed to receive");
            if message.key() == Some(b"batch-key".as_slice()) {
                return message.detach();
            }
        }
    })
    .await
    .expect("Timeout waiting for the record");

    assert_eq!(received.payload(), Some(event.payload.as_slice()));

    let headers = received.headers().expect("record should carry headers");
    let pairs: Vec<(String, Vec<u8>)> = headers
        .iter()
        .map(|h| (h.key.to_string(), h.value.unwrap_or_default().to_vec()))
        .collect();
    assert_eq!(
        pairs,
        vec![
            ("event_type".to_string(), b"ItemsUpdated.v1".to_vec()),
            ("idempotency_key".to_string(), b"batch-key".to_vec()),
            ("correlation_id".to_string(), b"run-42".to_vec()),
        ]
    );
}
