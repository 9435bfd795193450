//! Recording broker producer.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)]

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use tradew_inventory_core::{EventPublisher, MessageId, OutboundEvent, PublishError};

/// [`EventPublisher`] that keeps every envelope it acknowledges.
///
/// Acknowledgments look like a single-partition Kafka topic:
/// `"{topic}/0/{offset}"`, offsets counting from 0 across all topics.
///
/// # Example
///
/// ```
/// use tradew_inventory_testing::RecordingPublisher;
/// use tradew_inventory_core::PublishError;
///
/// let publisher = RecordingPublisher::new();
/// publisher.fail_next(PublishError::ConnectionFailed("broker down".into()));
/// assert!(publisher.is_empty());
/// ```
#[derive(Clone, Debug, Default)]
pub struct RecordingPublisher {
    published: Arc<Mutex<Vec<(String, OutboundEvent)>>>,
    failures: Arc<Mutex<VecDeque<PublishError>>>,
    next_offset: Arc<AtomicI64>,
}

impl RecordingPublisher {
    /// Create a publisher with no recorded events.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a failure for the next publish call.
    pub fn fail_next(&self, error: PublishError) {
        self.failures.lock().unwrap().push_back(error);
    }

    /// Every acknowledged `(topic, envelope)`, in publish order.
    #[must_use]
    pub fn published(&self) -> Vec<(String, OutboundEvent)> {
        self.published.lock().unwrap().clone()
    }

    /// Envelopes acknowledged on `topic`, in publish order.
    #[must_use]
    pub fn events_on(&self, topic: &str) -> Vec<OutboundEvent> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, event)| event.clone())
            .collect()
    }

    /// Number of acknowledged envelopes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.published.lock().unwrap().len()
    }

    /// Whether nothing was acknowledged yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.published.lock().unwrap().is_empty()
    }
}

impl EventPublisher for RecordingPublisher {
    fn publish<'a>(
        &'a self,
        topic: &'a str,
        event: &'a OutboundEvent,
    ) -> Pin<Box<dyn Future<Output = Result<MessageId, PublishError>> + Send + 'a>> {
        Box::pin(async move {
            if let Some(error) = self.failures.lock().unwrap().pop_front() {
                return Err(error);
            }

            let offset = self.next_offset.fetch_add(1, Ordering::SeqCst);
            self.published
                .lock()
                .unwrap()
                .push((topic.to_string(), event.clone()));
            Ok(MessageId::from_offset(topic, 0, offset))
        })
    }
}
