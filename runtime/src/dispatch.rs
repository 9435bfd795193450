//! Outbox dispatch workers.
//!
//! A [`DispatchWorker`] drains one pending status. Each run:
//!
//! 1. loads every item in the kind's pending status (nothing to do if none)
//! 2. builds one envelope for the whole batch
//! 3. publishes it and waits for the broker acknowledgment
//! 4. flips the items to `Available` with a single version-checked `update_bulk`
//!
//! Items are only flipped after the acknowledgment, so a crash or a failed
//! flip leads to a re-publish with the same idempotency key, never to a lost
//! event.

use crate::context::{DeadlineExceeded, RequestContext};
use crate::metrics::DispatchMetrics;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tradew_inventory_core::environment::Clock;
use tradew_inventory_core::{
    DispatchKind, EventError, EventPublisher, ItemStatus, ItemStore, MessageId, PublishError,
    StoreError,
};

/// Errors of a single dispatch run.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// Loading pending items failed; nothing was published.
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    /// The envelope could not be built; nothing was published.
    #[error("Failed to build event: {0}")]
    Payload(#[from] EventError),

    /// The broker did not acknowledge the event; nothing was mutated.
    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),

    /// The event was acknowledged but the items stayed pending.
    ///
    /// The next run re-publishes the same batch with the same idempotency key.
    #[error("Event {message_id} published but items not marked available: {source}")]
    StatusFlip {
        /// Broker acknowledgment of the already-published event
        message_id: MessageId,
        /// Why the status update failed
        #[source]
        source: StatusFlipCause,
    },

    /// The run's deadline passed before publishing.
    #[error("Deadline exceeded")]
    DeadlineExceeded,
}

/// Why a post-publish status update did not take effect.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StatusFlipCause {
    /// The store rejected the update (version conflict or outage).
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The run's deadline passed before the update finished.
    #[error("Deadline exceeded")]
    DeadlineExceeded,
}

impl StatusFlipCause {
    /// Whether the items changed under the worker between read and flip.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Store(StoreError::Conflict { .. }))
    }
}

impl From<DeadlineExceeded> for StatusFlipCause {
    fn from(_: DeadlineExceeded) -> Self {
        Self::DeadlineExceeded
    }
}

impl From<DeadlineExceeded> for DispatchError {
    fn from(_: DeadlineExceeded) -> Self {
        Self::DeadlineExceeded
    }
}

/// Outcome of a successful run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DispatchReport {
    /// Kind of the worker that ran
    pub kind: DispatchKind,
    /// Items announced and flipped
    pub item_count: usize,
    /// Broker acknowledgment, `None` when there was nothing to publish
    pub message_id: Option<MessageId>,
}

/// Drains one pending status onto one topic.
pub struct DispatchWorker {
    kind: DispatchKind,
    topic: String,
    store: Arc<dyn ItemStore>,
    publisher: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
}

impl DispatchWorker {
    /// Create a worker for `kind` publishing to `topic`.
    #[must_use]
    pub fn new(
        kind: DispatchKind,
        topic: impl Into<String>,
        store: Arc<dyn ItemStore>,
        publisher: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            kind,
            topic: topic.into(),
            store,
            publisher,
            clock,
        }
    }

    /// The kind this worker drains.
    #[must_use]
    pub const fn kind(&self) -> DispatchKind {
        self.kind
    }

    /// The topic this worker publishes to.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Run one dispatch cycle.
    ///
    /// # Errors
    ///
    /// See [`DispatchError`]; only `StatusFlip` happens after a publish.
    pub async fn run_once(&self, ctx: &RequestContext) -> Result<DispatchReport, DispatchError> {
        let started = std::time::Instant::now();
        let result = self.dispatch(ctx).await;
        DispatchMetrics::record_run(self.kind, started.elapsed());
        result
    }

    #[tracing::instrument(
        skip_all,
        name = "dispatch_run",
        fields(
            kind = %self.kind,
            topic = %self.topic,
            correlation_id = %ctx.correlation_id(),
        )
    )]
    async fn dispatch(&self, ctx: &RequestContext) -> Result<DispatchReport, DispatchError> {
        let mut items = ctx
            .run(self.store.get_by_status(self.kind.pending_status()))
            .await??;

        if items.is_empty() {
            tracing::trace!("No pending items");
            return Ok(DispatchReport {
                kind: self.kind,
                item_count: 0,
                message_id: None,
            });
        }

        let event = self.kind.build_event(
            &items,
            self.clock.now(),
            Some(ctx.correlation_id().to_string()),
        )?;

        let message_id = match ctx.run(self.publisher.publish(&self.topic, &event)).await? {
            Ok(message_id) => message_id,
            Err(e) => {
                DispatchMetrics::record_publish_error(self.kind);
                tracing::error!(
                    event_type = %event.event_type,
                    item_count = items.len(),
                    error = %e,
                    "Failed to publish event"
                );
                return Err(e.into());
            }
        };
        DispatchMetrics::record_published(self.kind);

        let item_count = items.len();
        let now = self.clock.now();
        for item in &mut items {
            item.update_status(ItemStatus::Available, now);
        }

        let flipped: Result<(), StatusFlipCause> =
            match ctx.run(self.store.update_bulk(items)).await {
                Ok(result) => result.map_err(StatusFlipCause::from),
                Err(deadline) => Err(deadline.into()),
            };
        if let Err(source) = flipped {
            DispatchMetrics::record_status_flip_error(self.kind);
            tracing::warn!(
                message_id = %message_id,
                idempotency_key = %event.idempotency_key,
                item_count,
                error = %source,
                "Event published but items not marked available; it will be published again"
            );
            return Err(DispatchError::StatusFlip { message_id, source });
        }

        tracing::info!(
            message_id = %message_id,
            event_type = %event.event_type,
            item_count,
            "Dispatched pending items"
        );

        Ok(DispatchReport {
            kind: self.kind,
            item_count,
            message_id: Some(message_id),
        })
    }

    /// Run every `interval` until `shutdown` becomes `true` (or its sender drops).
    ///
    /// Each run gets a fresh [`RequestContext`] bounded by `run_timeout`. Errors
    /// are logged and never stop the loop; a run in progress finishes before
    /// shutdown is observed.
    pub async fn run_periodic(
        &self,
        interval: Duration,
        run_timeout: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            kind = %self.kind,
            topic = %self.topic,
            interval_ms = interval.as_millis(),
            "Starting dispatch worker"
        );

        while !*shutdown.borrow() {
            tokio::select! {
                _ = ticker.tick() => {
                    let ctx = RequestContext::new().with_timeout(run_timeout);
                    if let Err(e) = self.run_once(&ctx).await {
                        tracing::error!(
                            kind = %self.kind,
                            correlation_id = %ctx.correlation_id(),
                            error = %e,
                            "Dispatch run failed"
                        );
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!(kind = %self.kind, "Dispatch worker stopped");
    }
}
