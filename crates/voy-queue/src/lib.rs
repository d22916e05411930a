// SPDX-License-Identifier: MIT OR Apache-2.0
//! voy-queue
//!
//! The durable-queue seam of the ingestion pipeline: a [`MessageQueue`]
//! trait with an in-memory FIFO implementation, the worker cycle that
//! drives one stage per message, and DLQ replay.
//!
//! Delivery is at-least-once: the worker acknowledges the original message
//! unconditionally and makes retries explicit requeues, relying on the
//! idempotency store for exactly-once effects.

#![deny(unsafe_code)]

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;
use voy_contract::ingestion::IngestionEvent;
use voy_error::{ErrorKind, VoyError};

// ---------------------------------------------------------------------------
// MessageQueue
// ---------------------------------------------------------------------------

/// One received message: an opaque receipt handle plus the raw body.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueMessage {
    /// Receipt handle for acknowledgement.
    pub handle: String,
    /// Raw message body (JSON).
    pub body: String,
}

/// A durable queue of raw message bodies.
///
/// The contract mirrors SQS-style queues: `receive_one` leases a message,
/// `acknowledge` deletes it, and an unacknowledged message becomes visible
/// again (how soon is backend-specific).
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Lease the next message, or `None` when the queue is empty.
    async fn receive_one(&self) -> Result<Option<QueueMessage>, VoyError>;

    /// Append a message body.
    async fn send(&self, body: String) -> Result<(), VoyError>;

    /// Delete a leased message.
    async fn acknowledge(&self, handle: &str) -> Result<(), VoyError>;

    /// Number of visible (not leased) messages.
    async fn visible_len(&self) -> usize;
}

/// In-memory FIFO queue with lease semantics; the local stand-in for the
/// durable backend.
#[derive(Debug, Default)]
pub struct InMemoryQueue {
    inner: Mutex<InMemoryInner>,
}

#[derive(Debug, Default)]
struct InMemoryInner {
    visible: VecDeque<QueueMessage>,
    leased: HashMap<String, QueueMessage>,
}

impl InMemoryQueue {
    /// New empty queue.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageQueue for InMemoryQueue {
    async fn receive_one(&self) -> Result<Option<QueueMessage>, VoyError> {
        let mut inner = self.inner.lock().expect("queue lock poisoned");
        let Some(message) = inner.visible.pop_front() else {
            return Ok(None);
        };
        inner.leased.insert(message.handle.clone(), message.clone());
        Ok(Some(message))
    }

    async fn send(&self, body: String) -> Result<(), VoyError> {
        let mut inner = self.inner.lock().expect("queue lock poisoned");
        inner.visible.push_back(QueueMessage {
            handle: Uuid::new_v4().to_string(),
            body,
        });
        Ok(())
    }

    async fn acknowledge(&self, handle: &str) -> Result<(), VoyError> {
        let mut inner = self.inner.lock().expect("queue lock poisoned");
        if inner.leased.remove(handle).is_none() {
            return Err(VoyError::new(
                ErrorKind::QueueFailure,
                format!("unknown receipt handle: {handle}"),
            ));
        }
        Ok(())
    }

    async fn visible_len(&self) -> usize {
        self.inner.lock().expect("queue lock poisoned").visible.len()
    }
}

// ---------------------------------------------------------------------------
// Stage dispatch
// ---------------------------------------------------------------------------

/// What one stage handler did with an event.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome {
    /// Work done; enqueue this successor event.
    Advanced(IngestionEvent),
    /// Nothing left to do: terminal stage finished, or the idempotency
    /// guard suppressed a duplicate delivery.
    Completed,
    /// Attempted work failed; the worker retries or dead-letters.
    Failed(String),
}

/// Routes an event to the stage handler matching its `stage` field.
#[async_trait]
pub trait StageDispatcher: Send + Sync {
    /// Run exactly one stage for this event.
    async fn dispatch(&self, event: &IngestionEvent) -> StageOutcome;
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

/// The queue worker: pulls messages, runs one stage each, and routes the
/// result to the input queue, the DLQ, or nowhere.
pub struct Worker<D> {
    input: std::sync::Arc<dyn MessageQueue>,
    dlq: std::sync::Arc<dyn MessageQueue>,
    dispatcher: D,
}

impl<D: StageDispatcher> Worker<D> {
    /// New worker over the given queues and dispatcher.
    pub fn new(
        input: std::sync::Arc<dyn MessageQueue>,
        dlq: std::sync::Arc<dyn MessageQueue>,
        dispatcher: D,
    ) -> Self {
        Self {
            input,
            dlq,
            dispatcher,
        }
    }

    /// Receive and process one message.
    ///
    /// Returns `Ok(true)` when a message was processed, `Ok(false)` when the
    /// queue was empty. The original message is acknowledged regardless of
    /// the stage outcome; retries are explicit requeues carrying an
    /// incremented `retry_count` and the failure reason.
    pub async fn process_one(&self) -> Result<bool, VoyError> {
        let Some(message) = self.input.receive_one().await? else {
            return Ok(false);
        };

        match serde_json::from_str::<IngestionEvent>(&message.body) {
            Err(err) => {
                // Undecodable bodies can never succeed; dead-letter directly.
                warn!(target: "voy::worker", error = %err, "undecodable message moved to DLQ");
                self.dlq.send(message.body.clone()).await?;
            }
            Ok(event) => {
                info!(
                    target: "voy::worker",
                    content_source_id = %event.content_source_id,
                    stage = %event.stage,
                    "processing"
                );
                match self.dispatcher.dispatch(&event).await {
                    StageOutcome::Advanced(next) => {
                        let body = serde_json::to_string(&next).map_err(|err| {
                            VoyError::new(ErrorKind::QueueFailure, err.to_string())
                        })?;
                        self.input.send(body).await?;
                    }
                    StageOutcome::Completed => {}
                    StageOutcome::Failed(reason) => {
                        let mut failed = event.clone();
                        failed.retry_count += 1;
                        failed.error = Some(reason);
                        let body = serde_json::to_string(&failed).map_err(|err| {
                            VoyError::new(ErrorKind::QueueFailure, err.to_string())
                        })?;
                        if failed.retry_count < failed.max_retries {
                            self.input.send(body).await?;
                        } else {
                            warn!(
                                target: "voy::worker",
                                content_source_id = %failed.content_source_id,
                                retry_count = failed.retry_count,
                                "retries exhausted, moving to DLQ"
                            );
                            self.dlq.send(body).await?;
                        }
                    }
                }
            }
        }

        self.input.acknowledge(&message.handle).await?;
        Ok(true)
    }

    /// Poll until interrupted, sleeping briefly when the queue is idle.
    pub async fn run(&self, idle_sleep: std::time::Duration) -> Result<(), VoyError> {
        loop {
            match self.process_one().await {
                Ok(true) => {}
                Ok(false) => tokio::time::sleep(idle_sleep).await,
                Err(err) => {
                    warn!(target: "voy::worker", error = %err, "worker cycle failed");
                    tokio::time::sleep(idle_sleep).await;
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Replay
// ---------------------------------------------------------------------------

/// Drain the DLQ back into the input queue in FIFO order; returns how many
/// messages moved.
pub async fn replay_dlq(
    dlq: &dyn MessageQueue,
    input: &dyn MessageQueue,
) -> Result<usize, VoyError> {
    let mut moved = 0;
    while let Some(message) = dlq.receive_one().await? {
        input.send(message.body.clone()).await?;
        dlq.acknowledge(&message.handle).await?;
        moved += 1;
    }
    Ok(moved)
}
