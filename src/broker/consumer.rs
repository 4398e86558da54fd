use async_trait::async_trait;
use serde::Deserialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tokio::sync::{watch, OnceCell};
use tokio_util::sync::CancellationToken;

use super::processor::{MessageHandler, ProcessResult};
use super::retry::RetryPolicy;
use crate::messaging::{
    CloseErrors, Connector, InboundMessage, MessageReader, TopicConfig, Transport, TransportError,
};
use crate::metrics::Metrics;

/// Transport-facing side of the pipeline as seen by the broker.
#[async_trait]
pub trait Consumer: Send + Sync {
    /// Connect to every topic. Must succeed before any read.
    async fn init(&self) -> Result<(), TransportError>;

    /// Resolves once `init` has completed.
    async fn ready(&self);

    /// Read, process and route one order-topic message.
    async fn read_order_msg(&self, cancel: &CancellationToken) -> Result<(), TransportError>;

    /// Read one retry-topic message and process it under the retry policy.
    async fn read_retry_msg(&self, cancel: &CancellationToken) -> Result<(), TransportError>;

    async fn shutdown(&self) -> Result<(), CloseErrors>;
}

// ============================================================================
// Stream Consumer
// ============================================================================
//
// Order path:  recv -> process once -> commit | retry topic | DLQ
// Retry path:  recv -> process under RetryPolicy -> commit | DLQ
//
// A message is committed only after it has been routed. If routing fails the
// message is parked in a per-path redelivery slot and handed out again before
// the reader is asked for anything new, so message N+1 is never read (and its
// offset never committed) while message N is still unrouted.
//
// ============================================================================

pub struct StreamConsumer {
    connector: Arc<dyn Connector>,
    topics: TopicConfig,
    handler: Arc<dyn MessageHandler>,
    retry_policy: RetryPolicy,
    transport: OnceCell<Transport>,
    ready: watch::Sender<bool>,
    order_redelivery: Mutex<Option<InboundMessage>>,
    retry_redelivery: Mutex<Option<InboundMessage>>,
    metrics: Option<Arc<Metrics>>,
}

impl StreamConsumer {
    pub fn new(
        connector: Arc<dyn Connector>,
        topics: TopicConfig,
        handler: Arc<dyn MessageHandler>,
        retry_policy: RetryPolicy,
    ) -> Self {
        let (ready, _) = watch::channel(false);
        Self {
            connector,
            topics,
            handler,
            retry_policy,
            transport: OnceCell::new(),
            ready,
            order_redelivery: Mutex::new(None),
            retry_redelivery: Mutex::new(None),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn transport(&self) -> Result<&Transport, TransportError> {
        self.transport.get().ok_or(TransportError::NotInitialized)
    }

    fn lock(slot: &Mutex<Option<InboundMessage>>) -> MutexGuard<'_, Option<InboundMessage>> {
        slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The parked unrouted message if there is one, otherwise the next record.
    async fn next_message(
        reader: &dyn MessageReader,
        slot: &Mutex<Option<InboundMessage>>,
        cancel: &CancellationToken,
    ) -> Result<InboundMessage, TransportError> {
        let parked = Self::lock(slot).take();
        match parked {
            Some(msg) => {
                tracing::info!(topic = %msg.topic, offset = msg.offset, "Redelivering unrouted message");
                Ok(msg)
            }
            None => reader.recv(cancel).await,
        }
    }

    async fn send_to_dlq(&self, transport: &Transport, msg: &InboundMessage) -> Result<(), TransportError> {
        transport
            .dlq_writer
            .send(msg.key.as_deref(), &msg.payload)
            .await?;

        if let Some(metrics) = &self.metrics {
            metrics.record_dlq_message(&msg.topic);
        }
        tracing::warn!(
            topic = %msg.topic,
            offset = msg.offset,
            order_uid = %order_uid_of(&msg.payload),
            dlq_topic = %transport.dlq_writer.topic(),
            "Message sent to dead-letter topic"
        );
        Ok(())
    }

    async fn send_to_retry(&self, transport: &Transport, msg: &InboundMessage) -> Result<(), TransportError> {
        transport
            .retry_writer
            .send(msg.key.as_deref(), &msg.payload)
            .await?;

        if let Some(metrics) = &self.metrics {
            metrics.record_retry_topic_write();
        }
        tracing::info!(
            topic = %msg.topic,
            offset = msg.offset,
            order_uid = %order_uid_of(&msg.payload),
            retry_topic = %transport.retry_writer.topic(),
            "Message sent to retry topic"
        );
        Ok(())
    }

    /// Commit after a successful route, or park the message for redelivery.
    async fn settle(
        &self,
        reader: &dyn MessageReader,
        slot: &Mutex<Option<InboundMessage>>,
        msg: InboundMessage,
        routed: Result<(), TransportError>,
        outcome: ProcessResult,
        started: Instant,
    ) -> Result<(), TransportError> {
        if let Err(e) = routed {
            tracing::error!(
                topic = %msg.topic,
                offset = msg.offset,
                outcome = %outcome,
                error = %e,
                "Failed to route message, holding it for redelivery"
            );
            *Self::lock(slot) = Some(msg);
            return Err(e);
        }

        reader.commit(&msg).await?;

        if let Some(metrics) = &self.metrics {
            metrics.record_message(&msg.topic, outcome.as_str(), started.elapsed().as_secs_f64());
        }
        Ok(())
    }
}

#[async_trait]
impl Consumer for StreamConsumer {
    async fn init(&self) -> Result<(), TransportError> {
        tracing::info!(
            order_topic = %self.topics.order_topic,
            retry_topic = %self.topics.retry_topic,
            dlq_topic = %self.topics.dlq_topic,
            "Connecting stream consumer"
        );

        self.transport
            .get_or_try_init(|| self.connector.connect(&self.topics))
            .await?;

        self.ready.send_replace(true);
        tracing::info!("Stream consumer ready");
        Ok(())
    }

    async fn ready(&self) {
        let mut rx = self.ready.subscribe();
        // The sender lives as long as self, so this only returns once ready
        let _ = rx.wait_for(|ready| *ready).await;
    }

    async fn read_order_msg(&self, cancel: &CancellationToken) -> Result<(), TransportError> {
        let transport = self.transport()?;
        let msg =
            Self::next_message(&*transport.order_reader, &self.order_redelivery, cancel).await?;
        let started = Instant::now();

        if msg.payload.is_empty() {
            tracing::warn!(topic = %msg.topic, offset = msg.offset, "Skipping empty message");
            return transport.order_reader.commit(&msg).await;
        }

        let outcome = self.handler.process(&msg.payload).await;
        let routed = match outcome {
            ProcessResult::Success => Ok(()),
            ProcessResult::Retry => self.send_to_retry(transport, &msg).await,
            ProcessResult::DeadLetter => self.send_to_dlq(transport, &msg).await,
        };

        self.settle(&*transport.order_reader, &self.order_redelivery, msg, routed, outcome, started)
            .await
    }

    async fn read_retry_msg(&self, cancel: &CancellationToken) -> Result<(), TransportError> {
        let transport = self.transport()?;
        let msg =
            Self::next_message(&*transport.retry_reader, &self.retry_redelivery, cancel).await?;
        let started = Instant::now();

        let outcome = self
            .retry_policy
            .execute(cancel, |attempt| {
                if let Some(metrics) = &self.metrics {
                    metrics.record_retry_attempt();
                }
                tracing::debug!(offset = msg.offset, attempt = attempt, "Processing retry message");
                self.handler.process(&msg.payload)
            })
            .await;

        let routed = match outcome {
            ProcessResult::Success => Ok(()),
            ProcessResult::DeadLetter => self.send_to_dlq(transport, &msg).await,
            ProcessResult::Retry if cancel.is_cancelled() => {
                // Interrupted mid-retry: leave it uncommitted for the next run
                tracing::info!(offset = msg.offset, "Retry interrupted by shutdown");
                *Self::lock(&self.retry_redelivery) = Some(msg);
                return Err(TransportError::Cancelled);
            }
            ProcessResult::Retry => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_retry_exhausted();
                }
                tracing::error!(
                    offset = msg.offset,
                    order_uid = %order_uid_of(&msg.payload),
                    max_attempts = self.retry_policy.max_attempts,
                    "Retries exhausted"
                );
                self.send_to_dlq(transport, &msg).await
            }
        };

        // Exhaustion is reported as dead_letter, which is where the message went
        let final_outcome = match outcome {
            ProcessResult::Retry => ProcessResult::DeadLetter,
            other => other,
        };
        self.settle(&*transport.retry_reader, &self.retry_redelivery, msg, routed, final_outcome, started)
            .await
    }

    async fn shutdown(&self) -> Result<(), CloseErrors> {
        self.ready.send_replace(false);
        match self.transport.get() {
            Some(transport) => {
                tracing::info!("Closing stream transport");
                transport.close().await
            }
            None => Ok(()),
        }
    }
}

#[derive(Deserialize)]
struct UidPeek {
    #[serde(default)]
    order_uid: String,
}

/// Best-effort order uid for log lines.
fn order_uid_of(payload: &[u8]) -> String {
    serde_json::from_slice::<UidPeek>(payload)
        .map(|peek| peek.order_uid)
        .unwrap_or_else(|_| "<undecodable>".to_string())
}
