use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::types::RDKafkaErrorCode;
use rdkafka::util::Timeout;
use rdkafka::{Offset, TopicPartitionList};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::transport::{
    Connector, InboundMessage, MessageReader, MessageWriter, TopicConfig, Transport,
    TransportError,
};

// ============================================================================
// Kafka Transport (rdkafka)
// ============================================================================
//
// - Readers are StreamConsumers with manual offset commits: a record is only
//   acknowledged after its outcome has been routed. Commits are async and
//   flushes run on the blocking pool so neither stalls the runtime.
// - Both writers share one FutureProducer.
// - connect() checks topic metadata for all three topics before returning.
//
// ============================================================================

#[derive(Clone, Debug)]
pub struct KafkaConnector {
    brokers: String,
    metadata_timeout: Duration,
    send_timeout: Duration,
}

impl KafkaConnector {
    pub fn new(brokers: impl Into<String>) -> Self {
        Self {
            brokers: brokers.into(),
            metadata_timeout: Duration::from_secs(10),
            send_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_metadata_timeout(mut self, timeout: Duration) -> Self {
        self.metadata_timeout = timeout;
        self
    }

    fn create_consumer(&self, topic: &str, group_id: &str) -> Result<StreamConsumer, TransportError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &self.brokers)
            .set("group.id", group_id)
            // Offset management
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            // Session management
            .set("session.timeout.ms", "30000")
            .set("heartbeat.interval.ms", "3000")
            .set("max.poll.interval.ms", "300000")
            .create()
            .map_err(|e| TransportError::Connect(format!("consumer for {topic}: {e}")))?;

        consumer
            .subscribe(&[topic])
            .map_err(|e| TransportError::TopicUnavailable {
                topic: topic.to_string(),
                reason: e.to_string(),
            })?;

        tracing::info!(topic = %topic, group_id = %group_id, "Kafka consumer subscribed");
        Ok(consumer)
    }

    fn create_producer(&self) -> Result<FutureProducer, TransportError> {
        ClientConfig::new()
            .set("bootstrap.servers", &self.brokers)
            .set("message.timeout.ms", "5000")
            .set("acks", "all")
            .create()
            .map_err(|e| TransportError::Connect(format!("producer: {e}")))
    }

    /// Fetch metadata for `topic` and make sure the broker knows it.
    async fn check_topic(&self, producer: &FutureProducer, topic: &str) -> Result<(), TransportError> {
        let producer = producer.clone();
        let name = topic.to_string();
        let timeout = self.metadata_timeout;

        // fetch_metadata blocks the calling thread
        let metadata = tokio::task::spawn_blocking(move || {
            producer.client().fetch_metadata(Some(name.as_str()), timeout)
        })
        .await
        .map_err(|e| TransportError::Connect(format!("metadata lookup panicked: {e}")))?
        .map_err(|e| {
            if is_transient(&e) {
                TransportError::Connect(e.to_string())
            } else {
                TransportError::TopicUnavailable {
                    topic: topic.to_string(),
                    reason: e.to_string(),
                }
            }
        })?;

        let found = metadata.topics().iter().find(|t| t.name() == topic);
        match found {
            Some(t) if t.error().is_none() && !t.partitions().is_empty() => {
                tracing::debug!(topic = %topic, partitions = t.partitions().len(), "Topic reachable");
                Ok(())
            }
            Some(t) => Err(TransportError::TopicUnavailable {
                topic: topic.to_string(),
                reason: format!("metadata error: {:?}", t.error()),
            }),
            None => Err(TransportError::TopicUnavailable {
                topic: topic.to_string(),
                reason: "topic missing from metadata".to_string(),
            }),
        }
    }
}

#[async_trait]
impl Connector for KafkaConnector {
    async fn connect(&self, topics: &TopicConfig) -> Result<Transport, TransportError> {
        tracing::info!(brokers = %self.brokers, "Connecting to Kafka");

        let producer = self.create_producer()?;
        for topic in topics.all_topics() {
            self.check_topic(&producer, topic).await?;
        }

        let order_reader = KafkaReader::new(
            self.create_consumer(&topics.order_topic, &topics.order_group)?,
            &topics.order_topic,
        );
        let retry_reader = KafkaReader::new(
            self.create_consumer(&topics.retry_topic, &topics.retry_group)?,
            &topics.retry_topic,
        );
        let retry_writer = KafkaWriter::new(producer.clone(), &topics.retry_topic, self.send_timeout);
        let dlq_writer = KafkaWriter::new(producer, &topics.dlq_topic, self.send_timeout);

        tracing::info!("✅ Kafka transport connected");

        Ok(Transport {
            order_reader: Box::new(order_reader),
            retry_reader: Box::new(retry_reader),
            retry_writer: Box::new(retry_writer),
            dlq_writer: Box::new(dlq_writer),
        })
    }
}

/// Connection-level failures librdkafka reports while the broker is away.
fn is_transient(error: &KafkaError) -> bool {
    matches!(
        error.rdkafka_error_code(),
        Some(
            RDKafkaErrorCode::BrokerTransportFailure
                | RDKafkaErrorCode::AllBrokersDown
                | RDKafkaErrorCode::Resolve
                | RDKafkaErrorCode::NetworkException
                | RDKafkaErrorCode::BrokerNotAvailable
                | RDKafkaErrorCode::RequestTimedOut
                | RDKafkaErrorCode::OperationTimedOut
        )
    )
}

// ============================================================================
// Reader
// ============================================================================

pub struct KafkaReader {
    consumer: StreamConsumer,
    topic: String,
}

impl KafkaReader {
    fn new(consumer: StreamConsumer, topic: &str) -> Self {
        Self {
            consumer,
            topic: topic.to_string(),
        }
    }
}

#[async_trait]
impl MessageReader for KafkaReader {
    async fn recv(&self, cancel: &CancellationToken) -> Result<InboundMessage, TransportError> {
        let message = tokio::select! {
            _ = cancel.cancelled() => return Err(TransportError::Cancelled),
            received = self.consumer.recv() => received.map_err(|e| TransportError::Receive {
                topic: self.topic.clone(),
                transient: is_transient(&e),
                reason: e.to_string(),
            })?,
        };

        Ok(InboundMessage {
            topic: message.topic().to_string(),
            partition: message.partition(),
            offset: message.offset(),
            key: message.key().map(<[u8]>::to_vec),
            payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
        })
    }

    async fn commit(&self, msg: &InboundMessage) -> Result<(), TransportError> {
        let commit_error = |reason: String| TransportError::Commit {
            topic: msg.topic.clone(),
            partition: msg.partition,
            offset: msg.offset,
            reason,
        };

        // Committed offset is the next one to read
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(&msg.topic, msg.partition, Offset::Offset(msg.offset + 1))
            .map_err(|e| commit_error(e.to_string()))?;

        // Async mode only enqueues the commit, so a stalled broker cannot
        // block the runtime thread shared with the other loop
        self.consumer
            .commit(&tpl, CommitMode::Async)
            .map_err(|e| commit_error(e.to_string()))
    }

    async fn close(&self) -> Result<(), TransportError> {
        // The consumer leaves its group when dropped; unsubscribing stops fetches now
        self.consumer.unsubscribe();
        tracing::debug!(topic = %self.topic, "Kafka reader closed");
        Ok(())
    }
}

// ============================================================================
// Writer
// ============================================================================

pub struct KafkaWriter {
    producer: FutureProducer,
    topic: String,
    timeout: Duration,
}

impl KafkaWriter {
    fn new(producer: FutureProducer, topic: &str, timeout: Duration) -> Self {
        Self {
            producer,
            topic: topic.to_string(),
            timeout,
        }
    }
}

#[async_trait]
impl MessageWriter for KafkaWriter {
    fn topic(&self) -> &str {
        &self.topic
    }

    async fn send(&self, key: Option<&[u8]>, payload: &[u8]) -> Result<(), TransportError> {
        let mut record = FutureRecord::<[u8], [u8]>::to(&self.topic).payload(payload);
        if let Some(key) = key {
            record = record.key(key);
        }

        self.producer
            .send(record, Timeout::After(self.timeout))
            .await
            .map(|_| ())
            .map_err(|(e, _)| TransportError::Produce {
                topic: self.topic.clone(),
                transient: is_transient(&e),
                reason: e.to_string(),
            })
    }

    async fn close(&self) -> Result<(), TransportError> {
        let producer = self.producer.clone();
        let timeout = self.timeout;
        let close_error = |reason: String| TransportError::Close {
            name: format!("{} writer", self.topic),
            reason,
        };

        // flush blocks until queued records are delivered or the timeout hits
        tokio::task::spawn_blocking(move || producer.flush(Timeout::After(timeout)))
            .await
            .map_err(|e| close_error(format!("flush panicked: {e}")))?
            .map_err(|e| close_error(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    // Nothing listens on port 1, so queued records stay undelivered.
    const UNREACHABLE: &str = "127.0.0.1:1";

    #[tokio::test(flavor = "current_thread")]
    async fn test_writer_close_does_not_stall_runtime() {
        let connector = KafkaConnector::new(UNREACHABLE);
        let producer = connector.create_producer().unwrap();
        let writer = KafkaWriter::new(producer.clone(), "orders", Duration::from_millis(300));

        let record = FutureRecord::<[u8], [u8]>::to("orders").payload(b"queued".as_slice());
        let _pending = match producer.send_result(record) {
            Ok(delivery) => delivery,
            Err((e, _)) => panic!("enqueue failed: {e}"),
        };

        let ticks = Arc::new(AtomicUsize::new(0));
        let ticker = tokio::spawn({
            let ticks = ticks.clone();
            async move {
                loop {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    ticks.fetch_add(1, Ordering::SeqCst);
                }
            }
        });

        let result = writer.close().await;
        ticker.abort();

        // the flush times out with the record still queued, while the single
        // runtime thread kept driving the ticker
        assert!(matches!(result, Err(TransportError::Close { .. })));
        assert!(ticks.load(Ordering::SeqCst) > 0);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_writer_close_with_empty_queue() {
        let connector = KafkaConnector::new(UNREACHABLE);
        let producer = connector.create_producer().unwrap();
        let writer = KafkaWriter::new(producer, "orders-dlq", Duration::from_millis(300));

        assert!(writer.close().await.is_ok());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_connect_fails_when_metadata_unavailable() {
        let connector =
            KafkaConnector::new(UNREACHABLE).with_metadata_timeout(Duration::from_millis(300));

        let topics = TopicConfig {
            order_topic: "orders".to_string(),
            order_group: "orders-group".to_string(),
            retry_topic: "orders-retry".to_string(),
            retry_group: "orders-retry-group".to_string(),
            dlq_topic: "orders-dlq".to_string(),
        };

        let result = connector.connect(&topics).await;

        assert!(result.is_err());
    }
}
