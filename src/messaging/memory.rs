use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use super::transport::{
    Connector, InboundMessage, MessageReader, MessageWriter, TopicConfig, Transport,
    TransportError,
};

// ============================================================================
// In-Process Broker
// ============================================================================
//
// A minimal single-partition topic store with the same read/commit
// semantics as the Kafka transport. Each topic has one consumer group.
// Used to run the full pipeline in tests without a Kafka cluster.
//
// ============================================================================

#[derive(Clone, Default)]
pub struct MemoryBroker {
    inner: Arc<BrokerState>,
}

#[derive(Default)]
struct BrokerState {
    topics: Mutex<HashMap<String, TopicLog>>,
    notify: Notify,
}

#[derive(Default)]
struct TopicLog {
    records: Vec<InboundMessage>,
    pending: VecDeque<InboundMessage>,
    committed: Vec<i64>,
    failing_writes: u32,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Broker with the three pipeline topics already created.
    pub fn with_topics(topics: &TopicConfig) -> Self {
        let broker = Self::new();
        for topic in topics.all_topics() {
            broker.create_topic(topic);
        }
        broker
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, TopicLog>> {
        self.inner
            .topics
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn create_topic(&self, topic: &str) {
        self.lock().entry(topic.to_string()).or_default();
    }

    pub fn has_topic(&self, topic: &str) -> bool {
        self.lock().contains_key(topic)
    }

    /// Append a record and wake any waiting reader. Returns its offset.
    pub fn publish(
        &self,
        topic: &str,
        key: Option<&[u8]>,
        payload: &[u8],
    ) -> Result<i64, TransportError> {
        let offset = {
            let mut topics = self.lock();
            let log = topics
                .get_mut(topic)
                .ok_or_else(|| TransportError::TopicUnavailable {
                    topic: topic.to_string(),
                    reason: "unknown topic".to_string(),
                })?;

            if log.failing_writes > 0 {
                log.failing_writes -= 1;
                return Err(TransportError::Produce {
                    topic: topic.to_string(),
                    reason: "injected connection reset".to_string(),
                    transient: true,
                });
            }

            let offset = log.records.len() as i64;
            let record = InboundMessage {
                topic: topic.to_string(),
                partition: 0,
                offset,
                key: key.map(<[u8]>::to_vec),
                payload: payload.to_vec(),
            };
            log.records.push(record.clone());
            log.pending.push_back(record);
            offset
        };

        self.inner.notify.notify_waiters();
        Ok(offset)
    }

    /// Every record ever written to `topic`, in offset order.
    pub fn messages(&self, topic: &str) -> Vec<InboundMessage> {
        self.lock()
            .get(topic)
            .map(|log| log.records.clone())
            .unwrap_or_default()
    }

    /// Offsets acknowledged on `topic`, in commit order.
    pub fn committed(&self, topic: &str) -> Vec<i64> {
        self.lock()
            .get(topic)
            .map(|log| log.committed.clone())
            .unwrap_or_default()
    }

    /// Records written but not yet handed to a reader.
    pub fn pending(&self, topic: &str) -> usize {
        self.lock().get(topic).map_or(0, |log| log.pending.len())
    }

    /// Make the next `n` writes to `topic` fail with a transient error.
    pub fn fail_next_writes(&self, topic: &str, n: u32) {
        if let Some(log) = self.lock().get_mut(topic) {
            log.failing_writes = n;
        }
    }

    fn pop(&self, topic: &str) -> Result<Option<InboundMessage>, TransportError> {
        let mut topics = self.lock();
        let log = topics.get_mut(topic).ok_or_else(|| TransportError::Receive {
            topic: topic.to_string(),
            reason: "unknown topic".to_string(),
            transient: false,
        })?;
        Ok(log.pending.pop_front())
    }
}

// ============================================================================
// Connector / Reader / Writer
// ============================================================================

#[derive(Clone)]
pub struct MemoryConnector {
    broker: MemoryBroker,
}

impl MemoryConnector {
    pub fn new(broker: MemoryBroker) -> Self {
        Self { broker }
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, topics: &TopicConfig) -> Result<Transport, TransportError> {
        for topic in topics.all_topics() {
            if !self.broker.has_topic(topic) {
                return Err(TransportError::TopicUnavailable {
                    topic: topic.to_string(),
                    reason: "unknown topic".to_string(),
                });
            }
        }

        let reader = |topic: &str| MemoryReader {
            broker: self.broker.clone(),
            topic: topic.to_string(),
        };
        let writer = |topic: &str| MemoryWriter {
            broker: self.broker.clone(),
            topic: topic.to_string(),
        };

        Ok(Transport {
            order_reader: Box::new(reader(&topics.order_topic)),
            retry_reader: Box::new(reader(&topics.retry_topic)),
            retry_writer: Box::new(writer(&topics.retry_topic)),
            dlq_writer: Box::new(writer(&topics.dlq_topic)),
        })
    }
}

pub struct MemoryReader {
    broker: MemoryBroker,
    topic: String,
}

#[async_trait]
impl MessageReader for MemoryReader {
    async fn recv(&self, cancel: &CancellationToken) -> Result<InboundMessage, TransportError> {
        loop {
            // Register interest before checking so a concurrent publish is not missed
            let notified = self.broker.inner.notify.notified();

            if let Some(message) = self.broker.pop(&self.topic)? {
                return Ok(message);
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(TransportError::Cancelled),
                _ = notified => {}
            }
        }
    }

    async fn commit(&self, msg: &InboundMessage) -> Result<(), TransportError> {
        let mut topics = self.broker.lock();
        let log = topics.get_mut(&msg.topic).ok_or_else(|| TransportError::Commit {
            topic: msg.topic.clone(),
            partition: msg.partition,
            offset: msg.offset,
            reason: "unknown topic".to_string(),
        })?;
        log.committed.push(msg.offset);
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

pub struct MemoryWriter {
    broker: MemoryBroker,
    topic: String,
}

#[async_trait]
impl MessageWriter for MemoryWriter {
    fn topic(&self) -> &str {
        &self.topic
    }

    async fn send(&self, key: Option<&[u8]>, payload: &[u8]) -> Result<(), TransportError> {
        self.broker.publish(&self.topic, key, payload).map(|_| ())
    }

    async fn close(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn topics() -> TopicConfig {
        TopicConfig {
            order_topic: "orders".to_string(),
            order_group: "g".to_string(),
            retry_topic: "orders-retry".to_string(),
            retry_group: "g-retry".to_string(),
            dlq_topic: "orders-dlq".to_string(),
        }
    }

    #[tokio::test]
    async fn test_connect_fails_for_missing_topic() {
        let broker = MemoryBroker::new();
        broker.create_topic("orders");
        broker.create_topic("orders-retry");

        let result = MemoryConnector::new(broker).connect(&topics()).await;
        assert!(matches!(
            result,
            Err(TransportError::TopicUnavailable { ref topic, .. }) if topic == "orders-dlq"
        ));
    }

    #[tokio::test]
    async fn test_recv_waits_for_publish() {
        let broker = MemoryBroker::with_topics(&topics());
        let transport = MemoryConnector::new(broker.clone()).connect(&topics()).await.unwrap();
        let cancel = CancellationToken::new();

        let publisher = broker.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            publisher.publish("orders", Some(b"k"), b"payload").unwrap();
        });

        let msg = transport.order_reader.recv(&cancel).await.unwrap();
        assert_eq!(msg.payload, b"payload");
        assert_eq!(msg.key.as_deref(), Some(&b"k"[..]));
        assert_eq!(msg.offset, 0);
    }

    #[tokio::test]
    async fn test_recv_returns_on_cancel() {
        let broker = MemoryBroker::with_topics(&topics());
        let transport = MemoryConnector::new(broker).connect(&topics()).await.unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = transport.retry_reader.recv(&cancel).await;
        assert!(matches!(result, Err(TransportError::Cancelled)));
    }

    #[tokio::test]
    async fn test_commit_is_recorded_in_order() {
        let broker = MemoryBroker::with_topics(&topics());
        let transport = MemoryConnector::new(broker.clone()).connect(&topics()).await.unwrap();
        let cancel = CancellationToken::new();
        broker.publish("orders", None, b"first").unwrap();
        broker.publish("orders", None, b"second").unwrap();

        let first = transport.order_reader.recv(&cancel).await.unwrap();
        transport.order_reader.commit(&first).await.unwrap();

        assert_eq!(first.payload, b"first");
        assert_eq!(broker.committed("orders"), vec![0]);
        assert_eq!(broker.pending("orders"), 1);
    }

    #[tokio::test]
    async fn test_injected_write_failure_is_transient() {
        let broker = MemoryBroker::with_topics(&topics());
        let transport = MemoryConnector::new(broker.clone()).connect(&topics()).await.unwrap();
        broker.fail_next_writes("orders-dlq", 1);

        let err = transport.dlq_writer.send(None, b"x").await.unwrap_err();
        assert!(err.is_transient());
        transport.dlq_writer.send(None, b"x").await.unwrap();
        assert_eq!(broker.messages("orders-dlq").len(), 1);
    }
}
