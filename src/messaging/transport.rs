use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Stream Transport Abstractions
// ============================================================================
//
// The stream consumer only talks to these traits. Kafka (rdkafka) and an
// in-process broker implement them.
//
// Payloads are opaque bytes: messages move between topics unmodified.
//
// ============================================================================

/// One record read from a topic, detached from the client that read it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    pub payload: Vec<u8>,
}

/// Topic names and consumer groups used by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicConfig {
    pub order_topic: String,
    pub order_group: String,
    pub retry_topic: String,
    pub retry_group: String,
    pub dlq_topic: String,
}

impl TopicConfig {
    pub fn all_topics(&self) -> [&str; 3] {
        [&self.order_topic, &self.retry_topic, &self.dlq_topic]
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to connect to broker: {0}")]
    Connect(String),

    #[error("topic {topic} unavailable: {reason}")]
    TopicUnavailable { topic: String, reason: String },

    #[error("failed to receive from {topic}: {reason}")]
    Receive {
        topic: String,
        reason: String,
        transient: bool,
    },

    #[error("failed to commit {topic}[{partition}]@{offset}: {reason}")]
    Commit {
        topic: String,
        partition: i32,
        offset: i64,
        reason: String,
    },

    #[error("failed to produce to {topic}: {reason}")]
    Produce {
        topic: String,
        reason: String,
        transient: bool,
    },

    #[error("failed to close {name}: {reason}")]
    Close { name: String, reason: String },

    #[error("transport is not initialized")]
    NotInitialized,

    #[error("operation cancelled")]
    Cancelled,
}

impl TransportError {
    /// Network-level failures that are expected to clear on their own
    /// (connection refused/reset, broker down, resolver timeout).
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::Connect(_) => true,
            TransportError::Receive { transient, .. } => *transient,
            TransportError::Produce { transient, .. } => *transient,
            _ => false,
        }
    }
}

/// Errors collected while releasing transport resources.
#[derive(Debug, thiserror::Error)]
#[error("{} transport resource(s) failed to close: {}", .0.len(), join_errors(.0))]
pub struct CloseErrors(pub Vec<TransportError>);

fn join_errors(errors: &[TransportError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[async_trait]
pub trait MessageReader: Send + Sync {
    /// Wait for the next record. Returns [`TransportError::Cancelled`] as soon
    /// as `cancel` fires.
    async fn recv(&self, cancel: &CancellationToken) -> Result<InboundMessage, TransportError>;

    /// Acknowledge `msg` and everything before it on its partition.
    async fn commit(&self, msg: &InboundMessage) -> Result<(), TransportError>;

    async fn close(&self) -> Result<(), TransportError>;
}

#[async_trait]
pub trait MessageWriter: Send + Sync {
    fn topic(&self) -> &str;

    async fn send(&self, key: Option<&[u8]>, payload: &[u8]) -> Result<(), TransportError>;

    /// Flush pending writes and release the writer.
    async fn close(&self) -> Result<(), TransportError>;
}

/// Readers and writers for the three pipeline topics.
pub struct Transport {
    pub order_reader: Box<dyn MessageReader>,
    pub retry_reader: Box<dyn MessageReader>,
    pub retry_writer: Box<dyn MessageWriter>,
    pub dlq_writer: Box<dyn MessageWriter>,
}

impl Transport {
    /// Close every reader and writer, collecting all failures.
    pub async fn close(&self) -> Result<(), CloseErrors> {
        let results = [
            self.order_reader.close().await,
            self.retry_reader.close().await,
            self.retry_writer.close().await,
            self.dlq_writer.close().await,
        ];

        let errors: Vec<TransportError> = results.into_iter().filter_map(Result::err).collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(CloseErrors(errors))
        }
    }
}

/// Establishes connectivity to the order, retry and dead-letter topics.
///
/// An unreachable topic is an error: the pipeline must not start half-wired.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, topics: &TopicConfig) -> Result<Transport, TransportError>;
}
