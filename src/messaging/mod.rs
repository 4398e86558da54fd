// ============================================================================
// Messaging Module
// ============================================================================
//
// - transport - reader/writer/connector traits shared by all transports
// - kafka     - rdkafka implementation used in production
// - memory    - in-process broker for tests
//
// ============================================================================

pub mod kafka;
pub mod memory;
pub mod transport;

pub use kafka::KafkaConnector;
pub use memory::{MemoryBroker, MemoryConnector};
pub use transport::{
    CloseErrors, Connector, InboundMessage, MessageReader, MessageWriter, TopicConfig, Transport,
    TransportError,
};
