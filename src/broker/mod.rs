// ============================================================================
// Broker Module - ingestion pipeline
// ============================================================================
//
// - processor  - decode + classify one message (Success / Retry / DeadLetter)
// - retry      - bounded in-process retries with jittered backoff
// - consumer   - reads topics and routes messages by outcome
// - supervisor - lifecycle of the order and retry loops
//
// ============================================================================

pub mod consumer;
pub mod processor;
pub mod retry;
pub mod supervisor;

pub use consumer::{Consumer, StreamConsumer};
pub use processor::{MessageHandler, MessageProcessor, ProcessResult};
pub use retry::RetryPolicy;
pub use supervisor::{Broker, BrokerError, BrokerState};
