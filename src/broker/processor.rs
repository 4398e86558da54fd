use async_trait::async_trait;
use std::sync::Arc;

use crate::domain::OrderParams;
use crate::usecase::OrderCreator;

/// Routing decision for one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessResult {
    /// Order stored (commit the message)
    Success,
    /// Infrastructure failure (send to the retry tier)
    Retry,
    /// Will never succeed (send to the dead-letter topic)
    DeadLetter,
}

impl ProcessResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessResult::Success => "success",
            ProcessResult::Retry => "retry",
            ProcessResult::DeadLetter => "dead_letter",
        }
    }
}

impl std::fmt::Display for ProcessResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn process(&self, payload: &[u8]) -> ProcessResult;
}

// ============================================================================
// Message Processor
// ============================================================================
//
// Decodes an order payload and hands it to the use case. The outcome of
// create_order decides where the message goes next:
//
//   decode failure            -> DeadLetter
//   invalid state / duplicate -> DeadLetter
//   anything else             -> Retry
//
// ============================================================================

pub struct MessageProcessor<U: OrderCreator> {
    usecase: Arc<U>,
}

impl<U: OrderCreator> MessageProcessor<U> {
    pub fn new(usecase: Arc<U>) -> Self {
        Self { usecase }
    }
}

#[async_trait]
impl<U: OrderCreator + 'static> MessageHandler for MessageProcessor<U> {
    async fn process(&self, payload: &[u8]) -> ProcessResult {
        let params: OrderParams = match serde_json::from_slice(payload) {
            Ok(params) => params,
            Err(e) => {
                tracing::warn!(error = %e, bytes = payload.len(), "Failed to decode order payload");
                return ProcessResult::DeadLetter;
            }
        };

        let order_uid = params.order_uid.clone();

        match self.usecase.create_order(params).await {
            Ok(()) => {
                tracing::debug!(order_uid = %order_uid, "Order created");
                ProcessResult::Success
            }
            Err(e) if e.is_retryable() => {
                tracing::warn!(order_uid = %order_uid, error = %e, "Order creation failed, will retry");
                ProcessResult::Retry
            }
            Err(e) => {
                tracing::warn!(order_uid = %order_uid, error = %e, "Order rejected");
                ProcessResult::DeadLetter
            }
        }
    }
}
