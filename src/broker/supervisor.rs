use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::consumer::Consumer;
use crate::messaging::{CloseErrors, TransportError};
use crate::metrics::Metrics;

// ============================================================================
// Broker - owns the two consumption loops
// ============================================================================
//
// Created -> Initializing -> Ready -> Running -> Draining -> Stopped
//
// run():      init the consumer (fatal on error), wait for readiness, then
//             spawn the order loop and the retry loop.
// shutdown(): cancel, wait for both loops to return, then close the
//             transport. Closing before the loops stop would surface as
//             spurious read errors.
//
// ============================================================================

const DEFAULT_TRANSIENT_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerState {
    Created,
    Initializing,
    Ready,
    Running,
    Draining,
    Stopped,
}

impl BrokerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BrokerState::Created => "created",
            BrokerState::Initializing => "initializing",
            BrokerState::Ready => "ready",
            BrokerState::Running => "running",
            BrokerState::Draining => "draining",
            BrokerState::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for BrokerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("consumer initialization failed: {0}")]
    Init(#[source] TransportError),

    #[error("broker cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: BrokerState,
    },

    #[error(transparent)]
    Shutdown(#[from] CloseErrors),
}

#[derive(Debug, Clone, Copy)]
enum LoopKind {
    Order,
    Retry,
}

impl LoopKind {
    fn name(self) -> &'static str {
        match self {
            LoopKind::Order => "order",
            LoopKind::Retry => "retry",
        }
    }
}

pub struct Broker {
    consumer: Arc<dyn Consumer>,
    state: watch::Sender<BrokerState>,
    loops: Mutex<Vec<JoinHandle<()>>>,
    cancel: Mutex<Option<CancellationToken>>,
    transient_backoff: Duration,
    metrics: Option<Arc<Metrics>>,
}

impl Broker {
    pub fn new(consumer: Arc<dyn Consumer>) -> Self {
        let (state, _) = watch::channel(BrokerState::Created);
        Self {
            consumer,
            state,
            loops: Mutex::new(Vec::new()),
            cancel: Mutex::new(None),
            transient_backoff: DEFAULT_TRANSIENT_BACKOFF,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Pause taken by a loop after a transient transport error.
    pub fn with_transient_backoff(mut self, backoff: Duration) -> Self {
        self.transient_backoff = backoff;
        self
    }

    pub fn state(&self) -> BrokerState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<BrokerState> {
        self.state.subscribe()
    }

    fn set_state(&self, next: BrokerState) {
        let previous = self.state.send_replace(next);
        tracing::debug!(from = %previous, to = %next, "Broker state changed");
    }

    fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
        mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Initialize the consumer and start both loops. Returns once the loops
    /// are running; they stop when `cancel` fires or on `shutdown`.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<(), BrokerError> {
        // Claim the Created -> Initializing transition in one step so that
        // concurrent callers cannot both start loops
        let mut observed = BrokerState::Created;
        let claimed = self.state.send_if_modified(|state| {
            observed = *state;
            if *state == BrokerState::Created {
                *state = BrokerState::Initializing;
                true
            } else {
                false
            }
        });
        if !claimed {
            return Err(BrokerError::InvalidState {
                operation: "run",
                state: observed,
            });
        }
        tracing::debug!(from = %BrokerState::Created, to = %BrokerState::Initializing, "Broker state changed");
        if let Err(e) = self.consumer.init().await {
            tracing::error!(error = %e, "Broker failed to initialize consumer");
            self.set_state(BrokerState::Stopped);
            return Err(BrokerError::Init(e));
        }

        self.consumer.ready().await;
        self.set_state(BrokerState::Ready);

        let loop_cancel = cancel.child_token();
        *Self::lock(&self.cancel) = Some(loop_cancel.clone());

        let handles = [LoopKind::Order, LoopKind::Retry].map(|kind| {
            tokio::spawn(consume_loop(
                kind,
                self.consumer.clone(),
                loop_cancel.clone(),
                self.transient_backoff,
                self.metrics.clone(),
            ))
        });
        Self::lock(&self.loops).extend(handles);

        self.set_state(BrokerState::Running);
        tracing::info!("Broker running");
        Ok(())
    }

    /// Stop both loops and release transport resources.
    pub async fn shutdown(&self) -> Result<(), BrokerError> {
        match self.state() {
            BrokerState::Stopped => return Ok(()),
            BrokerState::Created => {
                self.set_state(BrokerState::Stopped);
                return Ok(());
            }
            BrokerState::Draining => {
                return Err(BrokerError::InvalidState {
                    operation: "shutdown",
                    state: BrokerState::Draining,
                })
            }
            _ => {}
        }

        self.set_state(BrokerState::Draining);
        tracing::info!("Broker draining");

        if let Some(cancel) = Self::lock(&self.cancel).take() {
            cancel.cancel();
        }

        let handles: Vec<JoinHandle<()>> = Self::lock(&self.loops).drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Consumption loop panicked");
            }
        }

        let result = self.consumer.shutdown().await;
        self.set_state(BrokerState::Stopped);

        match result {
            Ok(()) => {
                tracing::info!("Broker stopped");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "Broker stopped with close errors");
                Err(e.into())
            }
        }
    }
}

async fn consume_loop(
    kind: LoopKind,
    consumer: Arc<dyn Consumer>,
    cancel: CancellationToken,
    transient_backoff: Duration,
    metrics: Option<Arc<Metrics>>,
) {
    let name = kind.name();
    tracing::info!(loop_name = name, "Consumption loop started");

    while !cancel.is_cancelled() {
        let result = match kind {
            LoopKind::Order => consumer.read_order_msg(&cancel).await,
            LoopKind::Retry => consumer.read_retry_msg(&cancel).await,
        };

        match result {
            Ok(()) => {}
            Err(TransportError::Cancelled) => {}
            Err(e) if e.is_transient() => {
                if let Some(metrics) = &metrics {
                    metrics.record_transient_error(name);
                }
                tracing::warn!(
                    loop_name = name,
                    error = %e,
                    backoff_ms = transient_backoff.as_millis() as u64,
                    "Transient transport error, backing off"
                );
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(transient_backoff) => {}
                }
            }
            Err(e) => {
                tracing::error!(loop_name = name, error = %e, "Failed to handle message");
            }
        }
    }

    tracing::info!(loop_name = name, "Consumption loop stopped");
}
