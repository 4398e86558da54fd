use prometheus::{
    HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry,
};

// ============================================================================
// Metrics Module - Prometheus metrics for the ingestion pipeline
// ============================================================================
//
// Provides metrics for:
// - Message outcomes per topic (success / retry / dead_letter)
// - Processing latency
// - In-process retry attempts and exhaustion
// - Dead-letter and retry-topic writes
// - Cache hit ratio on the read path
// - Transient transport errors seen by the broker loops
//
// All metrics are registered with one registry, exposed via /metrics.
// ============================================================================

pub struct Metrics {
    registry: Registry,

    // Pipeline
    pub messages_processed: IntCounterVec,
    pub processing_duration: HistogramVec,

    // Retry
    pub retry_attempts_total: IntCounter,
    pub retry_exhausted_total: IntCounter,
    pub retry_topic_writes: IntCounter,

    // DLQ
    pub dlq_messages_total: IntCounterVec,

    // Cache
    pub cache_lookups: IntCounterVec,

    // Broker
    pub transient_errors: IntCounterVec,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let messages_processed = IntCounterVec::new(
            Opts::new("order_messages_processed_total", "Order messages processed by outcome"),
            &["topic", "outcome"],
        )?;
        registry.register(Box::new(messages_processed.clone()))?;

        let processing_duration = HistogramVec::new(
            HistogramOpts::new(
                "order_message_processing_duration_seconds",
                "Time spent processing one message, retries included",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]),
            &["topic"],
        )?;
        registry.register(Box::new(processing_duration.clone()))?;

        let retry_attempts_total = IntCounter::new(
            "order_retry_attempts_total",
            "Processing attempts made for retry-topic messages",
        )?;
        registry.register(Box::new(retry_attempts_total.clone()))?;

        let retry_exhausted_total = IntCounter::new(
            "order_retry_exhausted_total",
            "Retry-topic messages that ran out of attempts",
        )?;
        registry.register(Box::new(retry_exhausted_total.clone()))?;

        let retry_topic_writes = IntCounter::new(
            "order_retry_topic_writes_total",
            "Messages forwarded from the order topic to the retry topic",
        )?;
        registry.register(Box::new(retry_topic_writes.clone()))?;

        let dlq_messages_total = IntCounterVec::new(
            Opts::new("order_dlq_messages_total", "Messages written to the dead-letter topic"),
            &["source"],
        )?;
        registry.register(Box::new(dlq_messages_total.clone()))?;

        let cache_lookups = IntCounterVec::new(
            Opts::new("order_cache_lookups_total", "Order cache lookups on the read path"),
            &["result"],
        )?;
        registry.register(Box::new(cache_lookups.clone()))?;

        let transient_errors = IntCounterVec::new(
            Opts::new("broker_transient_errors_total", "Transient transport errors per loop"),
            &["loop"],
        )?;
        registry.register(Box::new(transient_errors.clone()))?;

        Ok(Self {
            registry,
            messages_processed,
            processing_duration,
            retry_attempts_total,
            retry_exhausted_total,
            retry_topic_writes,
            dlq_messages_total,
            cache_lookups,
            transient_errors,
        })
    }

    /// Get the Prometheus registry for exposing metrics via HTTP
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Helper to record one processed message
    pub fn record_message(&self, topic: &str, outcome: &str, duration_secs: f64) {
        self.messages_processed.with_label_values(&[topic, outcome]).inc();
        self.processing_duration.with_label_values(&[topic]).observe(duration_secs);
    }

    pub fn record_retry_attempt(&self) {
        self.retry_attempts_total.inc();
    }

    pub fn record_retry_exhausted(&self) {
        self.retry_exhausted_total.inc();
    }

    pub fn record_retry_topic_write(&self) {
        self.retry_topic_writes.inc();
    }

    /// Helper to record DLQ message
    pub fn record_dlq_message(&self, source_topic: &str) {
        self.dlq_messages_total.with_label_values(&[source_topic]).inc();
    }

    pub fn record_cache_lookup(&self, hit: bool) {
        let result = if hit { "hit" } else { "miss" };
        self.cache_lookups.with_label_values(&[result]).inc();
    }

    pub fn record_transient_error(&self, loop_name: &str) {
        self.transient_errors.with_label_values(&[loop_name]).inc();
    }
}
