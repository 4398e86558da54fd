use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::processor::ProcessResult;

// ============================================================================
// Retry Policy - bounded in-process retries with jittered backoff
// ============================================================================
//
// Used by the retry-topic loop. Success and DeadLetter are terminal; only
// Retry leads to another attempt. When attempts run out the last Retry is
// returned and the caller escalates it to the dead-letter topic.
//
// delay(n) = min(backoff_min * 2^(n-1), backoff_max) +/- 25% jitter
//
// ============================================================================

#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Delay after the first failed attempt
    pub backoff_min: Duration,
    /// Upper bound for the un-jittered delay
    pub backoff_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_min: Duration::from_millis(100),
            backoff_max: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_min: Duration, backoff_max: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_min,
            backoff_max: backoff_max.max(backoff_min),
        }
    }

    /// Exponential delay for `attempt` (1-based) before jitter.
    pub fn base_backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        2u32.checked_pow(exponent)
            .and_then(|factor| self.backoff_min.checked_mul(factor))
            .map_or(self.backoff_max, |delay| delay.min(self.backoff_max))
    }

    /// Delay to wait after `attempt` failed, jittered by up to a quarter
    /// of the base delay in either direction.
    pub fn backoff_duration(&self, attempt: u32) -> Duration {
        let base = self.base_backoff(attempt);
        let quarter = u64::try_from(base.as_nanos() / 4).unwrap_or(u64::MAX / 2);
        if quarter == 0 {
            return base;
        }

        let offset = rand::thread_rng().gen_range(0..=quarter * 2);
        base.saturating_sub(Duration::from_nanos(quarter)) + Duration::from_nanos(offset)
    }

    /// Run `operation` until it returns a terminal outcome or attempts run
    /// out. Cancellation aborts before the next attempt or during a backoff
    /// sleep and returns the current outcome.
    pub async fn execute<F, Fut>(&self, cancel: &CancellationToken, mut operation: F) -> ProcessResult
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = ProcessResult>,
    {
        let mut outcome = ProcessResult::Retry;

        for attempt in 1..=self.max_attempts {
            if cancel.is_cancelled() {
                tracing::debug!(attempt = attempt, "Retry cancelled before attempt");
                return outcome;
            }

            outcome = operation(attempt).await;

            match outcome {
                ProcessResult::Success => {
                    if attempt > 1 {
                        tracing::info!(attempt = attempt, "Message processed after retry");
                    }
                    return outcome;
                }
                ProcessResult::DeadLetter => return outcome,
                ProcessResult::Retry => {}
            }

            if attempt == self.max_attempts {
                break;
            }

            let delay = self.backoff_duration(attempt);
            tracing::warn!(
                attempt = attempt,
                max_attempts = self.max_attempts,
                delay_ms = delay.as_millis() as u64,
                "Processing failed, retrying after delay"
            );

            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!(attempt = attempt, "Retry backoff cancelled");
                    return outcome;
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }

        tracing::error!(
            max_attempts = self.max_attempts,
            "Message still failing after all retries"
        );
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(100), Duration::from_millis(1000))
    }

    async fn run_with(policy: &RetryPolicy, outcomes: Vec<ProcessResult>) -> (ProcessResult, u32) {
        let counter = Arc::new(AtomicU32::new(0));
        let cancel = CancellationToken::new();

        let result = policy
            .execute(&cancel, |attempt| {
                let counter = counter.clone();
                let outcome = outcomes[(attempt as usize - 1).min(outcomes.len() - 1)];
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    outcome
                }
            })
            .await;

        (result, counter.load(Ordering::SeqCst))
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_every_time_exhausts_attempts() {
        let (result, calls) = run_with(&policy(4), vec![ProcessResult::Retry]).await;
        assert_eq!(result, ProcessResult::Retry);
        assert_eq!(calls, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_first_time_runs_once() {
        let (result, calls) = run_with(&policy(4), vec![ProcessResult::Success]).await;
        assert_eq!(result, ProcessResult::Success);
        assert_eq!(calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dead_letter_stops_immediately() {
        let outcomes = vec![ProcessResult::Retry, ProcessResult::DeadLetter, ProcessResult::Success];
        let (result, calls) = run_with(&policy(5), outcomes).await;
        assert_eq!(result, ProcessResult::DeadLetter);
        assert_eq!(calls, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_succeeds_eventually() {
        let outcomes = vec![ProcessResult::Retry, ProcessResult::Retry, ProcessResult::Success];
        let (result, calls) = run_with(&policy(3), outcomes).await;
        assert_eq!(result, ProcessResult::Success);
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn test_cancel_aborts_backoff() {
        let policy = RetryPolicy::new(3, Duration::from_secs(60), Duration::from_secs(60));
        let cancel = CancellationToken::new();
        let counter = Arc::new(AtomicU32::new(0));

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let result = policy
            .execute(&cancel, |_| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    ProcessResult::Retry
                }
            })
            .await;

        assert_eq!(result, ProcessResult::Retry);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_cancelled_before_first_attempt() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = policy(3)
            .execute(&cancel, |_| async { ProcessResult::Success })
            .await;
        assert_eq!(result, ProcessResult::Retry);
    }

    #[test]
    fn test_base_backoff_doubles_and_caps() {
        let policy = policy(10);
        assert_eq!(policy.base_backoff(1), Duration::from_millis(100));
        assert_eq!(policy.base_backoff(2), Duration::from_millis(200));
        assert_eq!(policy.base_backoff(4), Duration::from_millis(800));
        assert_eq!(policy.base_backoff(5), Duration::from_millis(1000));
        assert_eq!(policy.base_backoff(40), Duration::from_millis(1000));
    }

    #[test]
    fn test_jitter_stays_within_a_quarter() {
        let policy = policy(10);
        for attempt in 1..=6 {
            let base = policy.base_backoff(attempt);
            for _ in 0..50 {
                let delay = policy.backoff_duration(attempt);
                assert!(delay >= base - base / 4, "{delay:?} below range for {base:?}");
                assert!(delay <= base + base / 4, "{delay:?} above range for {base:?}");
            }
        }
    }

    #[test]
    fn test_new_clamps_parameters() {
        let policy = RetryPolicy::new(0, Duration::from_millis(500), Duration::from_millis(100));
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.backoff_max, Duration::from_millis(500));
    }
}
