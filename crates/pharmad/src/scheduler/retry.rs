//! Bounded retry with doubling backoff for transient store faults.

use std::future::Future;
use std::time::Duration;

use pharma_store::{StoreError, StoreResult};
use tracing::warn;

/// What a job run amounted to once retries are spent.
#[derive(Debug)]
pub enum TaskOutcome {
    Succeeded,
    /// Gave up: the retry budget ran out, or the fault was not retryable.
    /// Carries the error of the final attempt.
    Exhausted(StoreError),
}

impl TaskOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

/// Retry budget for one job run.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles for each one after.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Runs `op`, retrying transient store faults with doubling backoff.
    ///
    /// Anything `StoreError::is_transient` rejects exhausts on the attempt
    /// that produced it; jobs are idempotent, so a retried run that
    /// partially succeeded before only fills in what is missing.
    pub async fn run<F, Fut>(&self, job: &str, mut op: F) -> TaskOutcome
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StoreResult<()>>,
    {
        let mut attempt = 1u32;
        loop {
            match op().await {
                Ok(()) => return TaskOutcome::Succeeded,
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    let backoff = self.base_delay * 2u32.pow(attempt - 1);
                    warn!(
                        job,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "retrying after transient store fault"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return TaskOutcome::Exhausted(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn policy() -> RetryPolicy {
        RetryPolicy::default()
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_fault_retries_until_success() {
        let calls = Arc::new(AtomicU32::new(0));

        let outcome = policy()
            .run("prueba", {
                let calls = Arc::clone(&calls);
                move || {
                    let calls = Arc::clone(&calls);
                    async move {
                        let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                        if n < 3 {
                            Err(StoreError::Unavailable("ocupado".to_string()))
                        } else {
                            Ok(())
                        }
                    }
                }
            })
            .await;

        assert!(outcome.succeeded(), "third attempt should succeed");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_exhaustion_returns_last_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let started = tokio::time::Instant::now();

        let outcome = policy()
            .run("prueba", {
                let calls = Arc::clone(&calls);
                move || {
                    let calls = Arc::clone(&calls);
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Err(StoreError::Unavailable("sigue ocupado".to_string()))
                    }
                }
            })
            .await;

        assert!(matches!(
            outcome,
            TaskOutcome::Exhausted(StoreError::Unavailable(_))
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 500ms before the second attempt, 1000ms before the third.
        assert_eq!(started.elapsed(), Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_transient_fault_exhausts_immediately() {
        let calls = Arc::new(AtomicU32::new(0));

        let outcome = policy()
            .run("prueba", {
                let calls = Arc::clone(&calls);
                move || {
                    let calls = Arc::clone(&calls);
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Err(StoreError::Validation("dato inválido".to_string()))
                    }
                }
            })
            .await;

        assert!(matches!(
            outcome,
            TaskOutcome::Exhausted(StoreError::Validation(_))
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_success_needs_no_retries() {
        let outcome = policy().run("prueba", || async { Ok(()) }).await;
        assert!(outcome.succeeded());
    }
}
