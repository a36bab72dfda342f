//! Bounded retry around phase functions

use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

use sculpt_core::{IntoPhaseResult, PhaseResult, PipelineConfig, Result, WorkflowRecord};

/// Fixed-backoff retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            backoff: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(backoff: Duration) -> Self {
        Self { backoff }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.retry_backoff())
    }
}

/// Run `phase` up to `record.max_retries` times
///
/// An `Err` and a returned `Failed` status are both attempt failures: each
/// is appended to the record's error log, bumps `retry_count`, and is
/// followed by the backoff unless it was the last attempt. Values that are
/// not a `PhaseResult` count as success. `phase` receives the 1-based
/// attempt number.
pub async fn execute_with_retry<F, Fut, T>(
    record: &mut WorkflowRecord,
    phase_name: &str,
    policy: &RetryPolicy,
    phase: F,
) -> PhaseResult
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T>>,
    T: IntoPhaseResult,
{
    let max_attempts = record.max_retries;
    execute_bounded(record, phase_name, policy, max_attempts, phase).await
}

/// [`execute_with_retry`] with an explicit attempt bound
pub async fn execute_bounded<F, Fut, T>(
    record: &mut WorkflowRecord,
    phase_name: &str,
    policy: &RetryPolicy,
    max_attempts: usize,
    mut phase: F,
) -> PhaseResult
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T>>,
    T: IntoPhaseResult,
{
    let max_attempts = max_attempts.max(1);
    let mut last = PhaseResult::failed(vec!["Max retries exceeded".to_string()]);

    for attempt in 1..=max_attempts {
        info!(phase = phase_name, attempt, max_attempts, "running phase");

        match phase(attempt).await {
            Ok(value) => {
                let result = value.into_phase_result();
                if result.is_success() {
                    return result;
                }
                let message = if result.errors.is_empty() {
                    "phase reported failure".to_string()
                } else {
                    result.errors.join("; ")
                };
                warn!(phase = phase_name, attempt, "phase failed: {}", message);
                record.log_error(phase_name, message, attempt);
                last = result;
            }
            Err(e) => {
                warn!(phase = phase_name, attempt, "phase raised an error: {}", e);
                record.log_error(phase_name, e.to_string(), attempt);
                last = PhaseResult::failed(vec![e.to_string()]);
            }
        }

        record.retry_count += 1;
        if attempt < max_attempts && !policy.backoff.is_zero() {
            tokio::time::sleep(policy.backoff).await;
        }
    }

    last
}

#[cfg(test)]
mod tests {
    use super::*;
    use sculpt_core::{PhaseStatus, SculptError};

    fn no_backoff() -> RetryPolicy {
        RetryPolicy::new(Duration::ZERO)
    }

    #[tokio::test]
    async fn test_plain_value_is_implicit_success() {
        let mut record = WorkflowRecord::new("p");
        let result = execute_with_retry(&mut record, "Analysis", &no_backoff(), |_| async {
            Ok("code".to_string())
        })
        .await;
        assert!(result.is_success());
        assert_eq!(result.payload_as::<String>().unwrap(), "code");
        assert_eq!(record.retry_count, 0);
        assert!(record.error_log.is_empty());
    }

    #[tokio::test]
    async fn test_recovers_after_errors() {
        let mut record = WorkflowRecord::new("p");
        let result = execute_with_retry(&mut record, "Execution", &no_backoff(), |attempt| async move {
            if attempt < 3 {
                Err(SculptError::Execution(format!("boom {}", attempt)))
            } else {
                Ok(PhaseResult::success("ok"))
            }
        })
        .await;
        assert!(result.is_success());
        assert_eq!(record.retry_count, 2);
        let attempts: Vec<usize> = record.error_log.iter().map(|e| e.attempt).collect();
        assert_eq!(attempts, vec![1, 2]);
        assert!(record.error_log[0].message.contains("boom 1"));
    }

    #[tokio::test]
    async fn test_failed_status_is_bounded() {
        let mut record = WorkflowRecord::new("p").with_max_retries(2);
        let mut calls = 0;
        let result = execute_with_retry(&mut record, "Execution", &no_backoff(), |_| {
            calls += 1;
            async { Ok(PhaseResult::failed(vec!["MemoryError".to_string()])) }
        })
        .await;
        assert_eq!(calls, 2);
        assert_eq!(result.status, PhaseStatus::Failed);
        assert_eq!(result.errors, vec!["MemoryError".to_string()]);
        assert_eq!(record.retry_count, 2);
        assert_eq!(record.error_log.len(), 2);
        assert_eq!(record.error_log[1].phase, "Execution");
    }

    #[tokio::test]
    async fn test_backoff_is_applied_between_attempts() {
        let mut record = WorkflowRecord::new("p").with_max_retries(2);
        let started = tokio::time::Instant::now();
        execute_with_retry(
            &mut record,
            "Analysis",
            &RetryPolicy::new(Duration::from_millis(30)),
            |_| async { Err::<String, _>(SculptError::Other("down".to_string())) },
        )
        .await;
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn test_single_attempt_bound() {
        let mut record = WorkflowRecord::new("p");
        let mut calls = 0;
        let result = execute_bounded(&mut record, "Execution (Retry)", &no_backoff(), 1, |_| {
            calls += 1;
            async { Err::<String, _>(SculptError::Execution("still broken".to_string())) }
        })
        .await;
        assert_eq!(calls, 1);
        assert!(!result.is_success());
        assert_eq!(record.retry_count, 1);
    }
}
