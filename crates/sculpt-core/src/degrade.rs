//! Graceful degradation for oracle calls
//!
//! An oracle that errors or is slow must never fail a workflow. Every oracle
//! call goes through [`with_fallback`], which bounds it with a timeout and
//! substitutes a deterministic answer. Syntax checks and executor results do
//! not degrade; their failures are real.

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::{Result, SculptError};

/// Run `call` under `timeout`, producing `fallback()` if it errors or elapses
///
/// ```no_run
/// use std::time::Duration;
/// use sculpt_core::with_fallback;
/// use sculpt_core::Result;
///
/// async fn ask_oracle() -> Result<String> {
///     Ok("result = cq.Workplane(\"XY\").sphere(25)".to_string())
/// }
///
/// async fn example() -> String {
///     with_fallback("synthesizer", Duration::from_secs(60), ask_oracle(), || {
///         "result = cq.Workplane(\"XY\").box(50, 50, 50)".to_string()
///     })
///     .await
/// }
/// ```
pub async fn with_fallback<Fut, T, F>(role: &str, timeout: Duration, call: Fut, fallback: F) -> T
where
    Fut: Future<Output = Result<T>>,
    F: FnOnce() -> T,
{
    let failure = match tokio::time::timeout(timeout, call).await {
        Ok(Ok(value)) => {
            debug!(role, "oracle answered");
            return value;
        }
        Ok(Err(e)) => e,
        Err(_) => SculptError::Timeout(timeout.as_secs()),
    };

    warn!(
        role,
        unavailable = failure.is_unavailable(),
        "degrading to deterministic answer: {}",
        failure
    );
    fallback()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn test_live_answer_skips_fallback() {
        let fallback_used = AtomicBool::new(false);
        let value = with_fallback(
            "architect",
            Duration::from_secs(1),
            async { Ok::<_, SculptError>(7) },
            || {
                fallback_used.store(true, Ordering::SeqCst);
                0
            },
        )
        .await;
        assert_eq!(value, 7);
        assert!(!fallback_used.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_oracle_error_degrades() {
        let value = with_fallback(
            "planner",
            Duration::from_secs(1),
            async { Err::<Vec<u8>, _>(SculptError::Oracle("Ollama error 500".to_string())) },
            Vec::new,
        )
        .await;
        assert!(value.is_empty());
    }

    #[tokio::test]
    async fn test_slow_oracle_degrades() {
        let value = with_fallback(
            "synthesizer",
            Duration::from_millis(20),
            async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, SculptError>("late".to_string())
            },
            || "box".to_string(),
        )
        .await;
        assert_eq!(value, "box");
    }
}
