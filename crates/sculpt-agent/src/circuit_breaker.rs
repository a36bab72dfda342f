//! Circuit breaker shared by the oracle roles
//!
//! Every role talks to the same Ollama server, so a single breaker guards all
//! of them. After `threshold` consecutive failures the circuit opens and each
//! role goes straight to its deterministic fallback. Once the cooldown has
//! passed a single trial request is admitted; its outcome closes the circuit
//! or opens it again. A trial that never reports back, because its caller
//! timed out and dropped it, is abandoned after another cooldown.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use sculpt_core::OracleConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    /// Cooldown elapsed, next request is a trial
    HalfOpen,
}

#[derive(Debug, Default)]
struct Tripwire {
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    trial_started: Option<Instant>,
}

impl Tripwire {
    fn state(&self, cooldown: Duration) -> CircuitState {
        match self.opened_at {
            None => CircuitState::Closed,
            Some(at) if at.elapsed() >= cooldown => CircuitState::HalfOpen,
            Some(_) => CircuitState::Open,
        }
    }
}

#[derive(Debug)]
pub struct CircuitBreaker {
    tripwire: Mutex<Tripwire>,
    threshold: u32,
    cooldown: Duration,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            tripwire: Mutex::new(Tripwire::default()),
            threshold: threshold.max(1),
            cooldown,
        }
    }

    pub fn from_config(config: &OracleConfig) -> Self {
        Self::new(
            config.failure_threshold,
            Duration::from_secs(config.cooldown_secs),
        )
    }

    fn tripwire(&self) -> MutexGuard<'_, Tripwire> {
        self.tripwire.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> CircuitState {
        self.tripwire().state(self.cooldown)
    }

    /// Whether a request may go out now
    ///
    /// While half-open only one caller is let through until that trial
    /// reports back or goes stale.
    pub fn admit(&self) -> bool {
        let mut tripwire = self.tripwire();
        match tripwire.state(self.cooldown) {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::HalfOpen => {
                let pending = tripwire
                    .trial_started
                    .is_some_and(|at| at.elapsed() < self.cooldown);
                if pending {
                    return false;
                }
                if tripwire.trial_started.is_some() {
                    debug!("previous trial never reported, admitting another");
                }
                tripwire.trial_started = Some(Instant::now());
                true
            }
        }
    }

    /// The server answered; close the circuit
    pub fn record_success(&self) {
        let mut tripwire = self.tripwire();
        if tripwire.opened_at.is_some() {
            info!("oracle server reachable again, closing circuit");
        }
        *tripwire = Tripwire::default();
    }

    pub fn record_failure(&self) {
        let mut tripwire = self.tripwire();
        tripwire.consecutive_failures = tripwire.consecutive_failures.saturating_add(1);
        tripwire.trial_started = None;
        if tripwire.consecutive_failures >= self.threshold {
            if tripwire.opened_at.is_none() {
                warn!(
                    failures = tripwire.consecutive_failures,
                    cooldown_secs = self.cooldown.as_secs(),
                    "opening oracle circuit"
                );
            }
            tripwire.opened_at = Some(Instant::now());
        }
    }

    pub fn failure_count(&self) -> u32 {
        self.tripwire().consecutive_failures
    }

    /// Time left before a trial request is admitted, zero unless open
    pub fn retry_in(&self) -> Duration {
        match self.tripwire().opened_at {
            Some(at) => self.cooldown.saturating_sub(at.elapsed()),
            None => Duration::ZERO,
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::from_config(&OracleConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn test_opens_at_threshold() {
        let breaker = CircuitBreaker::new(2, Duration::from_secs(60));
        breaker.record_failure();
        assert!(breaker.admit());
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.admit());
        assert!(breaker.retry_in() > Duration::from_secs(50));
    }

    #[test]
    fn test_success_resets_streak() {
        let breaker = CircuitBreaker::new(2, Duration::from_secs(60));
        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        assert_eq!(breaker.failure_count(), 1);
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.retry_in(), Duration::ZERO);
    }

    #[test]
    fn test_half_open_admits_one_trial() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(100));
        breaker.record_failure();
        sleep(Duration::from_millis(150));

        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert!(breaker.admit());
        assert!(!breaker.admit());

        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.admit());
    }

    #[test]
    fn test_abandoned_trial_expires() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(100));
        breaker.record_failure();
        sleep(Duration::from_millis(150));
        assert!(breaker.admit());
        assert!(!breaker.admit());

        sleep(Duration::from_millis(150));
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert!(breaker.admit());
    }

    #[test]
    fn test_failed_trial_reopens() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(100));
        breaker.record_failure();
        sleep(Duration::from_millis(150));
        assert!(breaker.admit());

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.admit());
    }

    #[test]
    fn test_zero_threshold_treated_as_one() {
        let breaker = CircuitBreaker::new(0, Duration::from_secs(60));
        assert!(breaker.admit());
        breaker.record_failure();
        assert!(!breaker.admit());
    }
}
