use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Closed { failures: u32 },
    Open { since: Instant },
    /// One request is in flight to test recovery. A trial that never
    /// reports back expires after another cooldown.
    Trial { since: Instant },
}

/// Skips a transport after repeated failures so the fallback answers fast.
///
/// After `threshold` consecutive failures the breaker refuses requests for
/// `cooldown`, then lets exactly one trial through. The trial's outcome
/// closes or reopens it.
#[derive(Debug)]
pub struct CircuitBreaker {
    phase: Phase,
    threshold: u32,
    cooldown: Duration,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            phase: Phase::Closed { failures: 0 },
            threshold: threshold.max(1),
            cooldown,
        }
    }

    /// Three strikes, two minutes out.
    pub fn reddit_api() -> Self {
        Self::new(3, Duration::from_secs(120))
    }

    pub fn allow_request(&mut self) -> bool {
        match self.phase {
            Phase::Closed { .. } => true,
            Phase::Open { since } | Phase::Trial { since }
                if since.elapsed() >= self.cooldown =>
            {
                debug!("Breaker cooldown elapsed, letting a trial request through");
                self.phase = Phase::Trial {
                    since: Instant::now(),
                };
                true
            }
            Phase::Open { .. } | Phase::Trial { .. } => false,
        }
    }

    pub fn record_success(&mut self) {
        if matches!(self.phase, Phase::Trial { .. }) {
            info!("Trial request succeeded, closing breaker");
        }
        self.phase = Phase::Closed { failures: 0 };
    }

    pub fn record_failure(&mut self) {
        self.phase = match self.phase {
            Phase::Closed { failures } if failures + 1 >= self.threshold => {
                warn!("Opening breaker after {} consecutive failures", failures + 1);
                Phase::Open {
                    since: Instant::now(),
                }
            }
            Phase::Closed { failures } => Phase::Closed {
                failures: failures + 1,
            },
            Phase::Trial { .. } => {
                warn!("Trial request failed, reopening breaker");
                Phase::Open {
                    since: Instant::now(),
                }
            }
            Phase::Open { since } => Phase::Open { since },
        };
    }

    pub fn state(&self) -> BreakerState {
        match self.phase {
            Phase::Closed { .. } => BreakerState::Closed,
            Phase::Open { .. } => BreakerState::Open,
            Phase::Trial { .. } => BreakerState::HalfOpen,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opens_after_three_failures() {
        let mut breaker = CircuitBreaker::reddit_api();

        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert!(breaker.allow_request());

        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(!breaker.allow_request());
    }

    #[test]
    fn test_success_resets_streak() {
        let mut breaker = CircuitBreaker::reddit_api();
        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[test]
    fn test_single_trial_after_cooldown() {
        let mut breaker = CircuitBreaker::new(1, Duration::from_millis(20));

        breaker.record_failure();
        assert!(!breaker.allow_request());

        std::thread::sleep(Duration::from_millis(30));
        assert!(breaker.allow_request());
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
        // Second caller waits for the trial's verdict.
        assert!(!breaker.allow_request());

        breaker.record_success();
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert!(breaker.allow_request());
    }

    #[test]
    fn test_failed_trial_reopens() {
        let mut breaker = CircuitBreaker::new(1, Duration::from_millis(20));

        breaker.record_failure();
        std::thread::sleep(Duration::from_millis(30));
        assert!(breaker.allow_request());

        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(!breaker.allow_request());
    }

    #[test]
    fn test_abandoned_trial_expires() {
        let mut breaker = CircuitBreaker::new(1, Duration::from_millis(20));

        breaker.record_failure();
        std::thread::sleep(Duration::from_millis(30));
        assert!(breaker.allow_request());

        // The trial's caller went away without recording anything.
        std::thread::sleep(Duration::from_millis(30));
        assert!(breaker.allow_request());
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
        assert!(!breaker.allow_request());

        breaker.record_success();
        assert_eq!(breaker.state(), BreakerState::Closed);
    }
}
