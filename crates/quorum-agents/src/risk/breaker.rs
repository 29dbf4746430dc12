//! Rolling-window circuit breaker around the risk advisor.

use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

use quorum_models::config::BreakerConfig;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for BreakerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BreakerState::Closed => write!(f, "closed"),
            BreakerState::Open => write!(f, "open"),
            BreakerState::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Closed until `failure_threshold` failures land within `window`; open for
/// `cooldown`; then half-open, where `success_threshold` successes close it
/// and any failure reopens it. Half-open admits one trial call at a time.
///
/// Time is passed in so transitions are testable without sleeping.
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    success_threshold: u32,
    window: Duration,
    cooldown: Duration,
    state: BreakerState,
    failures: VecDeque<Instant>,
    half_open_successes: u32,
    trial_in_flight: bool,
    opened_at: Option<Instant>,
}

impl CircuitBreaker {
    pub fn new(config: &BreakerConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold.max(1),
            success_threshold: config.success_threshold.max(1),
            window: Duration::from_secs(config.window_seconds),
            cooldown: Duration::from_secs(config.open_cooldown_seconds),
            state: BreakerState::Closed,
            failures: VecDeque::new(),
            half_open_successes: 0,
            trial_in_flight: false,
            opened_at: None,
        }
    }

    pub fn state(&self) -> BreakerState {
        self.state
    }

    /// Whether a call may go through at `now`. Moves Open to HalfOpen once
    /// the cooldown has elapsed. While half-open only the caller holding the
    /// trial call is let through; it must end with `record_success`,
    /// `record_failure` or `release_trial`.
    pub fn allow(&mut self, now: Instant) -> bool {
        match self.state {
            BreakerState::Closed => true,
            BreakerState::HalfOpen => self.take_trial(),
            BreakerState::Open => {
                let cooled = self
                    .opened_at
                    .map(|at| now.saturating_duration_since(at) >= self.cooldown)
                    .unwrap_or(true);
                if !cooled {
                    return false;
                }
                info!("Advisory breaker half-open; admitting a trial call");
                self.state = BreakerState::HalfOpen;
                self.half_open_successes = 0;
                self.trial_in_flight = false;
                self.take_trial()
            }
        }
    }

    fn take_trial(&mut self) -> bool {
        if self.trial_in_flight {
            return false;
        }
        self.trial_in_flight = true;
        true
    }

    /// Give the trial slot back without an outcome (the call was abandoned).
    pub fn release_trial(&mut self) {
        self.trial_in_flight = false;
    }

    pub fn record_success(&mut self, _now: Instant) {
        if self.state == BreakerState::HalfOpen {
            self.trial_in_flight = false;
            self.half_open_successes += 1;
            if self.half_open_successes >= self.success_threshold {
                info!("Advisory breaker closed");
                self.state = BreakerState::Closed;
                self.failures.clear();
                self.half_open_successes = 0;
                self.opened_at = None;
            }
        }
    }

    pub fn record_failure(&mut self, now: Instant) {
        match self.state {
            BreakerState::HalfOpen => self.trip(now),
            BreakerState::Open => {}
            BreakerState::Closed => {
                self.failures.push_back(now);
                while let Some(oldest) = self.failures.front() {
                    if now.saturating_duration_since(*oldest) > self.window {
                        self.failures.pop_front();
                    } else {
                        break;
                    }
                }
                if self.failures.len() as u32 >= self.failure_threshold {
                    self.trip(now);
                }
            }
        }
    }

    fn trip(&mut self, now: Instant) {
        warn!(
            failures = self.failures.len(),
            cooldown_secs = self.cooldown.as_secs(),
            "Advisory breaker opened"
        );
        self.state = BreakerState::Open;
        self.opened_at = Some(now);
        self.half_open_successes = 0;
        self.trial_in_flight = false;
        self.failures.clear();
    }
}
