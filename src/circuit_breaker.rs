// =============================================================================
// circuit_breaker.rs - BACKING OFF THE PORTAL WHEN IT STOPS ANSWERING
// =============================================================================
//
// The portal has no rate-limit headers. When it decides we're a bot it just
// starts timing out or throwing 503s at every page. Pacing alone won't get
// us out of that; stopping for a while will.
//
// One breaker per scraper run. After N consecutive probe failures it opens
// and the scraper waits out the cooldown instead of burning probes. After
// the cooldown a single half-open probe decides: success closes it, failure
// opens it again.
//
// Timestamps use tokio's clock so paused-time tests can drive the cooldown.
// =============================================================================

use parking_lot::Mutex;
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CircuitState {
    /// Probes flow normally.
    Closed,
    /// Tripped. No probes until the cooldown has elapsed.
    Open,
    /// Cooldown over. The next probe decides.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    opened_at: Option<Instant>,
    total_trips: u64,
}

/// Thresholds, straight from config.
#[derive(Debug, Clone, Copy)]
pub struct BreakerSettings {
    pub failure_threshold: u32,
    pub reset_timeout: Duration,
    pub success_threshold: u32,
}

pub struct CircuitBreaker {
    name: String,
    inner: Mutex<BreakerInner>,
    settings: BreakerSettings,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, settings: BreakerSettings) -> Self {
        Self {
            name: name.into(),
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                opened_at: None,
                total_trips: 0,
            }),
            settings: BreakerSettings {
                failure_threshold: settings.failure_threshold.max(1),
                success_threshold: settings.success_threshold.max(1),
                ..settings
            },
        }
    }

    /// Whether a probe may go out now. An open breaker whose cooldown has
    /// elapsed moves to half-open and lets the probe through.
    pub fn allow_request(&self) -> bool {
        let mut inner = self.inner.lock();

        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let cooled = inner
                    .opened_at
                    .map_or(true, |at| at.elapsed() >= self.settings.reset_timeout);
                if cooled {
                    info!(name = %self.name, "Circuit breaker OPEN -> HALF_OPEN");
                    inner.state = CircuitState::HalfOpen;
                    inner.success_count = 0;
                }
                cooled
            }
        }
    }

    /// Time left before an open breaker will admit a probe. `None` unless open.
    pub fn cooldown_remaining(&self) -> Option<Duration> {
        let inner = self.inner.lock();
        match (inner.state, inner.opened_at) {
            (CircuitState::Open, Some(at)) => {
                Some(self.settings.reset_timeout.saturating_sub(at.elapsed()))
            }
            _ => None,
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();

        match inner.state {
            CircuitState::Closed => inner.failure_count = 0,
            CircuitState::HalfOpen => {
                inner.success_count += 1;
                if inner.success_count >= self.settings.success_threshold {
                    info!(name = %self.name, "Circuit breaker HALF_OPEN -> CLOSED");
                    inner.state = CircuitState::Closed;
                    inner.failure_count = 0;
                    inner.success_count = 0;
                    inner.opened_at = None;
                }
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();

        match inner.state {
            CircuitState::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.settings.failure_threshold {
                    warn!(
                        name = %self.name,
                        failures = inner.failure_count,
                        cooldown_secs = self.settings.reset_timeout.as_secs(),
                        "Circuit breaker TRIPPED, CLOSED -> OPEN"
                    );
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                    inner.total_trips += 1;
                }
            }
            CircuitState::HalfOpen => {
                warn!(name = %self.name, "Half-open probe failed, back to OPEN");
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                inner.total_trips += 1;
            }
            CircuitState::Open => inner.opened_at = Some(Instant::now()),
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    pub fn total_trips(&self) -> u64 {
        self.inner.lock().total_trips
    }
}
