//! Admission control in front of the inference provider.
//!
//! [`RequestGate`] combines three guards over one shared [`GateState`]:
//! exponential backoff after rate-limit responses, a circuit breaker that
//! opens after `circuit_breaker_threshold` consecutive rate limits, and a
//! single-flight queue. A [`Ticket`] owns the state lock for the whole
//! provider round-trip, so concurrent callers wait in FIFO order (tokio's
//! mutex is fair) instead of fanning out.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::Instant;

use crate::config::GateConfig;

/// Source of "now" for the gate. Injected so tests can drive time by hand.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Clock backed by `tokio::time`, which honors paused test time.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Process-wide admission state.
///
/// Starts with `consecutive_failures = 0` and no open circuit. It lives as
/// long as the gate that owns it and is never reset implicitly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GateState {
    pub consecutive_failures: u32,
    pub circuit_open_until: Option<Instant>,
    pub last_request_at: Option<Instant>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateRejection {
    #[error("circuit breaker open, retry in {}s", remaining.as_secs().max(1))]
    CircuitOpen { remaining: Duration },

    #[error("rate limited, retry in {wait_seconds}s")]
    RateLimited { wait_seconds: u64 },
}

impl GateRejection {
    /// Estimated wait before a new attempt could be admitted.
    pub fn wait(&self) -> Duration {
        match self {
            GateRejection::CircuitOpen { remaining } => *remaining,
            GateRejection::RateLimited { wait_seconds } => Duration::from_secs(*wait_seconds),
        }
    }
}

/// `min(base * 2^n, cap)` without overflowing.
pub fn exponential_delay(base_ms: u64, n: u32, cap_ms: u64) -> Duration {
    let factor = 1u64.checked_shl(n).unwrap_or(u64::MAX);
    Duration::from_millis(base_ms.saturating_mul(factor).min(cap_ms))
}

#[derive(Clone)]
pub struct RequestGate {
    state: Arc<Mutex<GateState>>,
    config: Arc<GateConfig>,
    clock: Arc<dyn Clock>,
}

impl RequestGate {
    pub fn new(config: GateConfig) -> Self {
        Self::with_clock(config, Arc::new(TokioClock))
    }

    pub fn with_clock(config: GateConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(GateState::default())),
            config: Arc::new(config),
            clock,
        }
    }

    /// Wait for any outstanding ticket, then admit or reject.
    ///
    /// Rejections are never retried here; the caller decides.
    pub async fn admit(&self) -> Result<Ticket, GateRejection> {
        let mut state = self.state.clone().lock_owned().await;
        let now = self.clock.now();

        if let Some(until) = state.circuit_open_until {
            if now < until {
                let remaining = until - now;
                tracing::warn!(
                    remaining_ms = remaining.as_millis() as u64,
                    failures = state.consecutive_failures,
                    "Gate rejected: circuit open",
                );
                return Err(GateRejection::CircuitOpen { remaining });
            }
            tracing::info!("Circuit breaker window expired");
            state.circuit_open_until = None;
        }

        if state.consecutive_failures > 0
            && let Some(last) = state.last_request_at
        {
            let delay = self.backoff_delay(state.consecutive_failures);
            let elapsed = now.saturating_duration_since(last);
            if elapsed < delay {
                let wait = delay - elapsed;
                let wait_seconds = wait.as_millis().div_ceil(1000) as u64;
                tracing::warn!(
                    wait_seconds,
                    failures = state.consecutive_failures,
                    "Gate rejected: backing off after rate limit",
                );
                return Err(GateRejection::RateLimited { wait_seconds });
            }
        }

        state.last_request_at = Some(now);
        tracing::debug!(failures = state.consecutive_failures, "Gate admitted request");
        Ok(Ticket {
            state,
            config: self.config.clone(),
            clock: self.clock.clone(),
        })
    }

    /// `min(min_request_interval * 2^n + jitter, max_backoff)`.
    pub fn backoff_delay(&self, failures: u32) -> Duration {
        let jitter = if self.config.jitter_ms > 0 {
            rand::random_range(0..=self.config.jitter_ms)
        } else {
            0
        };
        let base = exponential_delay(self.config.min_request_interval_ms, failures, u64::MAX);
        (base + Duration::from_millis(jitter)).min(Duration::from_millis(self.config.max_backoff_ms))
    }

    /// Copy of the current state. Waits for any outstanding ticket.
    pub async fn snapshot(&self) -> GateState {
        *self.state.lock().await
    }
}

/// Permission for exactly one provider round-trip. Holding it blocks every
/// other `admit` call; dropping it releases the queue.
pub struct Ticket {
    state: OwnedMutexGuard<GateState>,
    config: Arc<GateConfig>,
    clock: Arc<dyn Clock>,
}

impl Ticket {
    /// The provider accepted a request: clear failures and close the circuit.
    pub fn record_success(&mut self) {
        if self.state.consecutive_failures > 0 || self.state.circuit_open_until.is_some() {
            tracing::info!(
                previous_failures = self.state.consecutive_failures,
                "Provider recovered, resetting gate",
            );
        }
        self.state.consecutive_failures = 0;
        self.state.circuit_open_until = None;
    }

    /// The provider answered 429. Returns the breaker window if this
    /// failure opened (or extended) the circuit.
    pub fn record_rate_limited(&mut self) -> Option<Duration> {
        self.state.consecutive_failures = self.state.consecutive_failures.saturating_add(1);
        let failures = self.state.consecutive_failures;

        if failures < self.config.circuit_breaker_threshold {
            tracing::warn!(failures, "Provider rate limited");
            return None;
        }

        let window = exponential_delay(
            self.config.circuit_breaker_base_ms,
            failures,
            self.config.max_circuit_breaker_ms,
        );
        self.state.circuit_open_until = Some(self.clock.now() + window);
        tracing::error!(
            failures,
            window_ms = window.as_millis() as u64,
            "Circuit breaker opened",
        );
        Some(window)
    }

    pub fn state(&self) -> GateState {
        *self.state
    }
}
