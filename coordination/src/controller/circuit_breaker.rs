//! Per-target circuit breaker (spec §4.7), generalizing the
//! per-`ModelId` breaker `router::circuit_breaker::CircuitBreaker` to an
//! arbitrary `String` dispatch target and adding an explicit half-open
//! probe-success counter the original model-routing use case didn't need.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[derive(Debug, Clone)]
struct TargetState {
    consecutive_failures: u32,
    last_failure_secs: u64,
    half_open_successes: u32,
    rate_limit_hits: u32,
    rate_limit_until: u64,
}

impl Default for TargetState {
    fn default() -> Self {
        Self {
            consecutive_failures: 0,
            last_failure_secs: 0,
            half_open_successes: 0,
            rate_limit_hits: 0,
            rate_limit_until: 0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub reset_timeout_secs: u64,
    pub half_open_success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            reset_timeout_secs: 60,
            half_open_success_threshold: 1,
        }
    }
}

/// Hystrix-style breaker keyed by dispatch target (e.g. an agent type or
/// a worker id) rather than a model id.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    targets: HashMap<String, TargetState>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            targets: HashMap::new(),
            config,
        }
    }

    pub fn record_success(&mut self, target: &str) {
        let state = self.targets.entry(target.to_string()).or_default();
        match self.raw_state(state) {
            CircuitState::HalfOpen => {
                state.half_open_successes += 1;
                if state.half_open_successes >= self.config.half_open_success_threshold {
                    *state = TargetState::default();
                }
            }
            _ => *state = TargetState::default(),
        }
    }

    pub fn record_failure(&mut self, target: &str) {
        let state = self.targets.entry(target.to_string()).or_default();
        state.consecutive_failures += 1;
        state.last_failure_secs = unix_now();
        state.half_open_successes = 0;
    }

    /// Exponential backoff adaptive to consecutive rate-limit hits,
    /// doubling each time and capping at 120s (same cadence as the
    /// teacher's `record_rate_limit`).
    pub fn record_rate_limit(&mut self, target: &str) {
        let state = self.targets.entry(target.to_string()).or_default();
        state.rate_limit_hits += 1;
        let cooldown = 2u64.saturating_mul(2u64.saturating_pow(state.rate_limit_hits.saturating_sub(1))).min(120);
        state.rate_limit_until = unix_now() + cooldown;
        state.consecutive_failures += 1;
        state.last_failure_secs = unix_now();
        state.half_open_successes = 0;
    }

    pub fn state(&self, target: &str) -> CircuitState {
        match self.targets.get(target) {
            Some(state) => self.raw_state(state),
            None => CircuitState::Closed,
        }
    }

    fn raw_state(&self, state: &TargetState) -> CircuitState {
        let now = unix_now();
        if now < state.rate_limit_until {
            return CircuitState::Open;
        }
        if state.consecutive_failures < self.config.failure_threshold {
            return CircuitState::Closed;
        }
        if now.saturating_sub(state.last_failure_secs) >= self.config.reset_timeout_secs {
            CircuitState::HalfOpen
        } else {
            CircuitState::Open
        }
    }

    pub fn is_available(&self, target: &str) -> bool {
        !matches!(self.state(target), CircuitState::Open)
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_closed() {
        let cb = CircuitBreaker::default();
        assert_eq!(cb.state("agent-a"), CircuitState::Closed);
    }

    #[test]
    fn opens_after_threshold_failures() {
        let mut cb = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 2,
            reset_timeout_secs: 9999,
            half_open_success_threshold: 1,
        });
        cb.record_failure("agent-a");
        assert_eq!(cb.state("agent-a"), CircuitState::Closed);
        cb.record_failure("agent-a");
        assert_eq!(cb.state("agent-a"), CircuitState::Open);
    }

    #[test]
    fn half_open_after_reset_timeout() {
        let mut cb = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 1,
            reset_timeout_secs: 0,
            half_open_success_threshold: 1,
        });
        cb.record_failure("agent-a");
        assert_eq!(cb.state("agent-a"), CircuitState::HalfOpen);
    }

    #[test]
    fn half_open_needs_success_threshold_before_closing() {
        let mut cb = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 1,
            reset_timeout_secs: 0,
            half_open_success_threshold: 2,
        });
        cb.record_failure("agent-a");
        assert_eq!(cb.state("agent-a"), CircuitState::HalfOpen);
        cb.record_success("agent-a");
        assert_eq!(cb.state("agent-a"), CircuitState::HalfOpen);
        cb.record_success("agent-a");
        assert_eq!(cb.state("agent-a"), CircuitState::Closed);
    }

    #[test]
    fn rate_limit_opens_circuit_immediately() {
        let mut cb = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 10,
            reset_timeout_secs: 9999,
            half_open_success_threshold: 1,
        });
        cb.record_rate_limit("agent-a");
        assert_eq!(cb.state("agent-a"), CircuitState::Open);
        assert!(!cb.is_available("agent-a"));
    }
}
