//! Per-provider circuit breaker.
//!
//! Three states per provider:
//!
//! - **Closed**: normal operation, the provider is selectable.
//! - **Open**: the provider is excluded from selection unconditionally.
//! - **HalfOpen**: probation; the provider is selectable and successes
//!   count toward closing.
//!
//! Transitions out of Closed are evaluated on a periodic sweep over the
//! lifetime error rate, not per request, so a trip is bounded in latency by
//! the sweep period. The same applies in the other direction: a failure in
//! HalfOpen only bumps the failure counter, and the next sweep decides
//! whether the error-rate condition re-opens the circuit.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use log::{debug, info};
use serde::Serialize;

use crate::config::BreakerSettings;

use super::table::ProviderTable;

/// Successes required in HalfOpen before the circuit closes.
const HALF_OPEN_SUCCESS_THRESHOLD: u64 = 3;

/// Circuit breaker state.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "CLOSED"),
            Self::Open => write!(f, "OPEN"),
            Self::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Breaker fields for a single provider.
#[derive(Clone, Debug)]
pub struct BreakerState {
    pub state: CircuitState,
    pub failure_count: u64,
    /// Only meaningful while HalfOpen.
    pub success_count: u64,
    pub last_failure_at: Option<DateTime<Utc>>,
    /// Set while Open: when the circuit may test recovery.
    pub next_attempt_at: Option<DateTime<Utc>>,
}

impl BreakerState {
    pub(crate) fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            last_failure_at: None,
            next_attempt_at: None,
        }
    }
}

/// Sweep-driven circuit breaker over the shared provider table.
#[derive(Clone)]
pub struct CircuitBreaker {
    table: Arc<ProviderTable>,
    settings: BreakerSettings,
}

impl CircuitBreaker {
    pub(crate) fn new(table: Arc<ProviderTable>, settings: BreakerSettings) -> Self {
        Self { table, settings }
    }

    /// Evaluate transitions for every provider. The monitor calls this every
    /// 60 seconds; it can also be invoked directly.
    pub fn sweep(&self) {
        self.sweep_at(Utc::now());
    }

    pub(crate) fn sweep_at(&self, now: DateTime<Utc>) {
        for name in self.table.names() {
            self.table.with_entry(name, |entry| {
                let total = entry.stats.total_requests;
                let error_rate = if total > 0 {
                    entry.stats.failed_requests as f64 / total as f64 * 100.0
                } else {
                    0.0
                };
                let breaker = &mut entry.breaker;

                if breaker.state == CircuitState::Closed
                    && total >= self.settings.request_volume_threshold
                    && error_rate > self.settings.error_threshold_percentage
                {
                    breaker.state = CircuitState::Open;
                    breaker.success_count = 0;
                    breaker.next_attempt_at = Some(
                        now + Duration::seconds(self.settings.open_state_timeout_seconds as i64),
                    );
                    info!(
                        "Circuit breaker opened for '{}' (error rate {:.1}%)",
                        name, error_rate
                    );
                }

                if breaker.state == CircuitState::Open
                    && breaker.next_attempt_at.is_some_and(|at| now > at)
                {
                    breaker.state = CircuitState::HalfOpen;
                    breaker.success_count = 0;
                    info!("Circuit breaker half-open for '{}'", name);
                }

                if breaker.state == CircuitState::HalfOpen
                    && breaker.success_count >= HALF_OPEN_SUCCESS_THRESHOLD
                {
                    breaker.state = CircuitState::Closed;
                    breaker.failure_count = 0;
                    info!("Circuit breaker closed for '{}'", name);
                }
            });
        }
    }

    /// Request-path hook: a success while HalfOpen advances the close
    /// counter. No effect in other states.
    pub fn on_success(&self, provider: &str) {
        self.table.with_entry(provider, |entry| {
            if entry.breaker.state == CircuitState::HalfOpen {
                entry.breaker.success_count += 1;
                debug!(
                    "Half-open success {}/{} for '{}'",
                    entry.breaker.success_count, HALF_OPEN_SUCCESS_THRESHOLD, provider
                );
            }
        });
    }

    /// Request-path hook: count a failure. Re-opening, if warranted, happens
    /// on the next sweep.
    pub fn on_failure(&self, provider: &str) {
        self.table.with_entry(provider, |entry| {
            entry.breaker.failure_count += 1;
            entry.breaker.last_failure_at = Some(Utc::now());
        });
    }

    /// Current state for a provider, or `None` if unknown.
    pub fn state(&self, provider: &str) -> Option<CircuitState> {
        self.table.with_entry(provider, |entry| entry.breaker.state)
    }

    /// Full breaker fields for a provider.
    pub fn breaker_state(&self, provider: &str) -> Option<BreakerState> {
        self.table.with_entry(provider, |entry| entry.breaker.clone())
    }

    /// Manually close a provider's circuit and clear its counters.
    pub fn reset(&self, provider: &str) {
        self.table.with_entry(provider, |entry| {
            entry.breaker = BreakerState::new();
            info!("Circuit breaker manually reset for '{}'", provider);
        });
    }

    /// Reset every provider's circuit.
    pub fn reset_all(&self) {
        let names: Vec<String> = self.table.names().map(str::to_string).collect();
        for name in names {
            self.reset(&name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderConfig;

    fn breaker_over(names: &[&str]) -> CircuitBreaker {
        let configs: Vec<Arc<ProviderConfig>> = names
            .iter()
            .map(|name| {
                Arc::new(ProviderConfig {
                    name: name.to_string(),
                    base_url: "https://api.example.com".to_string(),
                    credential: String::new(),
                    asset_kinds: ["equity".to_string()].into(),
                    markets: ["US".to_string()].into(),
                    priority: 0,
                    rate_limit_per_window: 100,
                    timeout_ms: 2000,
                    enabled: true,
                })
            })
            .collect();
        CircuitBreaker::new(
            Arc::new(ProviderTable::new(&configs)),
            BreakerSettings::default(),
        )
    }

    fn seed_requests(breaker: &CircuitBreaker, name: &str, total: u64, failed: u64) {
        breaker.table.with_entry(name, |entry| {
            entry.stats.total_requests = total;
            entry.stats.failed_requests = failed;
            entry.stats.successful_requests = total - failed;
        });
    }

    #[test]
    fn test_volume_gate_blocks_low_traffic_trip() {
        let breaker = breaker_over(&["sparse"]);
        // 90% errors but below the 20-request volume threshold.
        seed_requests(&breaker, "sparse", 10, 9);

        breaker.sweep();
        assert_eq!(breaker.state("sparse"), Some(CircuitState::Closed));
    }

    #[test]
    fn test_error_rate_over_threshold_opens_circuit() {
        let breaker = breaker_over(&["flaky"]);
        // 35% > 30% threshold at sufficient volume.
        seed_requests(&breaker, "flaky", 20, 7);

        let now = Utc::now();
        breaker.sweep_at(now);

        let state = breaker.breaker_state("flaky").unwrap();
        assert_eq!(state.state, CircuitState::Open);
        assert_eq!(state.next_attempt_at, Some(now + Duration::seconds(60)));
    }

    #[test]
    fn test_exact_threshold_does_not_open() {
        let breaker = breaker_over(&["borderline"]);
        // Exactly 30% is not strictly above the threshold.
        seed_requests(&breaker, "borderline", 20, 6);

        breaker.sweep();
        assert_eq!(breaker.state("borderline"), Some(CircuitState::Closed));
    }

    #[test]
    fn test_open_transitions_to_half_open_after_timeout() {
        let breaker = breaker_over(&["recovering"]);
        seed_requests(&breaker, "recovering", 20, 10);

        let opened_at = Utc::now();
        breaker.sweep_at(opened_at);
        assert_eq!(breaker.state("recovering"), Some(CircuitState::Open));

        // Before the timeout nothing changes.
        breaker.sweep_at(opened_at + Duration::seconds(30));
        assert_eq!(breaker.state("recovering"), Some(CircuitState::Open));

        breaker.sweep_at(opened_at + Duration::seconds(61));
        assert_eq!(breaker.state("recovering"), Some(CircuitState::HalfOpen));
    }

    #[test]
    fn test_open_never_closes_without_half_open() {
        let breaker = breaker_over(&["direct"]);
        seed_requests(&breaker, "direct", 20, 10);

        let opened_at = Utc::now();
        breaker.sweep_at(opened_at);

        // Stale success count from a previous probation must not shortcut
        // Open -> Closed: the HalfOpen transition clears it first.
        breaker.table.with_entry("direct", |entry| {
            entry.breaker.success_count = 5;
        });

        breaker.sweep_at(opened_at + Duration::seconds(61));
        assert_eq!(breaker.state("direct"), Some(CircuitState::HalfOpen));
    }

    #[test]
    fn test_half_open_closes_after_three_successes() {
        let breaker = breaker_over(&["healing"]);
        breaker.table.with_entry("healing", |entry| {
            entry.breaker.state = CircuitState::HalfOpen;
            entry.breaker.failure_count = 12;
        });

        breaker.on_success("healing");
        breaker.on_success("healing");
        breaker.sweep();
        assert_eq!(breaker.state("healing"), Some(CircuitState::HalfOpen));

        breaker.on_success("healing");
        breaker.sweep();

        let state = breaker.breaker_state("healing").unwrap();
        assert_eq!(state.state, CircuitState::Closed);
        assert_eq!(state.failure_count, 0);
    }

    #[test]
    fn test_half_open_failure_waits_for_sweep() {
        let breaker = breaker_over(&["relapsing"]);
        seed_requests(&breaker, "relapsing", 20, 10);
        breaker.table.with_entry("relapsing", |entry| {
            entry.breaker.state = CircuitState::HalfOpen;
        });

        breaker.on_failure("relapsing");
        // State is untouched until the sweep runs.
        assert_eq!(breaker.state("relapsing"), Some(CircuitState::HalfOpen));
    }

    #[test]
    fn test_success_in_closed_state_is_ignored() {
        let breaker = breaker_over(&["steady"]);

        breaker.on_success("steady");
        let state = breaker.breaker_state("steady").unwrap();
        assert_eq!(state.success_count, 0);
    }

    #[test]
    fn test_manual_reset() {
        let breaker = breaker_over(&["stuck"]);
        seed_requests(&breaker, "stuck", 20, 15);
        breaker.sweep();
        assert_eq!(breaker.state("stuck"), Some(CircuitState::Open));

        breaker.reset("stuck");

        let state = breaker.breaker_state("stuck").unwrap();
        assert_eq!(state.state, CircuitState::Closed);
        assert_eq!(state.failure_count, 0);
        assert!(state.next_attempt_at.is_none());
    }

    #[test]
    fn test_provider_isolation() {
        let breaker = breaker_over(&["bad", "good"]);
        seed_requests(&breaker, "bad", 20, 15);

        breaker.sweep();

        assert_eq!(breaker.state("bad"), Some(CircuitState::Open));
        assert_eq!(breaker.state("good"), Some(CircuitState::Closed));
    }

    #[test]
    fn test_state_serializes_like_wire_format() {
        assert_eq!(
            serde_json::to_string(&CircuitState::HalfOpen).unwrap(),
            "\"HALF_OPEN\""
        );
        assert_eq!(CircuitState::Open.to_string(), "OPEN");
    }
}
