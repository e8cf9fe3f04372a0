//! Rolling per-provider request statistics.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use log::debug;

use crate::models::HealthStatus;

use super::table::ProviderTable;

/// Fixed wall-clock quota window. A provider that burns its quota early in
/// the window waits for the boundary; there is no sliding refill.
const QUOTA_WINDOW_SECS: i64 = 3600;

/// Counters and health fields for a single provider.
#[derive(Clone, Debug)]
pub struct ProviderStats {
    /// Lifetime dispatch attempts routed at this provider.
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    /// Decaying latency smoother: `avg' = (avg + sample) / 2`. Zero means no
    /// samples yet; the first sample lands at half its value because the
    /// seed is zero. Selection ordering depends on this exact behavior.
    pub avg_latency_ms: f64,
    pub last_request_at: Option<DateTime<Utc>>,
    /// Successful dispatches left in the current window.
    pub quota_remaining: u32,
    pub quota_resets_at: DateTime<Utc>,
    pub health_status: HealthStatus,
    pub last_health_check_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl ProviderStats {
    pub(crate) fn new(quota: u32, now: DateTime<Utc>) -> Self {
        Self {
            total_requests: 0,
            successful_requests: 0,
            failed_requests: 0,
            avg_latency_ms: 0.0,
            last_request_at: None,
            quota_remaining: quota,
            quota_resets_at: now + Duration::seconds(QUOTA_WINDOW_SECS),
            health_status: HealthStatus::Unknown,
            last_health_check_at: None,
            last_error: None,
        }
    }

    /// Lifetime error rate in `[0, 1]`; zero before any requests.
    pub fn error_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.failed_requests as f64 / self.total_requests as f64
        }
    }

    /// Success percentage for status reporting.
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.successful_requests as f64 / self.total_requests as f64 * 100.0
        }
    }

    pub(crate) fn smooth_latency(&mut self, sample_ms: f64) {
        self.avg_latency_ms = (self.avg_latency_ms + sample_ms) / 2.0;
    }

    /// Refill the quota when the window boundary has passed.
    pub(crate) fn replenish_if_due(&mut self, limit: u32, now: DateTime<Utc>) {
        if now >= self.quota_resets_at {
            self.quota_remaining = limit;
            self.quota_resets_at = now + Duration::seconds(QUOTA_WINDOW_SECS);
        }
    }
}

/// Records request and probe outcomes into the shared provider table.
#[derive(Clone)]
pub struct StatsTracker {
    table: Arc<ProviderTable>,
}

impl StatsTracker {
    pub(crate) fn new(table: Arc<ProviderTable>) -> Self {
        Self { table }
    }

    /// Count an attempt against the provider, before the outcome is known.
    pub fn record_attempt(&self, provider: &str) {
        let now = Utc::now();
        self.table.with_entry(provider, |entry| {
            entry.stats.replenish_if_due(entry.quota_limit, now);
            entry.stats.total_requests += 1;
            entry.stats.last_request_at = Some(now);
        });
    }

    /// Record a live success. Quota is consumed here, not on attempts.
    pub fn record_success(&self, provider: &str, latency_ms: u64) {
        self.table.with_entry(provider, |entry| {
            entry.stats.successful_requests += 1;
            entry.stats.smooth_latency(latency_ms as f64);
            entry.stats.quota_remaining = entry.stats.quota_remaining.saturating_sub(1);
            debug!(
                "Recorded success for '{}' ({}ms, quota {})",
                provider, latency_ms, entry.stats.quota_remaining
            );
        });
    }

    pub fn record_failure(&self, provider: &str, error: &str) {
        self.table.with_entry(provider, |entry| {
            entry.stats.failed_requests += 1;
            entry.stats.last_error = Some(error.to_string());
        });
    }

    /// Record a successful health probe. Probes feed the same latency
    /// smoother but never touch request counters or quota.
    pub fn record_probe_success(&self, provider: &str, latency_ms: u64) {
        let now = Utc::now();
        self.table.with_entry(provider, |entry| {
            entry.stats.health_status = HealthStatus::Healthy;
            entry.stats.last_health_check_at = Some(now);
            entry.stats.smooth_latency(latency_ms as f64);
        });
    }

    pub fn record_probe_failure(&self, provider: &str, error: &str) {
        let now = Utc::now();
        self.table.with_entry(provider, |entry| {
            entry.stats.health_status = HealthStatus::Unhealthy;
            entry.stats.last_health_check_at = Some(now);
            entry.stats.last_error = Some(error.to_string());
        });
    }

    /// Current stats for a provider, or `None` if unknown.
    pub fn snapshot(&self, provider: &str) -> Option<ProviderStats> {
        let now = Utc::now();
        self.table.with_entry(provider, |entry| {
            entry.stats.replenish_if_due(entry.quota_limit, now);
            entry.stats.clone()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderConfig;

    fn tracker(quota: u32) -> StatsTracker {
        let config = Arc::new(ProviderConfig {
            name: "iex".to_string(),
            base_url: "https://api.example.com".to_string(),
            credential: String::new(),
            asset_kinds: ["equity".to_string()].into(),
            markets: ["US".to_string()].into(),
            priority: 0,
            rate_limit_per_window: quota,
            timeout_ms: 2000,
            enabled: true,
        });
        StatsTracker::new(Arc::new(ProviderTable::new(&[config])))
    }

    #[test]
    fn test_latency_smoother_is_recency_biased() {
        let tracker = tracker(100);

        tracker.record_success("iex", 100);
        assert_eq!(tracker.snapshot("iex").unwrap().avg_latency_ms, 50.0);

        tracker.record_success("iex", 200);
        assert_eq!(tracker.snapshot("iex").unwrap().avg_latency_ms, 125.0);
    }

    #[test]
    fn test_quota_decrements_on_success_only() {
        let tracker = tracker(10);

        tracker.record_attempt("iex");
        tracker.record_failure("iex", "boom");
        assert_eq!(tracker.snapshot("iex").unwrap().quota_remaining, 10);

        tracker.record_attempt("iex");
        tracker.record_success("iex", 40);
        assert_eq!(tracker.snapshot("iex").unwrap().quota_remaining, 9);
    }

    #[test]
    fn test_quota_replenishes_after_window() {
        let tracker = tracker(5);
        tracker.record_attempt("iex");
        tracker.record_success("iex", 10);
        assert_eq!(tracker.snapshot("iex").unwrap().quota_remaining, 4);

        // Force the window boundary into the past.
        tracker.table.with_entry("iex", |entry| {
            entry.stats.quota_resets_at = Utc::now() - Duration::seconds(1);
        });

        assert_eq!(tracker.snapshot("iex").unwrap().quota_remaining, 5);
    }

    #[test]
    fn test_error_rate_zero_without_requests() {
        let tracker = tracker(10);
        assert_eq!(tracker.snapshot("iex").unwrap().error_rate(), 0.0);
    }

    #[test]
    fn test_probes_do_not_touch_request_counters() {
        let tracker = tracker(10);

        tracker.record_probe_success("iex", 80);

        let stats = tracker.snapshot("iex").unwrap();
        assert_eq!(stats.total_requests, 0);
        assert_eq!(stats.quota_remaining, 10);
        assert_eq!(stats.health_status, HealthStatus::Healthy);
        assert_eq!(stats.avg_latency_ms, 40.0);
        assert!(stats.last_health_check_at.is_some());
    }

    #[test]
    fn test_probe_failure_records_error() {
        let tracker = tracker(10);

        tracker.record_probe_failure("iex", "connection refused");

        let stats = tracker.snapshot("iex").unwrap();
        assert_eq!(stats.health_status, HealthStatus::Unhealthy);
        assert_eq!(stats.last_error.as_deref(), Some("connection refused"));
    }
}
