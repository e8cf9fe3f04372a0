//! Background health monitoring.
//!
//! Two periodic tasks, decoupled from live traffic: a probe sweep that
//! exercises every enabled provider, and the circuit breaker sweep that
//! evaluates state transitions. Nothing runs at construction time - the
//! caller owns the lifecycle through `start()`/`stop()`, so tests can build
//! isolated instances without shared background timers. Dropping the
//! monitor stops both tasks.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use log::{debug, info, warn};
use tokio::task::JoinHandle;

use crate::config::ProviderConfig;
use crate::registry::{CircuitBreaker, ProviderRegistry, StatsTracker};
use crate::transport::{RequestOptions, Transport};

const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(300);
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Probes are lightweight; they get a short fixed timeout instead of the
/// provider's configured one.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const PROBE_ENDPOINT: &str = "/health";

/// Periodic prober and breaker sweeper over a router's shared state.
pub struct HealthMonitor {
    registry: Arc<ProviderRegistry>,
    stats: StatsTracker,
    breaker: CircuitBreaker,
    transport: Arc<dyn Transport>,
    probe_interval: Duration,
    sweep_interval: Duration,
    tasks: Vec<JoinHandle<()>>,
}

impl HealthMonitor {
    pub(crate) fn new(
        registry: Arc<ProviderRegistry>,
        stats: StatsTracker,
        breaker: CircuitBreaker,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            registry,
            stats,
            breaker,
            transport,
            probe_interval: DEFAULT_PROBE_INTERVAL,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            tasks: Vec::new(),
        }
    }

    /// Override the default intervals. Useful for tests and fast-moving
    /// deployments.
    pub fn with_intervals(mut self, probe_interval: Duration, sweep_interval: Duration) -> Self {
        self.probe_interval = probe_interval;
        self.sweep_interval = sweep_interval;
        self
    }

    /// Spawn the probe and sweep tasks. A no-op while already running.
    pub fn start(&mut self) {
        if !self.tasks.is_empty() {
            return;
        }

        let registry = Arc::clone(&self.registry);
        let stats = self.stats.clone();
        let transport = Arc::clone(&self.transport);
        let probe_interval = self.probe_interval;
        self.tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(probe_interval);
            // The first tick completes immediately; skip it so probes start
            // one interval after start(), not at startup.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                probe_all(&registry, &stats, transport.as_ref()).await;
            }
        }));

        let breaker = self.breaker.clone();
        let sweep_interval = self.sweep_interval;
        self.tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sweep_interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                breaker.sweep();
            }
        }));

        info!("Health monitoring started");
    }

    /// Halt both background tasks.
    pub fn stop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }

    /// Whether the background tasks are currently running.
    pub fn is_running(&self) -> bool {
        !self.tasks.is_empty()
    }

    /// Run one probe sweep immediately, outside the periodic schedule.
    pub async fn run_probe_sweep(&self) {
        probe_all(&self.registry, &self.stats, self.transport.as_ref()).await;
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Probe every enabled provider. Probes run concurrently and each handles
/// its own failure, so one bad provider never blocks the rest.
async fn probe_all(registry: &ProviderRegistry, stats: &StatsTracker, transport: &dyn Transport) {
    let probes = registry
        .list()
        .iter()
        .filter(|provider| provider.enabled)
        .map(|provider| probe_one(provider, stats, transport));
    join_all(probes).await;
}

async fn probe_one(provider: &Arc<ProviderConfig>, stats: &StatsTracker, transport: &dyn Transport) {
    let options = RequestOptions {
        timeout: Some(PROBE_TIMEOUT),
        ..Default::default()
    };
    let started = Instant::now();

    match transport.send(provider, PROBE_ENDPOINT, &options).await {
        Ok(_) => {
            let latency_ms = started.elapsed().as_millis() as u64;
            stats.record_probe_success(&provider.name, latency_ms);
            debug!("Health check OK for '{}' ({}ms)", provider.name, latency_ms);
        }
        Err(err) => {
            stats.record_probe_failure(&provider.name, &err.to_string());
            warn!("Health check failed for '{}': {}", provider.name, err);
        }
    }
}
