//! Request orchestration: selection, cache lookup, transport, stats and
//! breaker bookkeeping, and cross-provider retry.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;
use serde_json::{json, Value};

use crate::cache::CacheStore;
use crate::config::{BreakerSettings, CacheSettings, RouterSettings};
use crate::errors::{RouterError, TransportError};
use crate::models::{HealthStatus, ResponseSource};
use crate::monitor::HealthMonitor;
use crate::registry::{
    CircuitBreaker, CircuitState, ProviderRegistry, ProviderSelector, ProviderTable, StatsTracker,
};
use crate::transport::{RequestOptions, Transport};

/// Attempt budget per dispatch call. Retry-with-exclusion guarantees at most
/// one attempt per provider, so total attempts are bounded by this budget
/// regardless of how many providers are configured.
const MAX_ATTEMPTS: usize = 3;

/// What the caller is asking for.
#[derive(Clone, Debug)]
pub struct RequestCriteria {
    pub asset_kind: String,
    pub market: String,
    pub options: RequestOptions,
}

impl Default for RequestCriteria {
    fn default() -> Self {
        Self {
            asset_kind: "equity".to_string(),
            market: "US".to_string(),
            options: RequestOptions::default(),
        }
    }
}

/// Successful dispatch result with provenance.
#[derive(Clone, Debug, Serialize)]
pub struct RouteOutcome {
    pub data: Value,
    pub provider_used: String,
    pub source: ResponseSource,
    pub latency_ms: u64,
    /// Present only when the response came from a live provider call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quota_remaining: Option<u32>,
}

/// Aggregate service state derived from per-provider breaker states.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallStatus {
    /// At least one enabled provider has a closed circuit.
    Operational,
    Degraded,
}

/// One row of the status snapshot.
#[derive(Clone, Debug, Serialize)]
pub struct ProviderStatus {
    pub name: String,
    pub enabled: bool,
    pub priority: i32,
    pub markets: Vec<String>,
    pub circuit_breaker_state: CircuitState,
    pub total_requests: u64,
    pub success_rate: f64,
    pub avg_latency_ms: u64,
    pub quota_remaining: u32,
    pub last_request_at: Option<DateTime<Utc>>,
    pub health_status: HealthStatus,
}

/// Read-only snapshot for status and metrics consumers.
#[derive(Clone, Debug, Serialize)]
pub struct RouterStatus {
    pub overall_status: OverallStatus,
    pub providers: Vec<ProviderStatus>,
    pub timestamp: DateTime<Utc>,
}

/// Provider summary without credentials, for diagnostics.
#[derive(Clone, Debug, Serialize)]
pub struct ProviderSummary {
    pub name: String,
    pub enabled: bool,
    pub priority: i32,
    pub asset_kinds: Vec<String>,
    pub markets: Vec<String>,
}

/// Effective configuration view for diagnostics.
#[derive(Clone, Debug, Serialize)]
pub struct ConfigurationView {
    pub providers: Vec<ProviderSummary>,
    pub circuit_breaker: BreakerSettings,
    pub cache: CacheSettings,
    pub timestamp: DateTime<Utc>,
}

/// Multi-provider request router.
///
/// Owns the provider catalog and the shared per-provider state; dispatches
/// requests through the configured transport with cache-first semantics and
/// cross-provider retry.
pub struct RequestRouter {
    registry: Arc<ProviderRegistry>,
    table: Arc<ProviderTable>,
    stats: StatsTracker,
    breaker: CircuitBreaker,
    selector: ProviderSelector,
    transport: Arc<dyn Transport>,
    cache: Arc<dyn CacheStore>,
    cache_settings: CacheSettings,
    breaker_settings: BreakerSettings,
}

impl RequestRouter {
    /// Build a router from a validated configuration snapshot.
    ///
    /// Validation failures are fatal; nothing is spawned here. Background
    /// monitoring starts only when the caller starts a [`HealthMonitor`].
    pub fn new(
        settings: RouterSettings,
        transport: Arc<dyn Transport>,
        cache: Arc<dyn CacheStore>,
    ) -> Result<Self, RouterError> {
        let registry = Arc::new(ProviderRegistry::from_settings(&settings)?);
        let table = Arc::new(ProviderTable::new(registry.list()));
        let stats = StatsTracker::new(Arc::clone(&table));
        let breaker = CircuitBreaker::new(Arc::clone(&table), settings.circuit_breaker.clone());
        let selector = ProviderSelector::new(Arc::clone(&registry), Arc::clone(&table));

        info!("Request router initialized with {} providers", registry.len());

        Ok(Self {
            registry,
            table,
            stats,
            breaker,
            selector,
            transport,
            cache,
            cache_settings: settings.cache,
            breaker_settings: settings.circuit_breaker,
        })
    }

    /// The stats tracker shared with this router.
    pub fn stats(&self) -> &StatsTracker {
        &self.stats
    }

    /// The circuit breaker shared with this router.
    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// The provider catalog.
    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Build a health monitor over this router's shared state. The caller
    /// owns its lifecycle: nothing runs until `start()`.
    pub fn monitor(&self) -> HealthMonitor {
        HealthMonitor::new(
            Arc::clone(&self.registry),
            self.stats.clone(),
            self.breaker.clone(),
            Arc::clone(&self.transport),
        )
    }

    /// Route one request to the best available provider.
    ///
    /// Up to three attempts across distinct providers; a provider that fails
    /// is excluded from the rest of this call. Selection returning no
    /// candidate is terminal at any attempt and surfaces as
    /// [`RouterError::NoProviderAvailable`]. When the budget is spent, the
    /// last transport error comes back inside
    /// [`RouterError::AllProvidersFailed`].
    pub async fn dispatch(
        &self,
        endpoint: &str,
        criteria: RequestCriteria,
    ) -> Result<RouteOutcome, RouterError> {
        let mut excluded: HashSet<String> = HashSet::new();
        let mut last_failure: Option<(String, TransportError)> = None;

        for attempt in 1..=MAX_ATTEMPTS {
            let Some(provider) =
                self.selector
                    .choose(&criteria.asset_kind, &criteria.market, &excluded)
            else {
                return Err(RouterError::NoProviderAvailable {
                    asset_kind: criteria.asset_kind.clone(),
                    market: criteria.market.clone(),
                });
            };
            let name = provider.name.clone();
            let started = Instant::now();

            self.stats.record_attempt(&name);

            let key = cache_key(&name, endpoint, &criteria.options);
            match self.cache.get(&key).await {
                Ok(Some(data)) => {
                    debug!("Cache hit for {} via '{}'", endpoint, name);
                    return Ok(RouteOutcome {
                        data,
                        provider_used: name,
                        source: ResponseSource::Cache,
                        latency_ms: started.elapsed().as_millis() as u64,
                        quota_remaining: None,
                    });
                }
                Ok(None) => {}
                Err(err) => debug!("Cache read failed, treating as miss: {}", err),
            }

            match self
                .transport
                .send(&provider, endpoint, &criteria.options)
                .await
            {
                Ok(data) => {
                    let latency_ms = started.elapsed().as_millis() as u64;
                    self.stats.record_success(&name, latency_ms);
                    self.breaker.on_success(&name);

                    if let Err(err) = self
                        .cache
                        .set(&key, data.clone(), self.cache_settings.ttl())
                        .await
                    {
                        debug!("Cache write failed: {}", err);
                    }

                    let quota_remaining =
                        self.stats.snapshot(&name).map(|stats| stats.quota_remaining);
                    info!("Dispatch succeeded via '{}' in {}ms", name, latency_ms);
                    return Ok(RouteOutcome {
                        data,
                        provider_used: name,
                        source: ResponseSource::Api,
                        latency_ms,
                        quota_remaining,
                    });
                }
                Err(err) => {
                    warn!(
                        "Dispatch attempt {}/{} failed via '{}': {}",
                        attempt, MAX_ATTEMPTS, name, err
                    );
                    self.stats.record_failure(&name, &err.to_string());
                    self.breaker.on_failure(&name);
                    excluded.insert(name.clone());
                    last_failure = Some((name, err));
                }
            }
        }

        match last_failure {
            Some((provider, source)) => Err(RouterError::AllProvidersFailed { provider, source }),
            // Unreachable with a positive attempt budget.
            None => Err(RouterError::NoProviderAvailable {
                asset_kind: criteria.asset_kind,
                market: criteria.market,
            }),
        }
    }

    /// Read-only snapshot for status and metrics consumers.
    pub fn status(&self) -> RouterStatus {
        let mut providers = Vec::with_capacity(self.registry.len());

        for config in self.registry.list() {
            let Some((stats, breaker_state)) = self
                .table
                .with_entry(&config.name, |entry| {
                    (entry.stats.clone(), entry.breaker.state)
                })
            else {
                continue;
            };

            let mut markets: Vec<String> = config.markets.iter().cloned().collect();
            markets.sort();

            providers.push(ProviderStatus {
                name: config.name.clone(),
                enabled: config.enabled,
                priority: config.priority,
                markets,
                circuit_breaker_state: breaker_state,
                total_requests: stats.total_requests,
                success_rate: stats.success_rate(),
                avg_latency_ms: stats.avg_latency_ms.round() as u64,
                quota_remaining: stats.quota_remaining,
                last_request_at: stats.last_request_at,
                health_status: stats.health_status,
            });
        }

        let operational = providers
            .iter()
            .any(|p| p.enabled && p.circuit_breaker_state == CircuitState::Closed);

        RouterStatus {
            overall_status: if operational {
                OverallStatus::Operational
            } else {
                OverallStatus::Degraded
            },
            providers,
            timestamp: Utc::now(),
        }
    }

    /// Read-only configuration view for diagnostics. Credentials stay out.
    pub fn configuration(&self) -> ConfigurationView {
        let providers = self
            .registry
            .list()
            .iter()
            .map(|config| {
                let mut asset_kinds: Vec<String> = config.asset_kinds.iter().cloned().collect();
                asset_kinds.sort();
                let mut markets: Vec<String> = config.markets.iter().cloned().collect();
                markets.sort();
                ProviderSummary {
                    name: config.name.clone(),
                    enabled: config.enabled,
                    priority: config.priority,
                    asset_kinds,
                    markets,
                }
            })
            .collect();

        ConfigurationView {
            providers,
            circuit_breaker: self.breaker_settings.clone(),
            cache: self.cache_settings.clone(),
            timestamp: Utc::now(),
        }
    }
}

/// Deterministic cache key: provider, endpoint, canonicalized parameters.
/// Query keys are pre-sorted and serde_json keeps object keys ordered, so
/// equal requests always produce equal keys.
fn cache_key(provider: &str, endpoint: &str, options: &RequestOptions) -> String {
    let params = json!({
        "method": options.method.as_str(),
        "query": options.query,
        "body": options.body,
    });
    format!("{}:{}:{}", provider, endpoint, params)
}
