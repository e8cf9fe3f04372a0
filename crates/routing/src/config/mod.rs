//! Configuration snapshot consumed by the router.
//!
//! Loading (YAML parsing, environment substitution) happens outside this
//! crate. These types describe the immutable snapshot handed over at
//! startup; the core never mutates it, and a provider removed from
//! configuration simply disappears from routing on the next restart.

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::models::GLOBAL_MARKET;

const DEFAULT_RATE_LIMIT: u32 = 1000;
const DEFAULT_TIMEOUT_MS: u64 = 2000;

fn default_rate_limit() -> u32 {
    DEFAULT_RATE_LIMIT
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_enabled() -> bool {
    true
}

/// A single upstream provider definition.
///
/// Read-only to the core; shared as `Arc<ProviderConfig>` between the
/// registry, selector, and transport.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    /// Unique key for this provider; all per-provider state hangs off it.
    pub name: String,
    /// Base URL the transport prepends to endpoints.
    pub base_url: String,
    /// API credential attached as a bearer token by the transport.
    #[serde(default)]
    pub credential: String,
    /// Asset kinds this provider can serve ("equity", "crypto", ...).
    #[serde(default)]
    pub asset_kinds: HashSet<String>,
    /// Markets covered; the "Global" wildcard matches every market.
    #[serde(default)]
    pub markets: HashSet<String>,
    /// Higher values are preferred by the selector.
    #[serde(default)]
    pub priority: i32,
    /// Successful dispatches allowed per quota window.
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_window: u32,
    /// Per-request timeout unless the request overrides it.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl ProviderConfig {
    /// The provider-level timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Whether this provider serves the given asset kind and market.
    pub fn supports(&self, asset_kind: &str, market: &str) -> bool {
        self.asset_kinds.contains(asset_kind)
            && (self.markets.contains(market) || self.markets.contains(GLOBAL_MARKET))
    }
}

/// Circuit breaker thresholds, shared by every provider's breaker.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BreakerSettings {
    /// Error percentage above which a closed circuit opens.
    pub error_threshold_percentage: f64,
    /// Minimum lifetime requests before the error rate is trusted.
    pub request_volume_threshold: u64,
    /// How long an open circuit blocks before testing recovery.
    pub open_state_timeout_seconds: u64,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            error_threshold_percentage: 30.0,
            request_volume_threshold: 20,
            open_state_timeout_seconds: 60,
        }
    }
}

/// Cache defaults. The TTL is short because market data goes stale fast.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheSettings {
    /// Time-to-live applied to cached responses.
    pub default_ttl_seconds: u64,
    /// Upper bound on in-process cache entries.
    pub max_entries: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            default_ttl_seconds: 10,
            max_entries: 10_000,
        }
    }
}

impl CacheSettings {
    /// The default TTL as a [`Duration`].
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_seconds)
    }
}

/// The full immutable snapshot handed to the router at startup.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouterSettings {
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    #[serde(default)]
    pub circuit_breaker: BreakerSettings,
    #[serde(default)]
    pub cache: CacheSettings,
}

impl RouterSettings {
    /// Validate the snapshot. Failures abort router construction.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.providers.is_empty() {
            return Err(ConfigError::NoProviders);
        }
        let mut seen = HashSet::new();
        for provider in &self.providers {
            if !seen.insert(provider.name.as_str()) {
                return Err(ConfigError::DuplicateProvider(provider.name.clone()));
            }
            if provider.base_url.is_empty() {
                return Err(ConfigError::EmptyBaseUrl(provider.name.clone()));
            }
        }
        Ok(())
    }
}
