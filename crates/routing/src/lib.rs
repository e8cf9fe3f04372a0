//! Tickergrid Routing Crate
//!
//! Multi-provider request routing for the Tickergrid market data backend.
//! Every outbound market-data request goes through the router, which decides
//! which upstream provider to use, tracks per-provider health and quota,
//! trips and resets circuit breakers, retries across alternate providers on
//! failure, and caches successful responses.
//!
//! # Architecture
//!
//! ```text
//! +------------------+     +------------------+
//! |  RequestRouter   | --> | ProviderSelector |  (filter + rank)
//! +------------------+     +------------------+
//!         |                        |
//!         |                        v
//!         |               +------------------+
//!         |               | ProviderRegistry |  (read-only catalog)
//!         |               +------------------+
//!         |                        |
//!         v                        v
//! +------------------+     +------------------+
//! |   CacheLayer     |     | Stats + Breaker  |  (per-provider state)
//! +------------------+     +------------------+
//!         |                        ^
//!         v                        |
//! +------------------+     +------------------+
//! |    Transport     |     |  HealthMonitor   |  (probe + sweep timers)
//! +------------------+     +------------------+
//! ```
//!
//! # Core Types
//!
//! - [`RequestRouter`] - dispatch orchestration with retry-with-exclusion
//! - [`ProviderRegistry`] - immutable-after-load provider catalog
//! - [`StatsTracker`] / [`CircuitBreaker`] - shared per-provider state
//! - [`ProviderSelector`] - candidate filtering and ranking
//! - [`CacheStore`] / [`MemoryCache`] - pluggable TTL cache
//! - [`Transport`] / [`HttpTransport`] - provider call seam
//! - [`HealthMonitor`] - background probing with an explicit lifecycle
//!
//! The router owns no background work: construct it, optionally build a
//! [`HealthMonitor`] from it, and start/stop the monitor explicitly.

pub mod cache;
pub mod config;
pub mod errors;
pub mod models;
pub mod monitor;
pub mod registry;
pub mod router;
pub mod transport;

// Re-export configuration types
pub use config::{BreakerSettings, CacheSettings, ProviderConfig, RouterSettings};

// Re-export error types
pub use errors::{CacheError, ConfigError, RouterError, TransportError};

// Re-export shared models
pub use models::{HealthStatus, ResponseSource, GLOBAL_MARKET};

// Re-export cache types
pub use cache::{CacheStore, MemoryCache};

// Re-export transport types
pub use transport::{HttpMethod, HttpTransport, RequestOptions, Transport};

// Re-export registry types
pub use registry::{
    BreakerState, CircuitBreaker, CircuitState, ProviderRegistry, ProviderSelector, ProviderStats,
    StatsTracker,
};

// Re-export router and monitor types
pub use monitor::HealthMonitor;
pub use router::{
    ConfigurationView, OverallStatus, ProviderStatus, ProviderSummary, RequestCriteria,
    RequestRouter, RouteOutcome, RouterStatus,
};
