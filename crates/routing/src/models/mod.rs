//! Shared enums and constants used across the routing crate.

use serde::Serialize;

/// Market wildcard accepted by providers that serve every venue.
pub const GLOBAL_MARKET: &str = "Global";

/// Provider health as observed by the background prober.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Never probed since startup.
    #[default]
    Unknown,
    /// Last probe succeeded.
    Healthy,
    /// Last probe failed.
    Unhealthy,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Healthy => write!(f, "healthy"),
            Self::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Where a dispatched response came from.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseSource {
    /// Served from the cache without touching the provider.
    Cache,
    /// Fetched live from the provider.
    Api,
}

impl std::fmt::Display for ResponseSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cache => write!(f, "cache"),
            Self::Api => write!(f, "api"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_status_display() {
        assert_eq!(HealthStatus::Unknown.to_string(), "unknown");
        assert_eq!(HealthStatus::Healthy.to_string(), "healthy");
        assert_eq!(HealthStatus::Unhealthy.to_string(), "unhealthy");
    }

    #[test]
    fn test_response_source_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&ResponseSource::Cache).unwrap(),
            "\"cache\""
        );
        assert_eq!(
            serde_json::to_string(&ResponseSource::Api).unwrap(),
            "\"api\""
        );
    }
}
