//! Error types for the routing crate.
//!
//! The taxonomy follows the propagation policy: only [`RouterError`] crosses
//! the dispatch boundary. Transport failures are absorbed by the
//! retry-with-exclusion loop and surface, at most, wrapped inside
//! [`RouterError::AllProvidersFailed`]. Cache failures never propagate at
//! all; a broken cache degrades to a miss.

use std::time::Duration;

use thiserror::Error;

/// Errors raised while validating the provider configuration snapshot.
///
/// These are fatal at startup: the router refuses to construct.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The snapshot contains no providers at all.
    #[error("no providers configured")]
    NoProviders,

    /// Two providers share the same name. Names key all per-provider state.
    #[error("duplicate provider name: {0}")]
    DuplicateProvider(String),

    /// A provider was configured without a base URL.
    #[error("provider '{0}' has an empty base URL")]
    EmptyBaseUrl(String),
}

/// Errors raised by a single transport attempt against one provider.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The provider answered with a non-2xx status.
    #[error("HTTP {status}: {message}")]
    Status {
        /// The HTTP status code returned by the provider.
        status: u16,
        /// Response body text, if any.
        message: String,
    },

    /// The request exceeded its timeout budget.
    /// Treated identically to a failure for stats and breaker purposes.
    #[error("request timed out after {timeout:?}")]
    Timeout {
        /// The effective timeout that was exceeded.
        timeout: Duration,
    },

    /// The provider base URL and endpoint did not form a usable request URL.
    #[error("invalid request URL: {0}")]
    InvalidUrl(String),

    /// Connection-level failure talking to the provider.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

/// Errors raised by a cache backend.
///
/// Callers inside the router log these and move on; caching is a
/// performance optimization, not a correctness requirement.
#[derive(Error, Debug)]
pub enum CacheError {
    /// The backend rejected or failed the operation.
    #[error("cache backend error: {0}")]
    Backend(String),
}

/// Errors that cross the dispatch boundary.
#[derive(Error, Debug)]
pub enum RouterError {
    /// The configuration snapshot failed validation at startup.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// No enabled provider matches the request criteria right now.
    /// Expected and recoverable; surface as service-unavailable upstream.
    #[error("no provider available for asset kind '{asset_kind}' in market '{market}'")]
    NoProviderAvailable {
        /// Asset kind that was requested.
        asset_kind: String,
        /// Market that was requested.
        market: String,
    },

    /// The retry budget is spent and every attempted provider failed.
    #[error("all providers failed, last attempt via '{provider}'")]
    AllProvidersFailed {
        /// The last provider that was tried.
        provider: String,
        /// The error from that last attempt.
        #[source]
        source: TransportError,
    },
}
