//! Outbound transport to upstream providers.
//!
//! The router treats transport as a seam: anything implementing
//! [`Transport`] can carry requests, which is also how tests substitute
//! scripted responses. [`HttpTransport`] is the production implementation;
//! it attaches the provider's bearer credential, honors per-request timeout
//! overrides, and fails on non-2xx responses. Dropping the returned future
//! cancels the in-flight request.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method};
use serde_json::Value;
use tracing::{debug, warn};
use urlencoding::encode;

use crate::config::ProviderConfig;
use crate::errors::TransportError;

/// HTTP method for a dispatched request.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    /// Uppercase wire name, also used in cache key canonicalization.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }

    fn as_reqwest(self) -> Method {
        match self {
            Self::Get => Method::GET,
            Self::Post => Method::POST,
            Self::Put => Method::PUT,
            Self::Delete => Method::DELETE,
        }
    }
}

/// Per-request options forwarded to the provider call.
#[derive(Clone, Debug, Default)]
pub struct RequestOptions {
    pub method: HttpMethod,
    /// Query parameters; ordered so the cache key stays deterministic.
    pub query: BTreeMap<String, String>,
    /// Extra headers beyond the authorization header the transport adds.
    pub headers: Vec<(String, String)>,
    /// JSON body, sent as-is.
    pub body: Option<Value>,
    /// Overrides the provider's configured timeout when set.
    pub timeout: Option<Duration>,
}

/// One network call against one provider.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform the call. Implementations must honor the effective timeout
    /// and return an error for non-2xx responses.
    async fn send(
        &self,
        provider: &ProviderConfig,
        endpoint: &str,
        options: &RequestOptions,
    ) -> Result<Value, TransportError>;
}

/// Production HTTP transport backed by a shared reqwest client.
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    fn build_url(provider: &ProviderConfig, endpoint: &str, query: &BTreeMap<String, String>) -> String {
        let mut url = format!("{}{}", provider.base_url, endpoint);
        if !query.is_empty() {
            let pairs: Vec<String> = query
                .iter()
                .map(|(key, value)| format!("{}={}", encode(key), encode(value)))
                .collect();
            url.push('?');
            url.push_str(&pairs.join("&"));
        }
        url
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        provider: &ProviderConfig,
        endpoint: &str,
        options: &RequestOptions,
    ) -> Result<Value, TransportError> {
        let timeout = options.timeout.unwrap_or_else(|| provider.timeout());
        let url = Self::build_url(provider, endpoint, &options.query);

        debug!("Sending {} {} via '{}'", options.method.as_str(), url, provider.name);

        let mut request = self
            .client
            .request(options.method.as_reqwest(), &url)
            .timeout(timeout)
            .header(AUTHORIZATION, format!("Bearer {}", provider.credential))
            .header(CONTENT_TYPE, "application/json");

        for (name, value) in &options.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        if let Some(body) = &options.body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|err| {
            if err.is_timeout() {
                TransportError::Timeout { timeout }
            } else if err.is_builder() {
                TransportError::InvalidUrl(url.clone())
            } else {
                TransportError::Network(err)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            warn!("Provider '{}' answered {} for {}", provider.name, status, endpoint);
            return Err(TransportError::Status {
                status: status.as_u16(),
                message,
            });
        }

        response.json::<Value>().await.map_err(TransportError::Network)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> ProviderConfig {
        ProviderConfig {
            name: "finnhub".to_string(),
            base_url: "https://finnhub.io/api/v1".to_string(),
            credential: "secret".to_string(),
            asset_kinds: ["equity".to_string()].into(),
            markets: ["US".to_string()].into(),
            priority: 0,
            rate_limit_per_window: 60,
            timeout_ms: 2000,
            enabled: true,
        }
    }

    #[test]
    fn test_build_url_without_query() {
        let url = HttpTransport::build_url(&provider(), "/quote", &BTreeMap::new());
        assert_eq!(url, "https://finnhub.io/api/v1/quote");
    }

    #[test]
    fn test_build_url_encodes_query_in_sorted_order() {
        let mut query = BTreeMap::new();
        query.insert("symbol".to_string(), "BRK B".to_string());
        query.insert("range".to_string(), "1d".to_string());

        let url = HttpTransport::build_url(&provider(), "/quote", &query);
        assert_eq!(
            url,
            "https://finnhub.io/api/v1/quote?range=1d&symbol=BRK%20B"
        );
    }

    #[test]
    fn test_method_names() {
        assert_eq!(HttpMethod::Get.as_str(), "GET");
        assert_eq!(HttpMethod::Post.as_str(), "POST");
        assert_eq!(HttpMethod::default(), HttpMethod::Get);
    }
}
