//! Provider selection: filter eligible candidates, rank, pick the first.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use log::debug;

use crate::config::ProviderConfig;

use super::circuit_breaker::CircuitState;
use super::providers::ProviderRegistry;
use super::table::ProviderTable;

/// Stand-in latency for providers with no samples yet, so they sort behind
/// measured providers on the latency tie-break without being excluded.
const LATENCY_SENTINEL_MS: f64 = 999_999.0;

/// Pure selection over the catalog and the shared per-provider state.
#[derive(Clone)]
pub struct ProviderSelector {
    registry: Arc<ProviderRegistry>,
    table: Arc<ProviderTable>,
}

impl ProviderSelector {
    pub(crate) fn new(registry: Arc<ProviderRegistry>, table: Arc<ProviderTable>) -> Self {
        Self { registry, table }
    }

    /// Pick the best provider for the request, or `None` when nothing
    /// qualifies. `None` is an expected outcome the caller must handle as
    /// "no provider available", not an exceptional condition.
    ///
    /// Filters: enabled, not excluded, asset kind supported, market covered
    /// (or the Global wildcard), circuit not Open, quota left.
    /// Ranking, each level a tie-break on the previous: priority descending,
    /// lifetime error rate ascending, smoothed latency ascending.
    pub fn choose(
        &self,
        asset_kind: &str,
        market: &str,
        excluded: &HashSet<String>,
    ) -> Option<Arc<ProviderConfig>> {
        let now = Utc::now();
        let mut candidates: Vec<(Arc<ProviderConfig>, f64, f64)> = Vec::new();

        for provider in self.registry.list() {
            if !provider.enabled
                || excluded.contains(&provider.name)
                || !provider.supports(asset_kind, market)
            {
                continue;
            }

            let ranking = self
                .table
                .with_entry(&provider.name, |entry| {
                    entry.stats.replenish_if_due(entry.quota_limit, now);
                    if entry.breaker.state == CircuitState::Open {
                        return None;
                    }
                    if entry.stats.quota_remaining == 0 {
                        return None;
                    }
                    let latency = if entry.stats.avg_latency_ms > 0.0 {
                        entry.stats.avg_latency_ms
                    } else {
                        LATENCY_SENTINEL_MS
                    };
                    Some((entry.stats.error_rate(), latency))
                })
                .flatten();

            if let Some((error_rate, latency)) = ranking {
                candidates.push((Arc::clone(provider), error_rate, latency));
            }
        }

        candidates.sort_by(|a, b| {
            b.0.priority
                .cmp(&a.0.priority)
                .then_with(|| a.1.total_cmp(&b.1))
                .then_with(|| a.2.total_cmp(&b.2))
        });

        let chosen = candidates.into_iter().next().map(|(provider, _, _)| provider);
        match &chosen {
            Some(provider) => debug!(
                "Selected provider '{}' for {}/{}",
                provider.name, asset_kind, market
            ),
            None => debug!("No provider available for {}/{}", asset_kind, market),
        }
        chosen
    }
}
