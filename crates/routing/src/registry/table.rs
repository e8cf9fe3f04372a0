//! Shared per-provider mutable state.
//!
//! Each provider's stats and breaker state live in a single entry behind a
//! single mutex, so live traffic and the background sweeps can never
//! interleave partial updates for the same provider. The map itself is
//! immutable after startup, which keeps lookups lock-free and means
//! independent providers never contend with each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use log::warn;

use crate::config::ProviderConfig;

use super::circuit_breaker::BreakerState;
use super::stats::ProviderStats;

/// Mutable state for one provider: its stats and breaker as a unit.
#[derive(Debug)]
pub(crate) struct ProviderEntry {
    pub stats: ProviderStats,
    pub breaker: BreakerState,
    /// Configured quota ceiling, applied when the window rolls over.
    pub quota_limit: u32,
}

/// Fixed map of provider name to locked entry.
#[derive(Debug)]
pub(crate) struct ProviderTable {
    entries: HashMap<String, Mutex<ProviderEntry>>,
}

impl ProviderTable {
    pub fn new(providers: &[Arc<ProviderConfig>]) -> Self {
        let now = chrono::Utc::now();
        let entries = providers
            .iter()
            .map(|provider| {
                (
                    provider.name.clone(),
                    Mutex::new(ProviderEntry {
                        stats: ProviderStats::new(provider.rate_limit_per_window, now),
                        breaker: BreakerState::new(),
                        quota_limit: provider.rate_limit_per_window,
                    }),
                )
            })
            .collect();
        Self { entries }
    }

    /// Run `f` with the provider's entry locked. Returns `None` for unknown
    /// providers. Recovers from a poisoned lock; slightly stale counters
    /// beat a panic here.
    pub fn with_entry<T>(&self, name: &str, f: impl FnOnce(&mut ProviderEntry) -> T) -> Option<T> {
        let entry = self.entries.get(name)?;
        let mut guard = Self::lock_entry(name, entry);
        Some(f(&mut guard))
    }

    fn lock_entry<'a>(
        name: &str,
        entry: &'a Mutex<ProviderEntry>,
    ) -> MutexGuard<'a, ProviderEntry> {
        entry.lock().unwrap_or_else(|poisoned| {
            warn!("Provider state mutex for '{}' was poisoned, recovering", name);
            poisoned.into_inner()
        })
    }

    /// Names of every tracked provider.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
