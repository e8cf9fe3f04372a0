//! Read-only catalog of configured providers.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{ProviderConfig, RouterSettings};
use crate::errors::ConfigError;

/// Immutable-after-load provider catalog.
///
/// Built once from the configuration snapshot; the rest of the crate only
/// reads it. Providers are kept in configuration order, which also anchors
/// the selector's stable sort.
pub struct ProviderRegistry {
    providers: Vec<Arc<ProviderConfig>>,
    by_name: HashMap<String, usize>,
}

impl ProviderRegistry {
    /// Build the catalog from a settings snapshot. Validation failures are
    /// fatal: the registry refuses to construct.
    pub fn from_settings(settings: &RouterSettings) -> Result<Self, ConfigError> {
        settings.validate()?;

        let providers: Vec<Arc<ProviderConfig>> =
            settings.providers.iter().cloned().map(Arc::new).collect();
        let by_name = providers
            .iter()
            .enumerate()
            .map(|(index, provider)| (provider.name.clone(), index))
            .collect();

        Ok(Self { providers, by_name })
    }

    /// All providers in configuration order.
    pub fn list(&self) -> &[Arc<ProviderConfig>] {
        &self.providers
    }

    /// Look up a provider by name.
    pub fn get(&self, name: &str) -> Option<&Arc<ProviderConfig>> {
        self.by_name.get(name).map(|&index| &self.providers[index])
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(name: &str) -> ProviderConfig {
        ProviderConfig {
            name: name.to_string(),
            base_url: "https://api.example.com".to_string(),
            credential: String::new(),
            asset_kinds: ["equity".to_string()].into(),
            markets: ["US".to_string()].into(),
            priority: 0,
            rate_limit_per_window: 100,
            timeout_ms: 2000,
            enabled: true,
        }
    }

    #[test]
    fn test_list_preserves_configuration_order() {
        let settings = RouterSettings {
            providers: vec![provider("first"), provider("second"), provider("third")],
            ..Default::default()
        };
        let registry = ProviderRegistry::from_settings(&settings).unwrap();

        let names: Vec<&str> = registry.list().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["first", "second", "third"]);
    }

    #[test]
    fn test_get_by_name() {
        let settings = RouterSettings {
            providers: vec![provider("polygon"), provider("finnhub")],
            ..Default::default()
        };
        let registry = ProviderRegistry::from_settings(&settings).unwrap();

        assert_eq!(registry.get("finnhub").unwrap().name, "finnhub");
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_invalid_settings_are_fatal() {
        let settings = RouterSettings::default();
        assert!(ProviderRegistry::from_settings(&settings).is_err());
    }
}
