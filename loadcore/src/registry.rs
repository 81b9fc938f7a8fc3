//! [`ProviderRegistry`]: the process-wide, fingerprint-deduplicating map from
//! [`ProviderConfig`] to shared [`DataProvider`] instances (spec §4.1.5).
use std::sync::Arc;

use dashmap::DashMap;

use crate::config::ProviderConfig;
use crate::provider::DataProvider;

/// Deduplicates providers by config fingerprint so that every
/// [`crate::manager::DataManager`] bound to the same source+options shares
/// one [`DataProvider`] instance (and therefore one set of cursors/
/// checkouts).
///
/// The registry is the only component allowed to construct providers
/// directly; everyone else goes through [`ProviderRegistry::acquire`].
#[derive(Default)]
pub struct ProviderRegistry {
    providers: DashMap<u64, Arc<DataProvider>>,
}

impl ProviderRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        ProviderRegistry::default()
    }

    /// Return the existing provider for `config`'s fingerprint, or construct
    /// and register a new one. Concurrent callers racing on an unseen
    /// fingerprint never end up with two providers: `DashMap::entry` holds
    /// the shard lock for the whole read-or-insert.
    pub fn acquire(&self, config: ProviderConfig) -> Arc<DataProvider> {
        let fingerprint = config.fingerprint();
        let provider = self
            .providers
            .entry(fingerprint)
            .or_insert_with(|| Arc::new(DataProvider::new(config)))
            .clone();
        metrics::gauge!(crate::metrics::REGISTRY_PROVIDER_COUNT).set(self.providers.len() as f64);
        provider
    }

    /// Number of distinct providers currently registered.
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Whether the registry holds no providers.
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Drop all registered providers. Call between test runs; the harness
    /// owns this lifecycle, not any individual manager.
    pub fn clear(&self) {
        self.providers.clear();
    }
}
