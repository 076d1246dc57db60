// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use super::discover::{DiscoveryOptions, DiscoveryReport, RegistryBuilder};
use super::loader::ModuleLoader;
use crate::error::ProviderError;
use crate::provider::{
    EpisodeInfo, ProgrammeInfo, Provider, ProviderFactory, ProviderId, ProviderInfo,
    shield_sync, shield_with_timeout,
};

/// A provider known to the registry
pub struct RegisteredProvider {
    pub(crate) info: ProviderInfo,
    pub(crate) factory: Arc<dyn ProviderFactory>,
    pub(crate) probe: Arc<dyn Provider>,
    pub(crate) lookup_timeout: Option<Duration>,
}

impl RegisteredProvider {
    pub fn id(&self) -> ProviderId {
        self.info.id
    }

    pub fn info(&self) -> &ProviderInfo {
        &self.info
    }

    /// Construct a fresh instance, independent of the probe and of every other
    /// instance. `None` if construction fails or panics.
    pub fn create_instance(&self) -> Option<Arc<dyn Provider>> {
        match shield_sync(|| self.factory.create()) {
            Ok(instance) => Some(Arc::from(instance)),
            Err(error) => {
                warn!(provider = %self.info, %error, "Failed to construct provider instance");
                None
            }
        }
    }

    /// Look up programme metadata on the probe instance.
    ///
    /// Like the other lookups, this fails with [`ProviderError::TimedOut`]
    /// once the registry's lookup timeout passes.
    pub async fn programme_info(&self, programme_id: &str) -> Result<ProgrammeInfo, ProviderError> {
        shield_with_timeout(self.lookup_timeout, self.probe.programme_info(programme_id)).await
    }

    /// List available episode ids on the probe instance
    pub async fn available_episode_ids(
        &self,
        programme_id: &str,
    ) -> Result<Vec<String>, ProviderError> {
        shield_with_timeout(
            self.lookup_timeout,
            self.probe.available_episode_ids(programme_id),
        )
        .await
    }

    /// Look up episode metadata on the probe instance
    pub async fn episode_info(
        &self,
        programme_id: &str,
        episode_id: &str,
    ) -> Result<EpisodeInfo, ProviderError> {
        shield_with_timeout(
            self.lookup_timeout,
            self.probe.episode_info(programme_id, episode_id),
        )
        .await
    }
}

impl fmt::Debug for RegisteredProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredProvider")
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

/// Read-only index of the providers found at start-up.
///
/// Produced by [`RegistryBuilder::build`] and immutable afterwards, so it can
/// be shared behind an `Arc` and read concurrently without locking.
#[derive(Debug, Default)]
pub struct ProviderRegistry {
    providers: Vec<RegisteredProvider>,
    index: HashMap<ProviderId, usize>,
}

impl ProviderRegistry {
    pub(crate) fn from_parts(
        providers: Vec<RegisteredProvider>,
        index: HashMap<ProviderId, usize>,
    ) -> Self {
        Self { providers, index }
    }

    /// Discover the providers in `module_dir` and seal the result
    pub fn discover(
        module_dir: &Path,
        loader: &dyn ModuleLoader,
        options: &DiscoveryOptions,
    ) -> (Self, DiscoveryReport) {
        let mut builder = RegistryBuilder::new();
        let report = builder.discover(module_dir, loader, options);
        (builder.build(), report)
    }

    pub fn exists(&self, id: &ProviderId) -> bool {
        self.index.contains_key(id)
    }

    pub fn get_by_id(&self, id: &ProviderId) -> Option<&RegisteredProvider> {
        self.index.get(id).map(|&position| &self.providers[position])
    }

    /// All providers, in registration order
    pub fn get_all(&self) -> &[RegisteredProvider] {
        &self.providers
    }

    /// Construct a fresh instance of provider `id` for download work
    pub fn create_instance(&self, id: &ProviderId) -> Option<Arc<dyn Provider>> {
        self.get_by_id(id)?.create_instance()
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
    use crate::provider::provider_factory;
    use crate::test_support::{ALPHA_ID, BETA_ID, CountingProvider, ScriptedProvider};

    fn registry_with(factories: Vec<Arc<dyn ProviderFactory>>) -> ProviderRegistry {
        let mut builder = RegistryBuilder::new();
        for factory in factories {
            builder.register(factory, None).unwrap();
        }
        builder.build()
    }

    #[test]
    fn lookups_by_id() {
        let registry = registry_with(vec![
            Arc::new(provider_factory("Alpha", || {
                Ok(Box::new(ScriptedProvider::new(ALPHA_ID, "Alpha")))
            })),
            Arc::new(provider_factory("Beta", || {
                Ok(Box::new(ScriptedProvider::new(BETA_ID, "Beta")))
            })),
        ]);

        assert_eq!(registry.len(), 2);
        assert!(registry.exists(&ALPHA_ID));
        assert_eq!(registry.get_by_id(&BETA_ID).unwrap().info().name, "Beta");
        assert!(registry.get_by_id(&ProviderId::from_u128(0xdead)).is_none());

        let names: Vec<_> = registry.get_all().iter().map(|p| p.info().name.as_str()).collect();
        assert_eq!(names, vec!["Alpha", "Beta"]);
    }

    #[tokio::test]
    async fn created_instances_are_independent() {
        let registry = registry_with(vec![Arc::new(provider_factory("Counting", || {
            Ok(Box::new(CountingProvider::new(ALPHA_ID)))
        }))]);

        let first = registry.create_instance(&ALPHA_ID).unwrap();
        let second = registry.create_instance(&ALPHA_ID).unwrap();

        assert_eq!(first.available_episode_ids("p").await.unwrap().len(), 1);
        assert_eq!(first.available_episode_ids("p").await.unwrap().len(), 2);
        // Calls on the first instance must not leak into the second
        assert_eq!(second.available_episode_ids("p").await.unwrap().len(), 1);

        // Nor into the probe used for metadata lookups
        let probe = registry.get_by_id(&ALPHA_ID).unwrap();
        assert_eq!(probe.available_episode_ids("p").await.unwrap().len(), 1);
    }

    #[test]
    fn create_instance_of_unknown_id_is_none() {
        let registry = ProviderRegistry::default();
        assert!(registry.create_instance(&ALPHA_ID).is_none());
    }

    #[test]
    fn create_instance_failure_is_none() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let registry = registry_with(vec![Arc::new(provider_factory("Flaky", move || {
            // The probe succeeds, every later construction fails
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(Box::new(ScriptedProvider::new(ALPHA_ID, "Flaky")))
            } else {
                panic!("out of licences")
            }
        }))]);

        assert!(registry.exists(&ALPHA_ID));
        assert!(registry.create_instance(&ALPHA_ID).is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn metadata_lookup_panics_become_errors() {
        let registry = registry_with(vec![Arc::new(provider_factory("Broken", || {
            Ok(Box::new(
                ScriptedProvider::new(ALPHA_ID, "Broken").with_programme_panic(),
            ))
        }))]);

        let provider = registry.get_by_id(&ALPHA_ID).unwrap();
        let result = provider.programme_info("b006qykl").await;
        assert!(matches!(result, Err(ProviderError::Panicked(_))));
    }

    #[tokio::test]
    async fn metadata_lookups_honour_the_lookup_timeout() {
        let mut builder = RegistryBuilder::new();
        builder.set_lookup_timeout(Some(Duration::from_millis(20)));
        builder
            .register(
                Arc::new(provider_factory("Slow", || {
                    Ok(Box::new(
                        ScriptedProvider::new(ALPHA_ID, "Slow")
                            .with_metadata_delay(Duration::from_secs(30)),
                    ))
                })),
                None,
            )
            .unwrap();
        let registry = builder.build();

        let provider = registry.get_by_id(&ALPHA_ID).unwrap();
        let result = provider.available_episode_ids("b006qykl").await;
        assert!(matches!(result, Err(ProviderError::TimedOut(_))));
    }
}
