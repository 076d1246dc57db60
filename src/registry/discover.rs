// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use super::index::{ProviderRegistry, RegisteredProvider};
use super::loader::ModuleLoader;
use crate::error::{LoadError, RegisterError};
use crate::provider::{Provider, ProviderFactory, ProviderId, ProviderInfo, shield_sync};

/// Options for provider discovery
#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    /// File name suffix a module must end with, compared case-insensitively
    pub module_suffix: String,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            module_suffix: format!("provider{}", std::env::consts::DLL_SUFFIX),
        }
    }
}

/// A module that could not be loaded
#[derive(Debug)]
pub struct SkippedModule {
    pub path: PathBuf,
    pub error: LoadError,
}

/// A provider factory that was not registered
#[derive(Debug)]
pub struct RejectedProvider {
    pub module: Option<PathBuf>,
    pub error: RegisterError,
}

/// What a discovery pass found. Nothing in here is fatal.
#[derive(Debug, Default)]
pub struct DiscoveryReport {
    /// Set when the module directory itself could not be read
    pub directory_error: Option<std::io::Error>,
    pub loaded_modules: Vec<PathBuf>,
    pub skipped_modules: Vec<SkippedModule>,
    pub registered: Vec<ProviderId>,
    pub rejected: Vec<RejectedProvider>,
}

/// Collects providers before the registry is sealed
#[derive(Default)]
pub struct RegistryBuilder {
    providers: Vec<RegisteredProvider>,
    index: HashMap<ProviderId, usize>,
    lookup_timeout: Option<Duration>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time limit for metadata lookups made through the sealed registry
    /// (None = wait forever). Applies to providers registered afterwards.
    pub fn set_lookup_timeout(&mut self, limit: Option<Duration>) {
        self.lookup_timeout = limit;
    }

    /// Probe a factory and register the provider it builds.
    ///
    /// The factory is instantiated once to read the provider's identity. The
    /// first provider to claim an id keeps it; later claimants are rejected.
    pub fn register(
        &mut self,
        factory: Arc<dyn ProviderFactory>,
        module_path: Option<&Path>,
    ) -> Result<ProviderId, RegisterError> {
        let type_name = shield_sync(|| Ok(factory.type_name().to_string()))
            .unwrap_or_else(|_| "<unnamed>".to_string());

        let construction_failed = |source| RegisterError::ConstructionFailed {
            type_name: type_name.clone(),
            source,
        };

        let probe: Arc<dyn Provider> = shield_sync(|| factory.create())
            .map(Arc::from)
            .map_err(construction_failed)?;

        let info = shield_sync(|| {
            Ok(ProviderInfo {
                id: probe.id(),
                name: probe.name().to_string(),
                description: probe.description().to_string(),
                icon: probe.icon(),
                prog_info_update_freq_days: probe.prog_info_update_freq_days(),
                type_name: type_name.clone(),
                module_path: module_path.map(Path::to_path_buf),
            })
        })
        .map_err(construction_failed)?;

        if let Some(&existing) = self.index.get(&info.id) {
            return Err(RegisterError::DuplicateId {
                id: info.id,
                type_name,
                existing: self.providers[existing].info.type_name.clone(),
            });
        }

        let id = info.id;
        self.index.insert(id, self.providers.len());
        self.providers.push(RegisteredProvider {
            info,
            factory,
            probe,
            lookup_timeout: self.lookup_timeout,
        });

        Ok(id)
    }

    /// Load every module in `module_dir` and register the providers they export.
    ///
    /// Never fails: unreadable directories, modules that fail to load and
    /// providers that fail to construct or reuse an id are logged, recorded in
    /// the report and skipped.
    pub fn discover(
        &mut self,
        module_dir: &Path,
        loader: &dyn ModuleLoader,
        options: &DiscoveryOptions,
    ) -> DiscoveryReport {
        let mut report = DiscoveryReport::default();

        let modules = match find_modules(module_dir, &options.module_suffix) {
            Ok(modules) => modules,
            Err(error) => {
                warn!(dir = %module_dir.display(), %error, "Failed to read provider directory");
                report.directory_error = Some(error);
                return report;
            }
        };

        for path in modules {
            let factories = match loader.load(&path) {
                Ok(factories) => factories,
                Err(error) => {
                    warn!(module = %path.display(), %error, "Skipping provider module");
                    report.skipped_modules.push(SkippedModule { path, error });
                    continue;
                }
            };

            for factory in factories {
                match self.register(factory, Some(&path)) {
                    Ok(id) => {
                        info!(module = %path.display(), provider = %id, "Registered provider");
                        report.registered.push(id);
                    }
                    Err(error) => {
                        warn!(module = %path.display(), %error, "Rejected provider");
                        report.rejected.push(RejectedProvider {
                            module: Some(path.clone()),
                            error,
                        });
                    }
                }
            }

            report.loaded_modules.push(path);
        }

        report
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Seal the registry; no providers can be added afterwards
    pub fn build(self) -> ProviderRegistry {
        ProviderRegistry::from_parts(self.providers, self.index)
    }
}

/// Module files directly inside `dir`, sorted by file name
fn find_modules(dir: &Path, suffix: &str) -> std::io::Result<Vec<PathBuf>> {
    let suffix = suffix.to_lowercase();
    let mut modules: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.to_lowercase().ends_with(&suffix))
        })
        .collect();

    modules.sort();
    Ok(modules)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::provider_factory;
    use crate::registry::{ModuleRegistrar, StaticLoader};
    use crate::test_support::{ALPHA_ID, BETA_ID, GAMMA_ID, ScriptedProvider};
    use tempfile::{TempDir, tempdir};

    fn register_alpha(registrar: &mut ModuleRegistrar) {
        registrar.register_type(|| Ok(ScriptedProvider::new(ALPHA_ID, "Alpha")));
    }

    fn register_beta_and_gamma(registrar: &mut ModuleRegistrar) {
        registrar.register_type(|| Ok(ScriptedProvider::new(BETA_ID, "Beta")));
        registrar.register_type(|| Ok(ScriptedProvider::new(GAMMA_ID, "Gamma")));
    }

    fn register_alpha_impostor(registrar: &mut ModuleRegistrar) {
        registrar.register_type(|| Ok(ScriptedProvider::new(ALPHA_ID, "Impostor")));
    }

    fn register_unconstructible(registrar: &mut ModuleRegistrar) {
        registrar.register(provider_factory("Unconstructible", || {
            Err(crate::error::ProviderError::msg("missing configuration"))
        }));
        registrar.register(provider_factory("Panicking", || panic!("constructor exploded")));
        registrar.register_type(|| Ok(ScriptedProvider::new(GAMMA_ID, "Gamma")));
    }

    fn register_panicking_module(_registrar: &mut ModuleRegistrar) {
        panic!("module failed to initialise");
    }

    fn module_dir(files: &[&str]) -> TempDir {
        let dir = tempdir().unwrap();
        for file in files {
            std::fs::write(dir.path().join(file), b"module").unwrap();
        }
        dir
    }

    fn options() -> DiscoveryOptions {
        DiscoveryOptions {
            module_suffix: "provider.so".to_string(),
        }
    }

    #[test]
    fn registers_valid_modules_and_skips_invalid_ones() {
        let dir = module_dir(&[
            "alpha_provider.so",
            "betagamma_provider.so",
            "corrupt_provider.so",
            "truncated_provider.so",
        ]);
        let loader = StaticLoader::new()
            .with_module("alpha_provider.so", register_alpha)
            .with_module("betagamma_provider.so", register_beta_and_gamma);

        let mut builder = RegistryBuilder::new();
        let report = builder.discover(dir.path(), &loader, &options());

        assert_eq!(builder.len(), 3);
        assert_eq!(report.loaded_modules.len(), 2);
        assert_eq!(report.skipped_modules.len(), 2);
        assert!(report.rejected.is_empty());
        assert!(report.directory_error.is_none());

        let registry = builder.build();
        for id in [ALPHA_ID, BETA_ID, GAMMA_ID] {
            assert!(registry.exists(&id));
        }
    }

    #[test]
    fn first_registrant_of_an_id_wins() {
        // Sorted order puts "a_" before "b_"
        let dir = module_dir(&["a_alpha_provider.so", "b_impostor_provider.so"]);
        let loader = StaticLoader::new()
            .with_module("a_alpha_provider.so", register_alpha)
            .with_module("b_impostor_provider.so", register_alpha_impostor);

        let (registry, report) = ProviderRegistry::discover(dir.path(), &loader, &options());

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get_by_id(&ALPHA_ID).unwrap().info().name, "Alpha");
        assert_eq!(report.rejected.len(), 1);
        assert!(matches!(
            report.rejected[0].error,
            RegisterError::DuplicateId { id, .. } if id == ALPHA_ID
        ));
    }

    #[test]
    fn construction_failures_skip_only_that_type() {
        let dir = module_dir(&["mixed_provider.so"]);
        let loader =
            StaticLoader::new().with_module("mixed_provider.so", register_unconstructible);

        let (registry, report) = ProviderRegistry::discover(dir.path(), &loader, &options());

        assert_eq!(registry.len(), 1);
        assert!(registry.exists(&GAMMA_ID));
        assert_eq!(report.rejected.len(), 2);
        assert!(
            report
                .rejected
                .iter()
                .all(|r| matches!(r.error, RegisterError::ConstructionFailed { .. }))
        );
    }

    #[test]
    fn panicking_module_is_skipped() {
        let dir = module_dir(&["alpha_provider.so", "bad_provider.so"]);
        let loader = StaticLoader::new()
            .with_module("alpha_provider.so", register_alpha)
            .with_module("bad_provider.so", register_panicking_module);

        let (registry, report) = ProviderRegistry::discover(dir.path(), &loader, &options());

        assert_eq!(registry.len(), 1);
        assert!(matches!(
            report.skipped_modules[0].error,
            LoadError::EntryPointPanicked { .. }
        ));
    }

    #[test]
    fn ignores_files_without_module_suffix_and_subdirectories() {
        let dir = module_dir(&["alpha_provider.so", "readme.txt", "alpha_provider.so.bak"]);
        std::fs::create_dir(dir.path().join("nested_provider.so")).unwrap();
        let loader = StaticLoader::new().with_module("alpha_provider.so", register_alpha);

        let (registry, report) = ProviderRegistry::discover(dir.path(), &loader, &options());

        assert_eq!(registry.len(), 1);
        assert_eq!(report.loaded_modules.len(), 1);
        assert!(report.skipped_modules.is_empty());
    }

    #[test]
    fn suffix_match_is_case_insensitive() {
        let dir = module_dir(&["AlphaProvider.SO"]);
        let loader = StaticLoader::new().with_module("AlphaProvider.SO", register_alpha);

        let (registry, _) = ProviderRegistry::discover(dir.path(), &loader, &options());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn missing_directory_yields_empty_registry() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("no-such-dir");

        let (registry, report) =
            ProviderRegistry::discover(&missing, &StaticLoader::new(), &options());

        assert!(registry.is_empty());
        assert!(report.directory_error.is_some());
    }

    #[test]
    fn registered_provider_records_module_path() {
        let dir = module_dir(&["alpha_provider.so"]);
        let loader = StaticLoader::new().with_module("alpha_provider.so", register_alpha);

        let (registry, _) = ProviderRegistry::discover(dir.path(), &loader, &options());
        let info = registry.get_by_id(&ALPHA_ID).unwrap().info();

        assert_eq!(
            info.module_path.as_deref(),
            Some(dir.path().join("alpha_provider.so").as_path())
        );
        assert!(info.type_name.ends_with("ScriptedProvider"));
    }
}
