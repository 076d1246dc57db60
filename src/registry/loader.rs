// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::Path;
use std::sync::Arc;

use crate::error::{LoadError, ProviderError};
use crate::provider::{Provider, ProviderFactory, panic_message, provider_factory};

/// Registration entry point of a provider module
pub type RegisterFn = fn(&mut ModuleRegistrar);

/// Collects the provider factories a module hands to the host
#[derive(Default)]
pub struct ModuleRegistrar {
    factories: Vec<Arc<dyn ProviderFactory>>,
}

impl ModuleRegistrar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory
    pub fn register(&mut self, factory: impl ProviderFactory + 'static) {
        self.factories.push(Arc::new(factory));
    }

    /// Register a provider type by its constructor
    pub fn register_type<P, F>(&mut self, create: F)
    where
        P: Provider + 'static,
        F: Fn() -> Result<P, ProviderError> + Send + Sync + 'static,
    {
        self.register(provider_factory(std::any::type_name::<P>(), move || {
            create().map(|provider| Box::new(provider) as Box<dyn Provider>)
        }));
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    pub(crate) fn into_factories(self) -> Vec<Arc<dyn ProviderFactory>> {
        self.factories
    }
}

/// Turns a module file into the provider factories it exports
pub trait ModuleLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<Vec<Arc<dyn ProviderFactory>>, LoadError>;
}

/// Call a module's entry point, catching a panic inside it
pub(crate) fn run_entry_point(
    path: &Path,
    register: RegisterFn,
) -> Result<Vec<Arc<dyn ProviderFactory>>, LoadError> {
    let mut registrar = ModuleRegistrar::new();

    catch_unwind(AssertUnwindSafe(|| register(&mut registrar))).map_err(|payload| {
        LoadError::EntryPointPanicked {
            path: path.to_path_buf(),
            message: panic_message(payload.as_ref()),
        }
    })?;

    Ok(registrar.into_factories())
}

/// Loader for provider modules compiled into the host.
///
/// Maps module file names to their entry points, so a host can ship providers
/// statically while keeping the directory-driven discovery flow.
#[derive(Debug, Default, Clone)]
pub struct StaticLoader {
    modules: HashMap<String, RegisterFn>,
}

impl StaticLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_module(mut self, file_name: impl Into<String>, register: RegisterFn) -> Self {
        self.modules.insert(file_name.into(), register);
        self
    }
}

impl ModuleLoader for StaticLoader {
    fn load(&self, path: &Path) -> Result<Vec<Arc<dyn ProviderFactory>>, LoadError> {
        let register = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(|name| self.modules.get(name))
            .ok_or_else(|| LoadError::UnknownModule {
                path: path.to_path_buf(),
            })?;

        run_entry_point(path, *register)
    }
}
