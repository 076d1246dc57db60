// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Provider modules built as dynamic libraries.
//!
//! A module exports a single [`PluginDeclaration`] static, normally through
//! [`export_providers!`](crate::export_providers). The declaration carries the
//! plugin ABI version and the framework version the module was built
//! against; both must match the host before the module's registration
//! function is called. Provider types cross the boundary as Rust trait
//! objects, so modules must be built with the same compiler as the host.

use std::path::Path;
use std::sync::Arc;

use libloading::Library;
use tracing::debug;

use super::loader::{ModuleLoader, RegisterFn, run_entry_point};
use crate::error::LoadError;
use crate::provider::ProviderFactory;

/// Version of the module boundary; bumped on any change to [`PluginDeclaration`]
/// or the [`Provider`] trait
pub const PLUGIN_ABI_VERSION: u32 = 1;

/// Version of this crate, recorded in every module declaration
pub const FRAMEWORK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the static a module exports
pub const DECLARATION_SYMBOL: &str = "RADIODL_PROVIDER_DECLARATION";

/// The static every dynamically loaded provider module exports
#[repr(C)]
pub struct PluginDeclaration {
    /// Kept first so it can be read even from a module with a different layout
    pub abi_version: u32,
    pub framework_version: &'static str,
    pub register: RegisterFn,
}

/// Export a module's registration function under the well-known symbol.
///
/// ```ignore
/// fn register(registrar: &mut radiodl::registry::ModuleRegistrar) {
///     registrar.register_type(|| Ok(MyProvider::new()));
/// }
///
/// radiodl::export_providers!(register);
/// ```
#[macro_export]
macro_rules! export_providers {
    ($register:path) => {
        #[doc(hidden)]
        #[unsafe(no_mangle)]
        pub static RADIODL_PROVIDER_DECLARATION: $crate::registry::PluginDeclaration =
            $crate::registry::PluginDeclaration {
                abi_version: $crate::registry::PLUGIN_ABI_VERSION,
                framework_version: $crate::registry::FRAMEWORK_VERSION,
                register: $register,
            };
    };
}

/// Loads provider modules from dynamic libraries
#[derive(Debug, Default, Clone, Copy)]
pub struct DylibLoader;

impl DylibLoader {
    pub fn new() -> Self {
        Self
    }
}

impl ModuleLoader for DylibLoader {
    fn load(&self, path: &Path) -> Result<Vec<Arc<dyn ProviderFactory>>, LoadError> {
        let library = open(path)?;

        let (abi_version, framework_version, register) = {
            // SAFETY: the symbol is declared by `export_providers!` with type
            // `PluginDeclaration`; only `abi_version` is read before the ABI
            // check, and `repr(C)` fixes its offset.
            let symbol = unsafe {
                library.get::<*const PluginDeclaration>(DECLARATION_SYMBOL.as_bytes())
            }
            .map_err(|source| LoadError::MissingEntryPoint {
                path: path.to_path_buf(),
                source,
            })?;
            let declaration = unsafe { &**symbol };

            if declaration.abi_version != PLUGIN_ABI_VERSION {
                return Err(LoadError::AbiMismatch {
                    path: path.to_path_buf(),
                    found: declaration.abi_version,
                    expected: PLUGIN_ABI_VERSION,
                });
            }

            (
                declaration.abi_version,
                declaration.framework_version.to_string(),
                declaration.register,
            )
        };

        if framework_version != FRAMEWORK_VERSION {
            return Err(LoadError::VersionMismatch {
                path: path.to_path_buf(),
                found: framework_version,
                expected: FRAMEWORK_VERSION.to_string(),
            });
        }

        debug!(path = %path.display(), abi_version, "Loaded provider module");

        run_entry_point(path, register)
    }
}

/// Load a library for the rest of the process.
///
/// Providers may keep running module code on their own tasks after every
/// factory and instance is gone, so modules are never unloaded.
fn open(path: &Path) -> Result<&'static Library, LoadError> {
    // SAFETY: loading runs the module's initialisers. Modules in the
    // provider directory are trusted to be built for this host.
    let library = unsafe { Library::new(path) }.map_err(|source| LoadError::LibraryFailed {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(Box::leak(Box::new(library)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn non_library_file_fails_to_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("corrupt_provider.so");
        std::fs::write(&path, b"this is not a shared object").unwrap();

        let result = DylibLoader::new().load(&path);
        assert!(matches!(result, Err(LoadError::LibraryFailed { .. })));
    }

    #[test]
    fn missing_file_fails_to_load() {
        let dir = tempdir().unwrap();
        let result = DylibLoader::new().load(&dir.path().join("absent_provider.so"));
        assert!(matches!(result, Err(LoadError::LibraryFailed { .. })));
    }

    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    #[test]
    fn opened_libraries_stay_loaded() {
        let library: &'static Library = open(Path::new("libc.so.6")).unwrap();

        // SAFETY: `strlen` has this signature in every libc.
        let strlen = *unsafe {
            library.get::<unsafe extern "C" fn(*const std::ffi::c_char) -> usize>(b"strlen")
        }
        .unwrap();

        // Code from the library stays callable after the loader is done with it
        let length = unsafe { strlen(c"radiodl".as_ptr()) };
        assert_eq!(length, 7);
    }

    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    #[test]
    fn library_without_declaration_is_rejected() {
        let result = DylibLoader::new().load(Path::new("libc.so.6"));
        assert!(matches!(result, Err(LoadError::MissingEntryPoint { .. })));
    }
}
