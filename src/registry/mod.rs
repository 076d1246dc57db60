mod discover;
mod dylib;
mod index;
mod loader;

pub use discover::{
    DiscoveryOptions, DiscoveryReport, RegistryBuilder, RejectedProvider, SkippedModule,
};
pub use dylib::{
    DECLARATION_SYMBOL, DylibLoader, FRAMEWORK_VERSION, PLUGIN_ABI_VERSION, PluginDeclaration,
};
pub use index::{ProviderRegistry, RegisteredProvider};
pub use loader::{ModuleLoader, ModuleRegistrar, RegisterFn, StaticLoader};
