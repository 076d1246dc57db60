pub mod error;
pub mod naming;
pub mod progress;
pub mod provider;
pub mod registry;
pub mod session;
pub mod supervisor;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export main types for convenience
pub use error::{CancelError, LoadError, ProviderError, RegisterError, StartError};
pub use naming::{final_name, final_name_stem, output_path};
pub use progress::{NoopReporter, ProgressEvent, ProgressReporter, SharedProgressReporter};
pub use provider::{
    DownloadEvents, EpisodeInfo, ProgrammeDownload, ProgrammeInfo, ProgressIcon, Provider,
    ProviderId, ProviderInfo,
};
pub use registry::{
    DiscoveryOptions, DiscoveryReport, DylibLoader, ModuleRegistrar, ProviderRegistry,
    RegisteredProvider, StaticLoader,
};
pub use session::{
    DownloadRequest, EpisodeKey, SessionHandle, SessionId, SessionSnapshot, SessionState,
};
pub use supervisor::{SessionSupervisor, SupervisorOptions};
