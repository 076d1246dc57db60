mod contract;
mod events;
mod types;

pub use contract::{
    FnFactory, Provider, ProviderFactory, provider_factory, shield, shield_sync,
    shield_with_timeout,
};
pub use events::{
    DownloadEvent, DownloadEvents, FindNewEvent, FindNewEvents, download_channel,
    find_new_channel,
};
pub use types::{
    EpisodeInfo, ProgrammeDownload, ProgrammeInfo, ProgressIcon, ProviderId, ProviderInfo,
};

pub(crate) use contract::panic_message;
