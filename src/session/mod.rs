mod download;
mod request;
mod run;
mod state;

pub use download::SessionHandle;
pub use request::DownloadRequest;
pub use state::{EpisodeKey, SessionId, SessionSnapshot, SessionState};

pub(crate) use download::DownloadSession;
pub(crate) use run::run_session;
