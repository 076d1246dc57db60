// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::sync::Arc;

use crate::provider::ProgressIcon;
use crate::session::{EpisodeKey, SessionId, SessionState};

/// Events emitted while download sessions run, for progress reporting
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// A session entered a non-terminal state
    StateChanged {
        session_id: SessionId,
        key: EpisodeKey,
        state: SessionState,
    },

    /// The provider reported progress
    Progress {
        session_id: SessionId,
        key: EpisodeKey,
        percent: u8,
        status: String,
        icon: ProgressIcon,
    },

    /// The download finished successfully
    Finished {
        session_id: SessionId,
        key: EpisodeKey,
        /// File extension of the produced output
        extension: String,
    },

    /// The download failed
    Failed {
        session_id: SessionId,
        key: EpisodeKey,
        error: String,
    },

    /// The host cancelled the download
    Cancelled {
        session_id: SessionId,
        key: EpisodeKey,
    },
}

impl ProgressEvent {
    pub fn session_id(&self) -> SessionId {
        match self {
            Self::StateChanged { session_id, .. }
            | Self::Progress { session_id, .. }
            | Self::Finished { session_id, .. }
            | Self::Failed { session_id, .. }
            | Self::Cancelled { session_id, .. } => *session_id,
        }
    }

    /// The session state this event moves to, if any
    pub fn state(&self) -> Option<SessionState> {
        match self {
            Self::StateChanged { state, .. } => Some(*state),
            Self::Progress { .. } => None,
            Self::Finished { .. } => Some(SessionState::Finished),
            Self::Failed { .. } => Some(SessionState::Failed),
            Self::Cancelled { .. } => Some(SessionState::Cancelled),
        }
    }
}

/// Trait for reporting progress events of download sessions.
///
/// Implementations can use this to display progress bars, log messages,
/// or collect statistics. Events of one session arrive in order; events of
/// different sessions may interleave.
pub trait ProgressReporter: Send + Sync {
    /// Report a progress event
    fn report(&self, event: ProgressEvent);
}

/// A shared reference to a progress reporter
pub type SharedProgressReporter = Arc<dyn ProgressReporter>;

/// A no-op progress reporter that silently ignores all events.
/// Useful for tests or quiet mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn report(&self, _event: ProgressEvent) {
        // Intentionally empty
    }
}

impl NoopReporter {
    /// Create a new NoopReporter wrapped in an Arc
    pub fn shared() -> SharedProgressReporter {
        Arc::new(Self)
    }
}
