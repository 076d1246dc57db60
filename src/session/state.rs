// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fmt;

use serde::Serialize;

use crate::provider::{ProgressIcon, ProviderId};

/// Identifies the episode a session downloads
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct EpisodeKey {
    pub programme_id: String,
    pub episode_id: String,
}

impl EpisodeKey {
    pub fn new(programme_id: impl Into<String>, episode_id: impl Into<String>) -> Self {
        Self {
            programme_id: programme_id.into(),
            episode_id: episode_id.into(),
        }
    }
}

impl fmt::Display for EpisodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.programme_id, self.episode_id)
    }
}

/// Process-unique id of one download session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SessionId(u64);

impl SessionId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle of a download session
///
/// ```text
/// Queued -> FetchingMetadata -> Downloading <-> Converting -> Finished
///                 any non-terminal state -> Failed | Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Queued,
    FetchingMetadata,
    Downloading,
    Converting,
    Finished,
    Failed,
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Failed | Self::Cancelled)
    }

    fn stage(self) -> u8 {
        match self {
            Self::Queued => 0,
            Self::FetchingMetadata => 1,
            Self::Downloading | Self::Converting => 2,
            Self::Finished | Self::Failed | Self::Cancelled => 3,
        }
    }

    /// Whether moving from `self` to `next` keeps the session moving forward.
    /// Downloading and Converting may alternate; nothing leaves a terminal state.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        if self.is_terminal() {
            return false;
        }

        next.is_terminal()
            || next.stage() > self.stage()
            || (self.stage() == 2 && next.stage() == 2)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Queued => "queued",
            Self::FetchingMetadata => "fetching metadata",
            Self::Downloading => "downloading",
            Self::Converting => "converting",
            Self::Finished => "finished",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

/// Last known state of a download session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub key: EpisodeKey,
    pub provider_id: ProviderId,
    pub state: SessionState,
    /// Last reported percentage, 0-100
    pub percent: u8,
    /// Last reported status text
    pub status: String,
    pub icon: Option<ProgressIcon>,
    /// Extension of the produced file, once finished
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
    /// Failure reason, once failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SessionSnapshot {
    pub(crate) fn queued(session_id: SessionId, key: EpisodeKey, provider_id: ProviderId) -> Self {
        Self {
            session_id,
            key,
            provider_id,
            state: SessionState::Queued,
            percent: 0,
            status: String::new(),
            icon: None,
            extension: None,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SessionState::*;

    const ALL: [SessionState; 7] = [
        Queued,
        FetchingMetadata,
        Downloading,
        Converting,
        Finished,
        Failed,
        Cancelled,
    ];

    #[test]
    fn happy_path_moves_forward() {
        assert!(Queued.can_transition_to(FetchingMetadata));
        assert!(FetchingMetadata.can_transition_to(Downloading));
        assert!(Downloading.can_transition_to(Converting));
        assert!(Converting.can_transition_to(Downloading));
        assert!(Converting.can_transition_to(Finished));
    }

    #[test]
    fn never_regresses() {
        assert!(!FetchingMetadata.can_transition_to(Queued));
        assert!(!Downloading.can_transition_to(FetchingMetadata));
        assert!(!Converting.can_transition_to(Queued));
    }

    #[test]
    fn terminal_states_reachable_from_every_live_state() {
        for from in ALL.into_iter().filter(|s| !s.is_terminal()) {
            for to in [Finished, Failed, Cancelled] {
                assert!(from.can_transition_to(to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn nothing_leaves_a_terminal_state() {
        for from in [Finished, Failed, Cancelled] {
            for to in ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn episode_key_display() {
        assert_eq!(EpisodeKey::new("b006qykl", "p0abcd12").to_string(), "b006qykl/p0abcd12");
    }
}
