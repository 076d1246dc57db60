// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::PathBuf;

use super::state::EpisodeKey;
use crate::provider::{EpisodeInfo, ProgrammeInfo, ProviderId};

/// A host's request to download one episode
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub provider_id: ProviderId,
    pub programme_id: String,
    pub episode_id: String,
    /// Programme metadata already known to the host; fetched when `None`
    pub programme: Option<ProgrammeInfo>,
    /// Episode metadata already known to the host; fetched when `None`
    pub episode: Option<EpisodeInfo>,
    /// Target path without extension
    pub final_name: PathBuf,
}

impl DownloadRequest {
    pub fn new(
        provider_id: ProviderId,
        programme_id: impl Into<String>,
        episode_id: impl Into<String>,
        final_name: impl Into<PathBuf>,
    ) -> Self {
        Self {
            provider_id,
            programme_id: programme_id.into(),
            episode_id: episode_id.into(),
            programme: None,
            episode: None,
            final_name: final_name.into(),
        }
    }

    pub fn with_programme(mut self, programme: ProgrammeInfo) -> Self {
        self.programme = Some(programme);
        self
    }

    pub fn with_episode(mut self, episode: EpisodeInfo) -> Self {
        self.episode = Some(episode);
        self
    }

    pub fn key(&self) -> EpisodeKey {
        EpisodeKey::new(self.programme_id.clone(), self.episode_id.clone())
    }
}
