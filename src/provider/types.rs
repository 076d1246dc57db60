// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable, globally unique identifier of a provider, chosen by its author
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderId(Uuid);

impl ProviderId {
    /// Build an id from its 128-bit value, usable in `const` contexts
    pub const fn from_u128(value: u128) -> Self {
        Self(Uuid::from_u128(value))
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for ProviderId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl FromStr for ProviderId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a registered provider, captured from its probe instance
#[derive(Debug, Clone, Serialize)]
pub struct ProviderInfo {
    pub id: ProviderId,
    pub name: String,
    pub description: String,
    #[serde(skip)]
    pub icon: Option<Bytes>,
    /// How many days cached programme metadata stays fresh
    pub prog_info_update_freq_days: u32,
    /// Name of the type that implements the provider
    pub type_name: String,
    /// Module the provider was discovered in; `None` for statically registered providers
    pub module_path: Option<PathBuf>,
}

impl ProviderInfo {
    /// Whether programme metadata refreshed at `last_refresh` should be fetched again
    pub fn is_stale(&self, last_refresh: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now - last_refresh >= Duration::days(i64::from(self.prog_info_update_freq_days))
    }
}

impl fmt::Display for ProviderInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

/// Metadata describing a programme
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgrammeInfo {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip)]
    pub image: Option<Bytes>,
    /// A standalone release rather than a series; episode enumeration is skipped
    pub single_episode: bool,
}

/// Metadata describing one episode of a programme
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeInfo {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<u32>,
    pub date: DateTime<Utc>,
    #[serde(skip)]
    pub image: Option<Bytes>,
    /// Provider specific attributes, e.g. the original broadcast id
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub ext_info: HashMap<String, String>,
}

/// Icon a provider shows alongside a progress update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressIcon {
    Downloading,
    Converting,
}

/// Everything a provider needs to download one episode
#[derive(Debug, Clone)]
pub struct ProgrammeDownload {
    pub programme_id: String,
    pub episode_id: String,
    pub programme: ProgrammeInfo,
    pub episode: EpisodeInfo,
    /// Target path without extension; the provider appends the extension it reports
    pub final_name: PathBuf,
}
