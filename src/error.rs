// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::provider::ProviderId;
use crate::session::{EpisodeKey, SessionState};

/// Boxed error type providers may attach as the cause of a failure
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised by provider code, or synthesized by the framework on a
/// provider's behalf
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Programme '{0}' not found")]
    ProgrammeNotFound(String),

    #[error("Episode '{episode_id}' of programme '{programme_id}' not found")]
    EpisodeNotFound {
        programme_id: String,
        episode_id: String,
    },

    #[error("{message}")]
    Failed {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Provider panicked: {0}")]
    Panicked(String),

    #[error("Provider did not respond within {0:?}")]
    TimedOut(Duration),

    #[error("Provider stopped reporting without finishing the download")]
    EndedWithoutResult,
}

impl ProviderError {
    /// A failure described only by a message
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
            source: None,
        }
    }

    /// A failure wrapping an underlying error
    pub fn other<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Failed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Errors that can occur when loading a provider module
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Failed to load module {path}: {source}")]
    LibraryFailed {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },

    #[error("Module {path} has no provider entry point: {source}")]
    MissingEntryPoint {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },

    #[error("Module {path} targets plugin ABI {found}, expected {expected}")]
    AbiMismatch {
        path: PathBuf,
        found: u32,
        expected: u32,
    },

    #[error("Module {path} was built against framework {found}, expected {expected}")]
    VersionMismatch {
        path: PathBuf,
        found: String,
        expected: String,
    },

    #[error("Module {path} is not a known provider module")]
    UnknownModule { path: PathBuf },

    #[error("Entry point of module {path} panicked: {message}")]
    EntryPointPanicked { path: PathBuf, message: String },
}

/// Reasons a provider factory was not registered
#[derive(Error, Debug)]
pub enum RegisterError {
    #[error("Failed to construct provider type {type_name}: {source}")]
    ConstructionFailed {
        type_name: String,
        #[source]
        source: ProviderError,
    },

    #[error("Provider {id} ({type_name}) is already registered by {existing}")]
    DuplicateId {
        id: ProviderId,
        type_name: String,
        existing: String,
    },
}

/// Errors returned when starting a download session
#[derive(Error, Debug)]
pub enum StartError {
    #[error("A download of {0} is already in progress")]
    AlreadyInProgress(EpisodeKey),

    #[error("No provider registered with id {0}")]
    UnknownProvider(ProviderId),
}

/// Errors returned when cancelling a download session
#[derive(Error, Debug)]
pub enum CancelError {
    #[error("No tracked session {0}")]
    NotFound(EpisodeKey),

    #[error("Session for {key} already ended as {state}")]
    AlreadyTerminal { key: EpisodeKey, state: SessionState },
}
