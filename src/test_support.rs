// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Fixtures shared by the unit tests

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::ProviderError;
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::provider::{
    DownloadEvents, EpisodeInfo, ProgrammeDownload, ProgrammeInfo, ProgressIcon, Provider,
    ProviderId, provider_factory,
};
use crate::registry::{ProviderRegistry, RegistryBuilder};
use crate::session::{SessionId, SessionState};

pub(crate) const ALPHA_ID: ProviderId =
    ProviderId::from_u128(0x5c6e_2b1d_0000_4000_8000_0000_0000_00a1);
pub(crate) const BETA_ID: ProviderId =
    ProviderId::from_u128(0x5c6e_2b1d_0000_4000_8000_0000_0000_00b2);
pub(crate) const GAMMA_ID: ProviderId =
    ProviderId::from_u128(0x5c6e_2b1d_0000_4000_8000_0000_0000_00c3);

/// One thing a [`ScriptedProvider`] does while downloading
#[derive(Debug, Clone)]
pub(crate) enum Step {
    Progress(u8, ProgressIcon),
    Finish(&'static str),
    Fail(&'static str),
    /// Return an error from `download_programme` itself
    Error(&'static str),
    Panic(&'static str),
    WaitFor(Arc<Notify>),
    /// Park until the host cancels, then give up
    WaitForCancel,
    /// Drop the event sink without a terminal event
    DropEvents,
    /// Never return
    Hang,
}

/// A provider whose download follows a fixed script. Running out of steps
/// without a terminal one drops the event sink.
#[derive(Debug, Clone)]
pub(crate) struct ScriptedProvider {
    id: ProviderId,
    name: String,
    steps: Vec<Step>,
    programme_panic: bool,
    metadata_failure: bool,
    metadata_delay: Option<Duration>,
}

impl ScriptedProvider {
    pub(crate) fn new(id: ProviderId, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            steps: vec![Step::Finish("mp3")],
            programme_panic: false,
            metadata_failure: false,
            metadata_delay: None,
        }
    }

    pub(crate) fn with_steps(mut self, steps: Vec<Step>) -> Self {
        self.steps = steps;
        self
    }

    pub(crate) fn with_programme_panic(mut self) -> Self {
        self.programme_panic = true;
        self
    }

    pub(crate) fn with_metadata_failure(mut self) -> Self {
        self.metadata_failure = true;
        self
    }

    pub(crate) fn with_metadata_delay(mut self, delay: Duration) -> Self {
        self.metadata_delay = Some(delay);
        self
    }

    async fn metadata_gate(&self, programme_id: &str) -> Result<(), ProviderError> {
        if let Some(delay) = self.metadata_delay {
            tokio::time::sleep(delay).await;
        }
        if self.metadata_failure {
            return Err(ProviderError::ProgrammeNotFound(programme_id.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn id(&self) -> ProviderId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Follows a script"
    }

    fn prog_info_update_freq_days(&self) -> u32 {
        7
    }

    async fn programme_info(&self, programme_id: &str) -> Result<ProgrammeInfo, ProviderError> {
        if self.programme_panic {
            panic!("programme page changed layout");
        }
        self.metadata_gate(programme_id).await?;

        Ok(ProgrammeInfo {
            name: format!("Programme {programme_id}"),
            ..Default::default()
        })
    }

    async fn available_episode_ids(
        &self,
        programme_id: &str,
    ) -> Result<Vec<String>, ProviderError> {
        self.metadata_gate(programme_id).await?;
        Ok(vec!["ep1".to_string(), "ep2".to_string()])
    }

    async fn episode_info(
        &self,
        programme_id: &str,
        episode_id: &str,
    ) -> Result<EpisodeInfo, ProviderError> {
        self.metadata_gate(programme_id).await?;
        Ok(sample_episode(&format!("Episode {episode_id}")))
    }

    async fn download_programme(
        &self,
        _download: ProgrammeDownload,
        events: DownloadEvents,
    ) -> Result<(), ProviderError> {
        let mut events = Some(events);

        for step in &self.steps {
            match step {
                Step::Progress(percent, icon) => {
                    if let Some(events) = &events {
                        events.progress(*percent, format!("{percent}%"), *icon);
                    }
                }
                Step::Finish(extension) => {
                    if let Some(events) = events.take() {
                        events.finished(*extension);
                    }
                }
                Step::Fail(message) => {
                    if let Some(events) = events.take() {
                        events.failed(ProviderError::msg(*message));
                    }
                }
                Step::Error(message) => return Err(ProviderError::msg(*message)),
                Step::Panic(message) => panic!("{message}"),
                Step::WaitFor(gate) => gate.notified().await,
                Step::WaitForCancel => {
                    if let Some(events) = &events {
                        events.cancelled().await;
                    }
                    return Ok(());
                }
                Step::DropEvents => events = None,
                Step::Hang => std::future::pending::<()>().await,
            }
        }

        Ok(())
    }
}

/// A provider counting calls per instance, to tell instances apart
#[derive(Debug)]
pub(crate) struct CountingProvider {
    id: ProviderId,
    calls: AtomicUsize,
}

impl CountingProvider {
    pub(crate) fn new(id: ProviderId) -> Self {
        Self {
            id,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Provider for CountingProvider {
    fn id(&self) -> ProviderId {
        self.id
    }

    fn name(&self) -> &str {
        "Counting"
    }

    fn description(&self) -> &str {
        "Counts calls"
    }

    fn prog_info_update_freq_days(&self) -> u32 {
        1
    }

    async fn programme_info(&self, _programme_id: &str) -> Result<ProgrammeInfo, ProviderError> {
        Ok(ProgrammeInfo::default())
    }

    /// One more id on every call
    async fn available_episode_ids(
        &self,
        _programme_id: &str,
    ) -> Result<Vec<String>, ProviderError> {
        let calls = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok((1..=calls).map(|n| format!("ep{n}")).collect())
    }

    async fn episode_info(
        &self,
        _programme_id: &str,
        episode_id: &str,
    ) -> Result<EpisodeInfo, ProviderError> {
        Ok(sample_episode(episode_id))
    }

    async fn download_programme(
        &self,
        _download: ProgrammeDownload,
        events: DownloadEvents,
    ) -> Result<(), ProviderError> {
        events.finished("mp3");
        Ok(())
    }
}

pub(crate) fn sample_episode(name: &str) -> EpisodeInfo {
    EpisodeInfo {
        name: name.to_string(),
        description: None,
        duration_secs: Some(1800),
        date: Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap(),
        image: None,
        ext_info: Default::default(),
    }
}

/// A sealed registry holding only `provider`
pub(crate) fn scripted_registry(provider: ScriptedProvider) -> Arc<ProviderRegistry> {
    scripted_registry_of(vec![provider])
}

/// A sealed registry holding every one of `providers`
pub(crate) fn scripted_registry_of(providers: Vec<ScriptedProvider>) -> Arc<ProviderRegistry> {
    let type_name = std::any::type_name::<ScriptedProvider>();
    let mut builder = RegistryBuilder::new();
    for provider in providers {
        builder
            .register(
                Arc::new(provider_factory(type_name, move || {
                    Ok(Box::new(provider.clone()) as Box<dyn Provider>)
                })),
                None,
            )
            .unwrap();
    }
    Arc::new(builder.build())
}

/// A reporter that keeps every event it receives
#[derive(Debug, Default)]
pub(crate) struct RecordingReporter {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingReporter {
    pub(crate) fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().clone()
    }

    /// States reported for one session, in order
    pub(crate) fn states_for(&self, session_id: SessionId) -> Vec<SessionState> {
        self.events
            .lock()
            .iter()
            .filter(|event| event.session_id() == session_id)
            .filter_map(ProgressEvent::state)
            .collect()
    }
}

impl ProgressReporter for RecordingReporter {
    fn report(&self, event: ProgressEvent) {
        self.events.lock().push(event);
    }
}
