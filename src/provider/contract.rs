// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::any::Any;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::FutureExt;

use super::events::{DownloadEvents, FindNewEvents};
use super::types::{EpisodeInfo, ProgrammeDownload, ProgrammeInfo, ProviderId};
use crate::error::ProviderError;

/// The capability interface every content provider implements.
///
/// Providers know how to describe programmes and episodes of one content
/// source and how to download and convert a single episode. The framework
/// never calls provider code directly from host code: every call is routed
/// through [`shield`], so a panicking provider surfaces as
/// [`ProviderError::Panicked`] instead of unwinding into the host.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Stable identifier; must not change between releases of the provider
    fn id(&self) -> ProviderId;

    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn icon(&self) -> Option<Bytes> {
        None
    }

    /// How many days cached programme metadata is considered fresh
    fn prog_info_update_freq_days(&self) -> u32;

    async fn programme_info(&self, programme_id: &str) -> Result<ProgrammeInfo, ProviderError>;

    /// Ids of the episodes currently available, in the provider's order.
    /// An empty list is valid.
    async fn available_episode_ids(&self, programme_id: &str)
    -> Result<Vec<String>, ProviderError>;

    async fn episode_info(
        &self,
        programme_id: &str,
        episode_id: &str,
    ) -> Result<EpisodeInfo, ProviderError>;

    /// Download and convert one episode.
    ///
    /// Progress and the outcome are reported through `events`. The method may
    /// hand `events` to a task of its own and return right away; returning
    /// `Ok(())` says nothing about completion. Returning an error is
    /// equivalent to calling [`DownloadEvents::failed`].
    async fn download_programme(
        &self,
        download: ProgrammeDownload,
        events: DownloadEvents,
    ) -> Result<(), ProviderError>;

    /// Run the provider's interactive "find new programmes" flow, starting at
    /// `view` (or the provider's first view when `None`).
    async fn find_new(&self, _view: Option<serde_json::Value>, _events: FindNewEvents) {}
}

/// Constructs provider instances of one implementing type
pub trait ProviderFactory: Send + Sync {
    /// Name of the implementing type, for diagnostics
    fn type_name(&self) -> &str;

    fn create(&self) -> Result<Box<dyn Provider>, ProviderError>;
}

/// A [`ProviderFactory`] backed by a closure
pub struct FnFactory<F> {
    type_name: String,
    create: F,
}

impl<F> ProviderFactory for FnFactory<F>
where
    F: Fn() -> Result<Box<dyn Provider>, ProviderError> + Send + Sync,
{
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn create(&self) -> Result<Box<dyn Provider>, ProviderError> {
        (self.create)()
    }
}

/// Wrap a constructor closure as a [`ProviderFactory`]
pub fn provider_factory<F>(type_name: impl Into<String>, create: F) -> FnFactory<F>
where
    F: Fn() -> Result<Box<dyn Provider>, ProviderError> + Send + Sync,
{
    FnFactory {
        type_name: type_name.into(),
        create,
    }
}

/// Await a provider future, converting a panic into [`ProviderError::Panicked`]
pub async fn shield<F, T>(future: F) -> Result<T, ProviderError>
where
    F: Future<Output = Result<T, ProviderError>>,
{
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(ProviderError::Panicked(panic_message(payload.as_ref()))),
    }
}

/// Like [`shield`], additionally failing with [`ProviderError::TimedOut`]
/// when the future does not complete within `limit`
pub async fn shield_with_timeout<F, T>(
    limit: Option<Duration>,
    future: F,
) -> Result<T, ProviderError>
where
    F: Future<Output = Result<T, ProviderError>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, shield(future))
            .await
            .unwrap_or_else(|_| Err(ProviderError::TimedOut(limit))),
        None => shield(future).await,
    }
}

/// Run synchronous provider code, converting a panic into [`ProviderError::Panicked`]
pub fn shield_sync<F, T>(f: F) -> Result<T, ProviderError>
where
    F: FnOnce() -> Result<T, ProviderError>,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(ProviderError::Panicked(panic_message(payload.as_ref()))),
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
