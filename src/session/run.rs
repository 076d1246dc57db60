// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::{JoinError, JoinHandle};
use tracing::debug;

use super::download::DownloadSession;
use super::request::DownloadRequest;
use super::state::SessionState;
use crate::error::ProviderError;
use crate::provider::{
    DownloadEvent, EpisodeInfo, ProgrammeDownload, ProgrammeInfo, Provider, download_channel,
    shield, shield_with_timeout,
};
use crate::registry::ProviderRegistry;

type DownloadTask = JoinHandle<Result<(), ProviderError>>;

/// How long a provider that dropped its event sink gets to return its result
const RESULT_GRACE: Duration = Duration::from_secs(1);

/// Drive one session from Queued to a terminal state.
///
/// Returns early, without touching the session again, as soon as the
/// session is cancelled.
pub(crate) async fn run_session(
    session: Arc<DownloadSession>,
    registry: Arc<ProviderRegistry>,
    request: DownloadRequest,
    metadata_timeout: Option<Duration>,
) {
    if !session.advance(SessionState::FetchingMetadata) {
        return;
    }

    let Some(instance) = registry.create_instance(&request.provider_id) else {
        session.fail(&ProviderError::msg(format!(
            "Could not construct an instance of provider {}",
            request.provider_id
        )));
        return;
    };

    let metadata = tokio::select! {
        biased;
        _ = session.cancelled() => return,
        metadata = fetch_metadata(instance.as_ref(), &request, metadata_timeout) => metadata,
    };

    let (programme, episode) = match metadata {
        Ok(metadata) => metadata,
        Err(error) => {
            session.fail(&error);
            return;
        }
    };

    if !session.advance(SessionState::Downloading) {
        return;
    }

    let download = ProgrammeDownload {
        programme_id: request.programme_id,
        episode_id: request.episode_id,
        programme,
        episode,
        final_name: request.final_name,
    };

    let (events, mut receiver) = download_channel(session.cancellation_token());
    let task = tokio::spawn(async move {
        shield(instance.download_programme(download, events)).await
    });

    follow_download(&session, &mut receiver, task).await;
}

/// Use the metadata supplied with the request, fetching whatever is missing
async fn fetch_metadata(
    provider: &dyn Provider,
    request: &DownloadRequest,
    limit: Option<Duration>,
) -> Result<(ProgrammeInfo, EpisodeInfo), ProviderError> {
    let programme = match &request.programme {
        Some(programme) => programme.clone(),
        None => shield_with_timeout(limit, provider.programme_info(&request.programme_id)).await?,
    };

    let episode = match &request.episode {
        Some(episode) => episode.clone(),
        None => {
            shield_with_timeout(
                limit,
                provider.episode_info(&request.programme_id, &request.episode_id),
            )
            .await?
        }
    };

    Ok((programme, episode))
}

/// Apply the provider's events to the session until one is terminal, the
/// provider gives up without a terminal event, or the host cancels.
async fn follow_download(
    session: &DownloadSession,
    receiver: &mut UnboundedReceiver<DownloadEvent>,
    mut task: DownloadTask,
) {
    let mut returned = false;

    loop {
        tokio::select! {
            biased;

            _ = session.cancelled() => {
                debug!(session = %session.id(), "Abandoning provider instance");
                return;
            }

            event = receiver.recv() => match event {
                Some(DownloadEvent::Progress { percent, status, icon }) => {
                    session.record_progress(percent, status, icon);
                }
                Some(DownloadEvent::Finished { extension }) => {
                    session.finish(extension);
                    return;
                }
                Some(DownloadEvent::Failed(error)) => {
                    session.fail(&error);
                    return;
                }
                None => {
                    // Sink dropped without a terminal event; the task's own
                    // result, if it arrives soon, explains why.
                    let error = if returned {
                        ProviderError::EndedWithoutResult
                    } else {
                        let joined = tokio::select! {
                            biased;
                            _ = session.cancelled() => return,
                            joined = tokio::time::timeout(RESULT_GRACE, &mut task) => joined,
                        };
                        if joined.is_err() {
                            debug!(
                                session = %session.id(),
                                "Provider hung after dropping its events"
                            );
                            task.abort();
                        }
                        joined
                            .ok()
                            .and_then(task_error)
                            .unwrap_or(ProviderError::EndedWithoutResult)
                    };
                    session.fail(&error);
                    return;
                }
            },

            joined = &mut task, if !returned => {
                returned = true;
                if let Some(error) = task_error(joined) {
                    session.fail(&error);
                    return;
                }
            }
        }
    }
}

fn task_error(joined: Result<Result<(), ProviderError>, JoinError>) -> Option<ProviderError> {
    match joined {
        Ok(Ok(())) => None,
        Ok(Err(error)) => Some(error),
        Err(error) => Some(ProviderError::Panicked(error.to_string())),
    }
}
