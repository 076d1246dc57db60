// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::{debug, info, warn};

use super::state::{EpisodeKey, SessionId, SessionSnapshot, SessionState};
use crate::error::ProviderError;
use crate::progress::{ProgressEvent, SharedProgressReporter};
use crate::provider::{ProgressIcon, ProviderId};

/// The tracked unit of work for downloading one episode.
///
/// All state lives in a `watch` channel: every transition is a
/// check-and-set under the channel's lock, so concurrent transitions (a host
/// cancel racing a provider's finish) settle on exactly one terminal state,
/// and readers always see the last known snapshot without blocking writers
/// for long.
///
/// Transitions and their reports are serialized by `transitions`, so the
/// reporter sees a session's events in the order the snapshot changed and
/// nothing after its terminal event. Reporters must not call back into the
/// session.
pub(crate) struct DownloadSession {
    state: watch::Sender<SessionSnapshot>,
    transitions: Mutex<()>,
    cancel: CancellationToken,
    reporter: SharedProgressReporter,
}

impl DownloadSession {
    pub(crate) fn new(
        session_id: SessionId,
        key: EpisodeKey,
        provider_id: ProviderId,
        reporter: SharedProgressReporter,
    ) -> Arc<Self> {
        let (state, _) = watch::channel(SessionSnapshot::queued(session_id, key, provider_id));
        Arc::new(Self {
            state,
            transitions: Mutex::new(()),
            cancel: CancellationToken::new(),
            reporter,
        })
    }

    pub(crate) fn id(&self) -> SessionId {
        self.state.borrow().session_id
    }

    pub(crate) fn key(&self) -> EpisodeKey {
        self.state.borrow().key.clone()
    }

    pub(crate) fn state(&self) -> SessionState {
        self.state.borrow().state
    }

    pub(crate) fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.subscribe()
    }

    pub(crate) fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub(crate) fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }

    /// Report the initial Queued state
    pub(crate) fn announce(&self) {
        let _transition = self.transitions.lock();
        let snapshot = self.snapshot();
        self.reporter.report(ProgressEvent::StateChanged {
            session_id: snapshot.session_id,
            key: snapshot.key,
            state: snapshot.state,
        });
    }

    /// Move to a non-terminal state. Returns false if the move is not allowed,
    /// which happens when the session ended (e.g. was cancelled) meanwhile.
    pub(crate) fn advance(&self, next: SessionState) -> bool {
        debug_assert!(!next.is_terminal());

        let _transition = self.transitions.lock();
        let moved = self.state.send_if_modified(|snapshot| {
            if !snapshot.state.can_transition_to(next) {
                return false;
            }
            snapshot.state = next;
            true
        });

        if moved {
            self.reporter.report(ProgressEvent::StateChanged {
                session_id: self.id(),
                key: self.key(),
                state: next,
            });
        } else {
            debug!(session = %self.id(), to = %next, "Session already ended, not advancing");
        }

        moved
    }

    /// Record a progress event from the provider. The icon decides between
    /// Downloading and Converting.
    pub(crate) fn record_progress(&self, percent: u8, status: String, icon: ProgressIcon) {
        let next = match icon {
            ProgressIcon::Downloading => SessionState::Downloading,
            ProgressIcon::Converting => SessionState::Converting,
        };

        let _transition = self.transitions.lock();
        let mut changed_state = false;
        let recorded = self.state.send_if_modified(|snapshot| {
            if !matches!(
                snapshot.state,
                SessionState::Downloading | SessionState::Converting
            ) {
                return false;
            }
            changed_state = snapshot.state != next;
            snapshot.state = next;
            snapshot.percent = percent;
            snapshot.status = status.clone();
            snapshot.icon = Some(icon);
            true
        });

        if !recorded {
            debug!(
                session = %self.id(),
                percent,
                "Ignoring progress for a session that is not downloading"
            );
            return;
        }

        if changed_state {
            self.reporter.report(ProgressEvent::StateChanged {
                session_id: self.id(),
                key: self.key(),
                state: next,
            });
        }

        self.reporter.report(ProgressEvent::Progress {
            session_id: self.id(),
            key: self.key(),
            percent,
            status,
            icon,
        });
    }

    pub(crate) fn finish(&self, extension: String) -> bool {
        let _transition = self.transitions.lock();
        let finished = self.state.send_if_modified(|snapshot| {
            if !snapshot.state.can_transition_to(SessionState::Finished) {
                return false;
            }
            snapshot.state = SessionState::Finished;
            snapshot.extension = Some(extension.clone());
            true
        });

        if finished {
            info!(session = %self.id(), episode = %self.key(), %extension, "Download finished");
            self.reporter.report(ProgressEvent::Finished {
                session_id: self.id(),
                key: self.key(),
                extension,
            });
        } else {
            debug!(session = %self.id(), "Ignoring finish for an ended session");
        }

        finished
    }

    pub(crate) fn fail(&self, error: &ProviderError) -> bool {
        let reason = error.to_string();
        let _transition = self.transitions.lock();
        let failed = self.state.send_if_modified(|snapshot| {
            if !snapshot.state.can_transition_to(SessionState::Failed) {
                return false;
            }
            snapshot.state = SessionState::Failed;
            snapshot.error = Some(reason.clone());
            true
        });

        if failed {
            warn!(session = %self.id(), episode = %self.key(), %error, "Download failed");
            self.reporter.report(ProgressEvent::Failed {
                session_id: self.id(),
                key: self.key(),
                error: reason,
            });
        } else {
            debug!(session = %self.id(), %error, "Ignoring failure for an ended session");
        }

        failed
    }

    /// Cancel the session. On success the provider's cancellation token fires
    /// and no further provider events are acted on. Returns the terminal
    /// state if the session had already ended.
    pub(crate) fn cancel(&self) -> Result<(), SessionState> {
        let _transition = self.transitions.lock();
        let mut ended_as = None;
        let cancelled = self.state.send_if_modified(|snapshot| {
            if !snapshot.state.can_transition_to(SessionState::Cancelled) {
                ended_as = Some(snapshot.state);
                return false;
            }
            snapshot.state = SessionState::Cancelled;
            true
        });

        if !cancelled {
            return Err(ended_as.unwrap_or(SessionState::Cancelled));
        }

        self.cancel.cancel();
        info!(session = %self.id(), episode = %self.key(), "Download cancelled");
        self.reporter.report(ProgressEvent::Cancelled {
            session_id: self.id(),
            key: self.key(),
        });

        Ok(())
    }
}

/// The host's handle on a started download session
#[derive(Clone)]
pub struct SessionHandle {
    session: Arc<DownloadSession>,
    session_id: SessionId,
    key: EpisodeKey,
}

impl SessionHandle {
    pub(crate) fn new(session: Arc<DownloadSession>) -> Self {
        let session_id = session.id();
        let key = session.key();
        Self {
            session,
            session_id,
            key,
        }
    }

    pub fn id(&self) -> SessionId {
        self.session_id
    }

    pub fn key(&self) -> &EpisodeKey {
        &self.key
    }

    /// Last known state; never blocks on the provider
    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    /// Last known snapshot; never blocks on the provider
    pub fn snapshot(&self) -> SessionSnapshot {
        self.session.snapshot()
    }

    /// Subscribe to snapshot changes
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.session.subscribe()
    }

    /// Wait until the session reaches a terminal state
    pub async fn wait(&self) -> SessionSnapshot {
        let mut changes = self.subscribe();
        match changes.wait_for(|snapshot| snapshot.state.is_terminal()).await {
            Ok(snapshot) => snapshot.clone(),
            Err(_) => self.snapshot(),
        }
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("session_id", &self.session_id)
            .field("key", &self.key)
            .finish()
    }
}
