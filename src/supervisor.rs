// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::error::{CancelError, StartError};
use crate::progress::SharedProgressReporter;
use crate::registry::ProviderRegistry;
use crate::session::{
    DownloadRequest, DownloadSession, EpisodeKey, SessionHandle, SessionId, SessionSnapshot,
    run_session,
};

/// Options for supervised downloads
#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    /// Time limit for each metadata lookup a session makes (None = wait forever)
    pub metadata_timeout: Option<Duration>,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            metadata_timeout: Some(Duration::from_secs(60)),
        }
    }
}

/// Runs download sessions, at most one active session per episode.
///
/// Sessions stay tracked after they end until the host acknowledges them, so
/// their final outcome can still be read. Starting a new download of an
/// episode whose session already ended replaces the old session.
pub struct SessionSupervisor {
    registry: Arc<ProviderRegistry>,
    reporter: SharedProgressReporter,
    options: SupervisorOptions,
    sessions: Mutex<HashMap<EpisodeKey, Arc<DownloadSession>>>,
    next_id: AtomicU64,
}

impl SessionSupervisor {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        options: SupervisorOptions,
        reporter: SharedProgressReporter,
    ) -> Self {
        Self {
            registry,
            reporter,
            options,
            sessions: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    /// Start downloading the requested episode in the background.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self, request: DownloadRequest) -> Result<SessionHandle, StartError> {
        if !self.registry.exists(&request.provider_id) {
            return Err(StartError::UnknownProvider(request.provider_id));
        }

        let key = request.key();
        let session = {
            let mut sessions = self.sessions.lock();

            if let Some(existing) = sessions.get(&key)
                && !existing.state().is_terminal()
            {
                return Err(StartError::AlreadyInProgress(key));
            }

            let session_id = SessionId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
            let session = DownloadSession::new(
                session_id,
                key.clone(),
                request.provider_id,
                Arc::clone(&self.reporter),
            );

            if let Some(previous) = sessions.insert(key, Arc::clone(&session)) {
                debug!(
                    session = %previous.id(),
                    state = %previous.state(),
                    "Replacing ended session"
                );
            }
            session
        };

        info!(
            session = %session.id(),
            episode = %session.key(),
            provider = %request.provider_id,
            "Starting download"
        );
        session.announce();

        tokio::spawn(run_session(
            Arc::clone(&session),
            Arc::clone(&self.registry),
            request,
            self.options.metadata_timeout,
        ));

        Ok(SessionHandle::new(session))
    }

    /// Cancel a running session
    pub fn cancel(&self, handle: &SessionHandle) -> Result<(), CancelError> {
        let session = self
            .tracked(handle)
            .ok_or_else(|| CancelError::NotFound(handle.key().clone()))?;

        session
            .cancel()
            .map_err(|state| CancelError::AlreadyTerminal {
                key: handle.key().clone(),
                state,
            })
    }

    /// Snapshots of every tracked session, including ended ones awaiting
    /// acknowledgement, oldest first
    pub fn list_active(&self) -> Vec<SessionSnapshot> {
        let mut snapshots: Vec<_> = self
            .sessions
            .lock()
            .values()
            .map(|session| session.snapshot())
            .collect();
        snapshots.sort_by_key(|snapshot| snapshot.session_id);
        snapshots
    }

    /// Last known snapshot of a tracked session
    pub fn get(&self, handle: &SessionHandle) -> Option<SessionSnapshot> {
        self.tracked(handle).map(|session| session.snapshot())
    }

    /// Stop tracking an ended session and return its final snapshot.
    ///
    /// Returns `None` if the session is unknown or still running.
    pub fn acknowledge(&self, handle: &SessionHandle) -> Option<SessionSnapshot> {
        let mut sessions = self.sessions.lock();

        let session = sessions.get(handle.key())?;
        if session.id() != handle.id() || !session.state().is_terminal() {
            return None;
        }

        sessions.remove(handle.key()).map(|session| session.snapshot())
    }

    /// Acknowledge every ended session, returning their final snapshots
    pub fn drain_terminal(&self) -> Vec<SessionSnapshot> {
        let mut drained = Vec::new();
        self.sessions.lock().retain(|_, session| {
            let snapshot = session.snapshot();
            if snapshot.state.is_terminal() {
                drained.push(snapshot);
                false
            } else {
                true
            }
        });
        drained.sort_by_key(|snapshot| snapshot.session_id);
        drained
    }

    /// Cancel every running session, returning how many were cancelled
    pub fn cancel_all(&self) -> usize {
        let sessions: Vec<_> = self.sessions.lock().values().cloned().collect();

        let cancelled = sessions
            .iter()
            .filter(|session| session.cancel().is_ok())
            .count();

        if cancelled > 0 {
            info!(cancelled, "Cancelled running downloads");
        }
        cancelled
    }

    fn tracked(&self, handle: &SessionHandle) -> Option<Arc<DownloadSession>> {
        self.sessions
            .lock()
            .get(handle.key())
            .filter(|session| session.id() == handle.id())
            .cloned()
    }
}
