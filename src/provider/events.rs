// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use super::types::ProgressIcon;
use crate::error::ProviderError;

/// A message from a provider about one in-flight download
#[derive(Debug)]
pub enum DownloadEvent {
    /// Intermediate progress; percent is clamped to 0-100
    Progress {
        percent: u8,
        status: String,
        icon: ProgressIcon,
    },

    /// The download completed and the output carries this file extension
    Finished { extension: String },

    /// The download failed
    Failed(ProviderError),
}

/// Sink a provider reports one download's progress and outcome through.
///
/// The terminal methods consume the sink, so at most one terminal signal can
/// be raised per download. Dropping the sink without calling either of them
/// is treated by the framework as a failed download.
#[derive(Debug)]
pub struct DownloadEvents {
    tx: mpsc::UnboundedSender<DownloadEvent>,
    cancel: CancellationToken,
}

/// Create a connected event sink and receiver for one download
pub fn download_channel(
    cancel: CancellationToken,
) -> (DownloadEvents, mpsc::UnboundedReceiver<DownloadEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (DownloadEvents { tx, cancel }, rx)
}

impl DownloadEvents {
    /// Report progress. Has no effect once the framework stopped listening.
    pub fn progress(&self, percent: u8, status: impl Into<String>, icon: ProgressIcon) {
        let _ = self.tx.send(DownloadEvent::Progress {
            percent: percent.min(100),
            status: status.into(),
            icon,
        });
    }

    /// Report successful completion with the extension of the produced file
    pub fn finished(self, extension: impl Into<String>) {
        let _ = self.tx.send(DownloadEvent::Finished {
            extension: extension.into(),
        });
    }

    /// Report that the download failed
    pub fn failed(self, error: ProviderError) {
        let _ = self.tx.send(DownloadEvent::Failed(error));
    }

    /// Whether the host abandoned this download
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the host abandons this download
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }

    /// A clone of the cancellation token, for handing to helper tasks
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

/// Events raised during a provider's interactive "find new programmes" flow
#[derive(Debug)]
pub enum FindNewEvent {
    /// The provider moved to a different view; the value is opaque to the host
    ViewChange(serde_json::Value),

    /// The flow hit an error; `unhandled` marks errors the provider could not recover from
    Exception {
        error: ProviderError,
        unhandled: bool,
    },

    /// The user picked a programme to add
    FoundNew { programme_id: String },
}

/// Sink for a provider's find-new flow
#[derive(Debug, Clone)]
pub struct FindNewEvents {
    tx: mpsc::UnboundedSender<FindNewEvent>,
}

/// Create a connected find-new sink and receiver
pub fn find_new_channel() -> (FindNewEvents, mpsc::UnboundedReceiver<FindNewEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (FindNewEvents { tx }, rx)
}

impl FindNewEvents {
    pub fn view_change(&self, view: serde_json::Value) {
        let _ = self.tx.send(FindNewEvent::ViewChange(view));
    }

    pub fn exception(&self, error: ProviderError, unhandled: bool) {
        let _ = self.tx.send(FindNewEvent::Exception { error, unhandled });
    }

    pub fn found_new(&self, programme_id: impl Into<String>) {
        let _ = self.tx.send(FindNewEvent::FoundNew {
            programme_id: programme_id.into(),
        });
    }
}
