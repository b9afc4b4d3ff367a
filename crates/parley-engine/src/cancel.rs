//! Tracking of the one in-flight remote request and its cancellation.
//!
//! Every reset bumps an epoch. A request may only begin under the current epoch, and a
//! result that arrives after the epoch moved on is discarded, so a callback from before
//! a reset can never touch the new session.

use parley_voice::PlaybackDriver;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Transcription,
    Reasoning,
    Synthesis,
    Playback,
    Derivation,
    CaseFiling,
}

/// The unit of cancellation.
#[derive(Debug)]
pub struct PendingRequest {
    pub id: u64,
    pub kind: RequestKind,
    pub epoch: u64,
    token: CancellationToken,
}

impl PendingRequest {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

#[derive(Debug, Default)]
struct Slot {
    epoch: u64,
    current: Option<(u64, RequestKind, CancellationToken)>,
}

#[derive(Debug, Default)]
struct TrackerInner {
    slot: Mutex<Slot>,
    next_id: AtomicU64,
}

#[derive(Debug, Clone, Default)]
pub struct RequestTracker {
    inner: Arc<TrackerInner>,
}

impl RequestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> MutexGuard<'_, Slot> {
        self.inner
            .slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn epoch(&self) -> u64 {
        self.slot().epoch
    }

    pub fn is_stale(&self, epoch: u64) -> bool {
        self.slot().epoch != epoch
    }

    /// Kind of the request currently in flight, if any.
    pub fn current(&self) -> Option<RequestKind> {
        self.slot().current.as_ref().map(|(_, kind, _)| *kind)
    }

    /// Register a request under `epoch`. `None` if a reset already moved the epoch on.
    pub fn begin(&self, epoch: u64, kind: RequestKind) -> Option<PendingRequest> {
        let mut slot = self.slot();
        if slot.epoch != epoch {
            return None;
        }
        if let Some((_, previous, token)) = slot.current.take() {
            warn!(?previous, ?kind, "replacing an unfinished request");
            token.cancel();
        }
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let token = CancellationToken::new();
        slot.current = Some((id, kind, token.clone()));
        Some(PendingRequest {
            id,
            kind,
            epoch,
            token,
        })
    }

    pub fn finish(&self, request: &PendingRequest) {
        let mut slot = self.slot();
        if matches!(slot.current, Some((id, _, _)) if id == request.id) {
            slot.current = None;
        }
    }

    /// Cancel whatever is in flight and start a new epoch. Returns the new epoch.
    pub fn cancel_all(&self) -> u64 {
        let mut slot = self.slot();
        slot.epoch += 1;
        if let Some((_, kind, token)) = slot.current.take() {
            debug!(?kind, "cancelling in-flight request");
            token.cancel();
        }
        slot.epoch
    }

    /// Run `fut` as the current request. `None` when it was cancelled, could not start,
    /// or finished after a reset.
    pub async fn run<F>(&self, epoch: u64, kind: RequestKind, fut: F) -> Option<F::Output>
    where
        F: Future,
    {
        let request = self.begin(epoch, kind)?;
        let output = tokio::select! {
            biased;
            _ = request.token().cancelled() => None,
            out = fut => Some(out),
        };
        self.finish(&request);
        if self.is_stale(epoch) {
            return None;
        }
        output
    }
}

/// Out-of-band interrupt usable while a turn is in flight.
#[derive(Clone)]
pub struct ResetHandle {
    tracker: RequestTracker,
    playback: Arc<dyn PlaybackDriver>,
}

impl ResetHandle {
    pub fn new(tracker: RequestTracker, playback: Arc<dyn PlaybackDriver>) -> Self {
        Self { tracker, playback }
    }

    /// Cancel the in-flight request and silence playback. Capture is stopped by the
    /// orchestrator's own reset.
    pub fn interrupt(&self) {
        let epoch = self.tracker.cancel_all();
        self.playback.stop();
        debug!(epoch, "conversation interrupted");
    }
}
