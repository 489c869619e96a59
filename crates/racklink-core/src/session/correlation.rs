// ── Request/acknowledgement correlation ──
//
// A pending request is an `AckPattern` plus a oneshot sender. Each entry
// settles exactly once: resolved by the first matching event, removed by
// its awaiting caller on timeout, or failed when the session closes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::oneshot;

use crate::error::CommandError;
use crate::model::{EventKind, InboundEvent, TagAction};

pub(crate) type AckOutcome = Result<Arc<InboundEvent>, CommandError>;

// ── AckPattern ───────────────────────────────────────────────────────

/// Which inbound event settles a request.
///
/// Filters only constrain events that carry the corresponding field: an
/// ack without a `deviceId` matches any device filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckPattern {
    kind: EventKind,
    device_id: Option<String>,
    tag_action: Option<TagAction>,
    command: Option<String>,
}

impl AckPattern {
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            device_id: None,
            tag_action: None,
            command: None,
        }
    }

    pub fn for_device(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    pub fn with_tag_action(mut self, action: TagAction) -> Self {
        self.tag_action = Some(action);
        self
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn matches(&self, event: &InboundEvent) -> bool {
        if event.kind() != self.kind {
            return false;
        }
        if let (Some(want), Some(got)) = (&self.device_id, event.device_id()) {
            if want != got {
                return false;
            }
        }
        match event {
            InboundEvent::TagEvent(tag) => self.tag_action.is_none_or(|want| want == tag.action),
            InboundEvent::CommandResponse(resp) => match (&self.command, &resp.command) {
                (Some(want), Some(got)) => want == got,
                _ => true,
            },
            _ => true,
        }
    }
}

impl From<EventKind> for AckPattern {
    fn from(kind: EventKind) -> Self {
        Self::new(kind)
    }
}

// ── PendingRequests ──────────────────────────────────────────────────

struct PendingEntry {
    id: u64,
    pattern: AckPattern,
    tx: oneshot::Sender<AckOutcome>,
}

/// Requests awaiting an acknowledgement, oldest first.
#[derive(Default)]
pub(crate) struct PendingRequests {
    next_id: AtomicU64,
    entries: Mutex<Vec<PendingEntry>>,
}

impl PendingRequests {
    pub(crate) fn register(&self, pattern: AckPattern) -> (u64, oneshot::Receiver<AckOutcome>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(PendingEntry { id, pattern, tx });
        (id, rx)
    }

    /// Settle the oldest request matching `event`. Negative acks settle it
    /// as `Rejected`. Returns whether a request was settled.
    pub(crate) fn resolve(&self, event: &Arc<InboundEvent>) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(pos) = entries.iter().position(|e| e.pattern.matches(event)) else {
            return false;
        };
        let entry = entries.remove(pos);

        let outcome = match event.rejection() {
            Some(reason) => Err(CommandError::Rejected { reason }),
            None => Ok(Arc::clone(event)),
        };
        tracing::debug!(request = entry.id, kind = %event.kind(), ok = outcome.is_ok(), "request settled");
        // Sent under the lock: once an entry is gone, its outcome is in the channel.
        let _ = entry.tx.send(outcome);
        true
    }

    /// Drop a request whose caller stopped waiting. Returns `false` if it
    /// had already been settled or cancelled.
    pub(crate) fn cancel(&self, id: u64) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|e| e.id != id);
        entries.len() != before
    }

    /// Stop waiting on `id`. An outcome that settled between the caller's
    /// deadline and this call is handed back instead of being lost.
    pub(crate) fn abandon(
        &self,
        id: u64,
        rx: &mut oneshot::Receiver<AckOutcome>,
    ) -> Option<AckOutcome> {
        if self.cancel(id) {
            return None;
        }
        rx.try_recv().ok()
    }

    /// Fail every outstanding request.
    pub(crate) fn fail_all(&self, error: &CommandError) {
        let drained: Vec<PendingEntry> = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for entry in drained {
            let _ = entry.tx.send(Err(error.clone()));
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
