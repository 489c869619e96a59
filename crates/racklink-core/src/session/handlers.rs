use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::model::{EventKind, InboundEvent};

type Handler = Arc<dyn Fn(&InboundEvent) + Send + Sync>;

/// Returned by [`RealtimeSession::on`](super::RealtimeSession::on); pass
/// to `off` to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// Durable per-kind handlers, invoked in registration order.
#[derive(Default)]
pub(crate) struct HandlerRegistry {
    next_id: AtomicU64,
    handlers: RwLock<Vec<(HandlerId, EventKind, Handler)>>,
}

impl HandlerRegistry {
    pub(crate) fn add(&self, kind: EventKind, handler: Handler) -> HandlerId {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, kind, handler));
        id
    }

    pub(crate) fn remove(&self, id: HandlerId) -> bool {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        let before = handlers.len();
        handlers.retain(|(existing, _, _)| *existing != id);
        handlers.len() != before
    }

    /// Invoke every handler for the event's kind. Handlers run outside the
    /// lock, so they may register or remove handlers themselves.
    pub(crate) fn dispatch(&self, event: &InboundEvent) -> usize {
        let kind = event.kind();
        let matching: Vec<Handler> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(_, k, _)| *k == kind)
            .map(|(_, _, h)| Arc::clone(h))
            .collect();
        for handler in &matching {
            handler(event);
        }
        matching.len()
    }
}
