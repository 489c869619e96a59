use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Process-wide cap on concurrent discovery probes.
///
/// Cloning shares the same permits, so a resolver and a sweeper built from
/// clones of one budget never exceed its capacity together.
#[derive(Debug, Clone)]
pub struct ProbeBudget {
    permits: Arc<Semaphore>,
    capacity: usize,
}

impl ProbeBudget {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.clamp(1, Semaphore::MAX_PERMITS);
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn in_flight(&self) -> usize {
        self.capacity - self.permits.available_permits()
    }

    /// Wait for a slot. The permit is returned when dropped.
    pub async fn acquire(&self) -> Option<OwnedSemaphorePermit> {
        Arc::clone(&self.permits).acquire_owned().await.ok()
    }
}
