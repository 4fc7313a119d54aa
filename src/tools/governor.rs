//! Concurrency Governor
//!
//! Bounded admission per tool class. The semaphore is created on first use
//! and lives as long as the tool class; the permit returned by `acquire`
//! releases its slot when dropped, whichever way the call ends.

use std::sync::{Arc, OnceLock};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

/// Default simultaneous executions per tool class
pub const DEFAULT_CONCURRENCY: usize = 2;

/// Fixed-capacity admission gate
#[derive(Debug)]
pub struct ConcurrencyGovernor {
    name: String,
    capacity: usize,
    slots: OnceLock<Arc<Semaphore>>,
}

impl ConcurrencyGovernor {
    /// Create a governor; a capacity of zero is raised to one
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            capacity: capacity.max(1),
            slots: OnceLock::new(),
        }
    }

    fn slots(&self) -> &Arc<Semaphore> {
        self.slots
            .get_or_init(|| Arc::new(Semaphore::new(self.capacity)))
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots free right now
    pub fn available(&self) -> usize {
        match self.slots.get() {
            Some(slots) => slots.available_permits(),
            None => self.capacity,
        }
    }

    /// Calls currently holding a slot
    pub fn in_flight(&self) -> usize {
        self.capacity - self.available()
    }

    /// Wait for a free slot
    ///
    /// Waiters are served in order by tokio's fair semaphore, so no caller
    /// starves. Returns `None` only if the semaphore was closed, which this
    /// type never does.
    pub async fn acquire(&self) -> Option<OwnedSemaphorePermit> {
        if self.available() == 0 {
            debug!(tool = %self.name, capacity = self.capacity, "Waiting for a concurrency slot");
        }
        Arc::clone(self.slots()).acquire_owned().await.ok()
    }
}
