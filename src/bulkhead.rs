//! Concurrency bounding per circuit.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tracing::trace;

/// Admission gate with a fixed number of execution slots and a bounded queue.
///
/// A caller first claims a place among `max_parallelization + max_queuing_actions`
/// admissions, failing immediately when none is left, then waits for one of
/// the `max_parallelization` execution slots.
#[derive(Debug)]
pub struct Bulkhead {
    admissions: Arc<Semaphore>,
    slots: Arc<Semaphore>,
    max_parallelization: usize,
    max_queuing_actions: usize,
}

/// Held for the duration of an admitted execution; releases both permits on drop.
#[derive(Debug)]
pub(crate) struct BulkheadPermit {
    _slot: OwnedSemaphorePermit,
    _admission: OwnedSemaphorePermit,
}

/// Returned when the bulkhead has no slot and no queue space left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BulkheadFull;

impl Bulkhead {
    pub(crate) fn new(max_parallelization: usize, max_queuing_actions: usize) -> Self {
        let max_parallelization = max_parallelization.clamp(1, Semaphore::MAX_PERMITS);
        let max_queuing_actions =
            max_queuing_actions.min(Semaphore::MAX_PERMITS - max_parallelization);
        Self {
            admissions: Arc::new(Semaphore::new(max_parallelization + max_queuing_actions)),
            slots: Arc::new(Semaphore::new(max_parallelization)),
            max_parallelization,
            max_queuing_actions,
        }
    }

    /// Concurrent executions allowed.
    pub fn max_parallelization(&self) -> usize {
        self.max_parallelization
    }

    /// Waiters allowed beyond the execution slots.
    pub fn max_queuing_actions(&self) -> usize {
        self.max_queuing_actions
    }

    /// Free execution slots right now.
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    pub(crate) async fn acquire(&self) -> Result<BulkheadPermit, BulkheadFull> {
        let admission = match Arc::clone(&self.admissions).try_acquire_owned() {
            Ok(permit) => permit,
            Err(TryAcquireError::NoPermits) | Err(TryAcquireError::Closed) => {
                trace!(
                    max_parallelization = self.max_parallelization,
                    max_queuing_actions = self.max_queuing_actions,
                    "bulkhead full"
                );
                return Err(BulkheadFull);
            }
        };

        // The slot semaphore is never closed.
        let slot = Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .map_err(|_| BulkheadFull)?;

        Ok(BulkheadPermit {
            _slot: slot,
            _admission: admission,
        })
    }
}
