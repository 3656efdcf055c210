//! Exclusive access to the generation backend.
//!
//! A single-permit semaphore. Tokio's semaphore hands out permits in the
//! order `acquire` was called, which gives admitted jobs FIFO access.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::{DaemonError, Result};

/// The "backend is busy" resource.
#[derive(Debug, Clone)]
pub struct ExclusiveSlot {
    permit: Arc<Semaphore>,
}

impl Default for ExclusiveSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl ExclusiveSlot {
    pub fn new() -> Self {
        Self {
            permit: Arc::new(Semaphore::new(1)),
        }
    }

    /// Waits for the slot.
    ///
    /// The guard is owned, so it can travel with the backend call to
    /// another thread and release the slot only when that call returns.
    pub async fn acquire(&self) -> Result<SlotGuard> {
        let permit = Arc::clone(&self.permit)
            .acquire_owned()
            .await
            .map_err(|_| DaemonError::worker_fault("exclusive slot closed"))?;
        Ok(SlotGuard { _permit: permit })
    }

    /// Returns true while some job holds the slot.
    pub fn is_held(&self) -> bool {
        self.permit.available_permits() == 0
    }
}

/// Holding this means holding the slot.
#[derive(Debug)]
pub struct SlotGuard {
    _permit: OwnedSemaphorePermit,
}
