//! Admission gate bounding the number of jobs held at once.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Counts jobs that are queued or running against a fixed ceiling.
#[derive(Debug)]
pub struct AdmissionGate {
    depth: AtomicUsize,
    max_depth: usize,
}

impl AdmissionGate {
    /// Creates an empty gate admitting at most `max_depth` jobs.
    pub fn new(max_depth: usize) -> Self {
        Self {
            depth: AtomicUsize::new(0),
            max_depth,
        }
    }

    /// Admits one job if the gate is below its ceiling.
    ///
    /// The check and the increment happen in a single atomic step. On
    /// rejection nothing changes. The returned permit gives the slot back
    /// when dropped, so every exit path releases exactly once.
    pub fn try_admit(&self) -> Option<AdmissionPermit<'_>> {
        self.depth
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |depth| {
                (depth < self.max_depth).then_some(depth + 1)
            })
            .ok()
            .map(|_| AdmissionPermit { gate: self })
    }

    /// Number of jobs currently admitted.
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::Acquire)
    }

    /// Configured ceiling.
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    fn release(&self) {
        let previous = self.depth.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "admission gate released below zero");
    }
}

/// Proof of admission. Dropping it decrements the queue depth.
#[derive(Debug)]
pub struct AdmissionPermit<'a> {
    gate: &'a AdmissionGate,
}

impl Drop for AdmissionPermit<'_> {
    fn drop(&mut self) {
        self.gate.release();
    }
}
