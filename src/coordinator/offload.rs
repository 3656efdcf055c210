//! Dedicated worker thread for blocking backend calls.
//!
//! The backend's calls are synchronous and can run for minutes. They are
//! handed to one named worker thread over a channel, and the async side
//! awaits the result through a oneshot.

use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::thread;

use tokio::sync::oneshot;

use crate::error::{DaemonError, Result};

type Work = Box<dyn FnOnce() + Send + 'static>;
type Reclaim<T> = Arc<dyn Fn(T) + Send + Sync + 'static>;

/// Single-worker executor for blocking calls.
///
/// Dropping the offloader closes the channel. The worker finishes the call
/// it is running, if any, and exits on its own; nothing waits for it.
#[derive(Debug)]
pub struct BlockingOffloader {
    sender: Sender<Work>,
    name: String,
}

impl BlockingOffloader {
    /// Starts the worker thread.
    pub fn spawn(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let (sender, receiver) = mpsc::channel::<Work>();

        thread::Builder::new()
            .name(name.clone())
            .spawn(move || worker_loop(receiver))
            .map_err(|e| DaemonError::worker_fault(format!("cannot start {}: {}", name, e)))?;

        Ok(Self { sender, name })
    }

    /// Worker thread name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queues `work` on the worker and returns a future for its result.
    ///
    /// Dropping the future does not stop the call; it runs to completion
    /// and its result is discarded.
    pub fn submit<F, T>(&self, work: F) -> Pending<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        self.dispatch(work, None)
    }

    /// Like [`submit`](Self::submit), but a result nobody is waiting for
    /// any more is passed to `reclaim` instead of being dropped.
    ///
    /// `reclaim` runs on the worker when the call finishes after the future
    /// was dropped, or in the future's drop when the result was already
    /// delivered but never read.
    pub fn submit_reclaiming<F, T, R>(&self, work: F, reclaim: R) -> Pending<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
        R: Fn(T) + Send + Sync + 'static,
    {
        self.dispatch(work, Some(Arc::new(reclaim)))
    }

    fn dispatch<F, T>(&self, work: F, reclaim: Option<Reclaim<T>>) -> Pending<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let on_worker = reclaim.clone();
        let job: Work = Box::new(move || {
            if let Err(unclaimed) = tx.send(work()) {
                if let Some(reclaim) = on_worker {
                    reclaim(unclaimed);
                }
            }
        });

        // On failure the job, and the sender inside it, is dropped here and
        // the pending future resolves to a worker fault.
        if self.sender.send(job).is_err() {
            tracing::error!(worker = %self.name, "Offload worker is gone");
        }

        Pending {
            receiver: rx,
            reclaim,
        }
    }
}

/// Result of a call running on the offload worker.
pub struct Pending<T> {
    receiver: oneshot::Receiver<T>,
    reclaim: Option<Reclaim<T>>,
}

impl<T> std::fmt::Debug for Pending<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pending")
            .field("reclaims", &self.reclaim.is_some())
            .finish()
    }
}

impl<T> Future for Pending<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver).poll(cx).map(|result| {
            result.map_err(|_| DaemonError::worker_fault("call aborted before producing a result"))
        })
    }
}

impl<T> Drop for Pending<T> {
    fn drop(&mut self) {
        let Some(reclaim) = self.reclaim.take() else {
            return;
        };
        // After close the worker's send fails, so the result is reclaimed
        // exactly once: either here or on the worker.
        self.receiver.close();
        if let Ok(unclaimed) = self.receiver.try_recv() {
            reclaim(unclaimed);
        }
    }
}

fn worker_loop(receiver: Receiver<Work>) {
    while let Ok(work) = receiver.recv() {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(work)) {
            tracing::error!(reason = panic_message(&*payload), "Offloaded call panicked");
        }
    }
    tracing::debug!("Offload worker exiting");
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}
