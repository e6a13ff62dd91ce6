//! Single-lane FIFO work queue guarding the one conversational surface.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::QueueError;

/// Tasks run one at a time in enqueue order. A task starts only after its
/// predecessor finished, whether it returned, failed or panicked. Entries
/// cannot be cancelled: dropping a [`QueueHandle`] detaches the caller but
/// the task still runs.
#[derive(Debug, Default)]
pub struct RequestQueue {
    tail: Mutex<Option<oneshot::Receiver<()>>>,
    pending: Arc<AtomicUsize>,
}

impl RequestQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Must be called from within a tokio runtime.
    pub fn enqueue<F, T>(&self, task: F) -> QueueHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (finished_tx, finished_rx) = oneshot::channel();
        let previous = self
            .tail
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(finished_rx);
        let position = self.pending.fetch_add(1, Ordering::SeqCst);
        debug!(position, "request enqueued");

        let signal = FinishSignal {
            finished: Some(finished_tx),
            pending: self.pending.clone(),
        };
        let inner = tokio::spawn(async move {
            let _signal = signal;
            if let Some(previous) = previous {
                // An error only means the predecessor unwound; the lane is free either way.
                let _ = previous.await;
            }
            task.await
        });
        QueueHandle { inner }
    }

    /// Tasks enqueued and not yet finished, including the running one.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }
}

struct FinishSignal {
    finished: Option<oneshot::Sender<()>>,
    pending: Arc<AtomicUsize>,
}

impl Drop for FinishSignal {
    fn drop(&mut self) {
        self.pending.fetch_sub(1, Ordering::SeqCst);
        if let Some(finished) = self.finished.take() {
            let _ = finished.send(());
        }
    }
}

/// Resolves with the output of the task it was returned for.
#[derive(Debug)]
pub struct QueueHandle<T> {
    inner: JoinHandle<T>,
}

impl<T> Future for QueueHandle<T> {
    type Output = Result<T, QueueError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.inner)
            .poll(cx)
            .map(|result| result.map_err(|_| QueueError::TaskAborted))
    }
}
