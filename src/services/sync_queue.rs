//! Background synchronization queue.
//!
//! A [`SyncQueue`] accepts lazily-started futures and runs them one at a time, in
//! the order they were enqueued, on a single consumer task. Producers never wait
//! for the work itself; they get a [`WorkHandle`] they may await or drop.
//!
//! # Shutdown
//!
//! Cancelling the queue's token (or calling [`SyncQueue::shutdown`]) makes the
//! consumer stop waiting for new work, close the channel and drain everything that
//! was already accepted. Later calls to [`SyncQueue::enqueue`] fail with
//! [`QueueError::Closed`] instead of being dropped silently.

use crate::metrics::{QueueMetrics, QueueMetricsSnapshot};
use futures::FutureExt;
use futures::future::BoxFuture;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("Queue '{0}' is closed and no longer accepts work")]
    Closed(String),
}

struct Job<T> {
    work: BoxFuture<'static, T>,
    reply: oneshot::Sender<T>,
}

/// Completion handle for one enqueued work item.
#[derive(Debug)]
pub struct WorkHandle<T> {
    receiver: oneshot::Receiver<T>,
}

impl<T> WorkHandle<T> {
    /// Wait for the item to run. `None` if it panicked.
    pub async fn wait(self) -> Option<T> {
        self.receiver.await.ok()
    }
}

/// FIFO of futures drained by exactly one consumer task.
pub struct SyncQueue<T> {
    name: Arc<str>,
    sender: mpsc::UnboundedSender<Job<T>>,
    cancel: CancellationToken,
    metrics: Arc<QueueMetrics>,
    worker: Mutex<Option<JoinHandle<u64>>>,
}

impl<T: Send + 'static> SyncQueue<T> {
    /// Start a queue whose consumer runs on `runtime`.
    ///
    /// The queue stops when `cancel` (or [`shutdown`](Self::shutdown)) fires; it
    /// watches a child of `cancel`, so shutting one queue down leaves siblings alone.
    pub fn spawn_on(name: &str, runtime: &Handle, cancel: &CancellationToken) -> Self {
        let name: Arc<str> = Arc::from(name);
        let (sender, receiver) = mpsc::unbounded_channel();
        let cancel = cancel.child_token();
        let metrics = Arc::new(QueueMetrics::new());

        let worker = runtime.spawn(consume(
            name.clone(),
            receiver,
            cancel.clone(),
            metrics.clone(),
        ));
        tracing::debug!("Started sync queue '{}'", name);

        Self {
            name,
            sender,
            cancel,
            metrics,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// [`spawn_on`](Self::spawn_on) the current runtime. Panics outside a runtime.
    pub fn spawn(name: &str, cancel: &CancellationToken) -> Self {
        Self::spawn_on(name, &Handle::current(), cancel)
    }

    /// Queue `work` behind everything already accepted. It is not polled until the
    /// consumer reaches it.
    pub fn enqueue<F>(&self, work: F) -> Result<WorkHandle<T>, QueueError>
    where
        F: Future<Output = T> + Send + 'static,
    {
        let (reply, receiver) = oneshot::channel();
        let job = Job {
            work: work.boxed(),
            reply,
        };

        if self.sender.send(job).is_err() {
            self.metrics.record_rejected();
            tracing::warn!("Rejected work for closed queue '{}'", self.name);
            return Err(QueueError::Closed(self.name.to_string()));
        }

        self.metrics.record_enqueued();
        Ok(WorkHandle { receiver })
    }

    /// Cancel the queue, wait for the final drain and return how many items the
    /// consumer ran over its lifetime. Later calls return 0.
    pub async fn shutdown(&self) -> u64 {
        self.cancel.cancel();

        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(worker) = worker else {
            return 0;
        };

        match worker.await {
            Ok(processed) => processed,
            Err(e) => {
                tracing::error!("Consumer of queue '{}' failed: {}", self.name, e);
                0
            }
        }
    }
}

impl<T> SyncQueue<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Accepted items that have not finished yet (including the one running).
    pub fn pending(&self) -> u64 {
        self.metrics.snapshot().pending()
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// True once the consumer has exited (or was already awaited by `shutdown`).
    pub fn is_finished(&self) -> bool {
        self.worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_none_or(JoinHandle::is_finished)
    }

    pub fn metrics(&self) -> QueueMetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn log_summary(&self) {
        self.metrics.log_summary(&self.name);
    }
}

async fn consume<T>(
    name: Arc<str>,
    mut receiver: mpsc::UnboundedReceiver<Job<T>>,
    cancel: CancellationToken,
    metrics: Arc<QueueMetrics>,
) -> u64 {
    let mut processed = 0;

    loop {
        let job = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            job = receiver.recv() => job,
        };
        match job {
            Some(job) => {
                run(&name, job, &metrics).await;
                processed += 1;
            }
            // Every producer is gone; nothing left to wait for.
            None => {
                tracing::debug!("Queue '{}' has no producers left", name);
                return processed;
            }
        }
    }

    receiver.close();
    let mut drained = 0;
    while let Some(job) = receiver.recv().await {
        run(&name, job, &metrics).await;
        drained += 1;
    }
    processed += drained;

    tracing::debug!(
        "Queue '{}' stopped after draining {} item(s), {} total",
        name,
        drained,
        processed
    );
    processed
}

async fn run<T>(name: &str, job: Job<T>, metrics: &QueueMetrics) {
    let Job { work, reply } = job;
    let started = Instant::now();

    match AssertUnwindSafe(work).catch_unwind().await {
        Ok(value) => {
            metrics.record_completed(started.elapsed());
            // The producer may have dropped its handle.
            let _ = reply.send(value);
        }
        Err(_) => {
            metrics.record_panicked(started.elapsed());
            tracing::error!("Work item on queue '{}' panicked", name);
        }
    }
}
