// Queue metrics module
//
// Lock-free counters describing the life of a background sync queue

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Counters owned by one [`SyncQueue`](crate::services::SyncQueue).
///
/// Updated with relaxed atomics from both the producer and the consumer side;
/// read them through [`snapshot`](Self::snapshot) for a consistent-enough view.
#[derive(Debug)]
pub struct QueueMetrics {
    /// Work items accepted by `enqueue`
    pub enqueued: AtomicU64,

    /// Work items awaited to completion by the consumer
    pub completed: AtomicU64,

    /// Work items that panicked while being awaited
    pub panicked: AtomicU64,

    /// Work items refused because the queue was already closed
    pub rejected: AtomicU64,

    /// Total time spent awaiting items, in milliseconds
    pub busy_time_ms: AtomicU64,

    start_time: Instant,
}

/// Point-in-time copy of [`QueueMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueMetricsSnapshot {
    pub enqueued: u64,
    pub completed: u64,
    pub panicked: u64,
    pub rejected: u64,
}

impl QueueMetricsSnapshot {
    /// Items accepted but not yet finished.
    pub fn pending(&self) -> u64 {
        self.enqueued.saturating_sub(self.completed + self.panicked)
    }
}

impl QueueMetrics {
    pub fn new() -> Self {
        Self {
            enqueued: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            panicked: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            busy_time_ms: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_enqueued(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_completed(&self, duration: Duration) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        self.record_busy_time(duration);
    }

    pub fn record_panicked(&self, duration: Duration) {
        self.panicked.fetch_add(1, Ordering::Relaxed);
        self.record_busy_time(duration);
    }

    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    fn record_busy_time(&self, duration: Duration) {
        self.busy_time_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> QueueMetricsSnapshot {
        QueueMetricsSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            panicked: self.panicked.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Average time per finished item in milliseconds
    pub fn avg_item_time_ms(&self) -> f64 {
        let snapshot = self.snapshot();
        let finished = snapshot.completed + snapshot.panicked;
        if finished > 0 {
            self.busy_time_ms.load(Ordering::Relaxed) as f64 / finished as f64
        } else {
            0.0
        }
    }

    /// Log metrics summary for the queue called `name`
    pub fn log_summary(&self, name: &str) {
        let snapshot = self.snapshot();
        tracing::info!(
            "Queue '{}': {} enqueued, {} completed, {} panicked, {} rejected, {} pending",
            name,
            snapshot.enqueued,
            snapshot.completed,
            snapshot.panicked,
            snapshot.rejected,
            snapshot.pending()
        );
        tracing::info!(
            "Queue '{}': busy {:.2}s (avg {:.2}ms per item), uptime {:.2}s",
            name,
            self.busy_time_ms.load(Ordering::Relaxed) as f64 / 1000.0,
            self.avg_item_time_ms(),
            self.uptime().as_secs_f64()
        );
    }
}

impl Default for QueueMetrics {
    fn default() -> Self {
        Self::new()
    }
}
