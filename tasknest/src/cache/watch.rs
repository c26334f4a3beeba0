//! Channel-backed live queries over a [`TaskCache`].
//!
//! Each `watch_*` function spawns a forwarding task that emits an
//! initial snapshot and then re-queries the cache on every committed
//! write, regardless of which component performed it. Snapshots are
//! handed to the consumer over a bounded mpsc channel, so a slow
//! consumer lags its own channel and coalesces to the latest state —
//! cache writers are never stalled.
//!
//! Cancellation is deterministic: after [`TaskWatch::cancel`] resolves,
//! the forwarding task has exited and no further snapshots arrive.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use tasknest_proto::task::{Task, TaskId};

use super::{CacheChange, TaskCache};

/// A live query handle yielding snapshots of type `T`.
///
/// The stream is infinite while observed; it ends only when cancelled
/// or when the cache itself is dropped.
#[derive(Debug)]
pub struct TaskWatch<T> {
    rx: mpsc::Receiver<T>,
    task: Option<JoinHandle<()>>,
}

impl<T> TaskWatch<T> {
    /// Assembles a watch from a receiving channel and its forwarding task.
    pub(crate) fn from_parts(rx: mpsc::Receiver<T>, task: JoinHandle<()>) -> Self {
        Self {
            rx,
            task: Some(task),
        }
    }

    /// Receives the next snapshot.
    ///
    /// Returns `None` once the watch has been cancelled or the cache
    /// has gone away.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Non-blocking receive, for draining in poll-based consumers.
    ///
    /// # Errors
    ///
    /// Returns the channel's `TryRecvError` when no snapshot is ready.
    pub fn try_recv(&mut self) -> Result<T, mpsc::error::TryRecvError> {
        self.rx.try_recv()
    }

    /// Stops the watch. When this returns, the forwarding task has
    /// exited and no further snapshots will be emitted.
    pub async fn cancel(mut self) {
        if let Some(handle) = self.task.take() {
            handle.abort();
            let _ = handle.await;
        }
    }
}

impl<T> Drop for TaskWatch<T> {
    fn drop(&mut self) {
        if let Some(handle) = self.task.take() {
            handle.abort();
        }
    }
}

/// Live query over the full cache, ordered by `date_start` descending.
pub fn watch_all<C>(cache: Arc<C>, buffer: usize) -> TaskWatch<Vec<Task>>
where
    C: TaskCache + 'static,
{
    let (tx, rx) = mpsc::channel(buffer);
    let handle = tokio::spawn(async move {
        let mut changes = cache.changes();
        loop {
            match cache.get_all().await {
                Ok(snapshot) => {
                    if tx.send(snapshot).await.is_err() {
                        break;
                    }
                }
                Err(e) => tracing::warn!(error = %e, "watch_all query failed"),
            }
            if !wait_change(&mut changes).await {
                break;
            }
        }
    });
    TaskWatch {
        rx,
        task: Some(handle),
    }
}

/// Live query for a single task by id.
///
/// An absent id emits `None` — a valid terminal empty state, not an
/// error. The watch keeps observing, so the task appearing later is
/// emitted as `Some`.
pub fn watch_by_id<C>(cache: Arc<C>, id: TaskId, buffer: usize) -> TaskWatch<Option<Task>>
where
    C: TaskCache + 'static,
{
    let (tx, rx) = mpsc::channel(buffer);
    let handle = tokio::spawn(async move {
        let mut changes = cache.changes();
        loop {
            match cache.get_by_id(&id).await {
                Ok(snapshot) => {
                    if tx.send(snapshot).await.is_err() {
                        break;
                    }
                }
                Err(e) => tracing::warn!(task_id = %id, error = %e, "watch_by_id query failed"),
            }
            if !wait_change(&mut changes).await {
                break;
            }
        }
    });
    TaskWatch {
        rx,
        task: Some(handle),
    }
}

/// Live query over `[start_ms, end_ms)` on `date_start`, ordered by
/// `time_start` ascending.
pub fn watch_by_date_range<C>(
    cache: Arc<C>,
    start_ms: i64,
    end_ms: i64,
    buffer: usize,
) -> TaskWatch<Vec<Task>>
where
    C: TaskCache + 'static,
{
    let (tx, rx) = mpsc::channel(buffer);
    let handle = tokio::spawn(async move {
        let mut changes = cache.changes();
        loop {
            match cache.get_by_date_range(start_ms, end_ms).await {
                Ok(snapshot) => {
                    if tx.send(snapshot).await.is_err() {
                        break;
                    }
                }
                Err(e) => tracing::warn!(error = %e, "watch_by_date_range query failed"),
            }
            if !wait_change(&mut changes).await {
                break;
            }
        }
    });
    TaskWatch {
        rx,
        task: Some(handle),
    }
}

/// Waits for the next committed write.
///
/// Returns `false` when the cache has gone away. A lagged receiver
/// coalesces: the pending snapshots it missed are superseded by one
/// fresh re-query.
async fn wait_change(rx: &mut broadcast::Receiver<CacheChange>) -> bool {
    match rx.recv().await {
        Ok(_) => true,
        Err(broadcast::error::RecvError::Lagged(skipped)) => {
            tracing::debug!(skipped, "cache watcher lagged, coalescing to latest");
            true
        }
        Err(broadcast::error::RecvError::Closed) => false,
    }
}
