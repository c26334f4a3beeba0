//! Remote task store abstraction.
//!
//! Defines the [`RemoteTaskStore`] trait over the per-user remote task
//! collection: one-shot fetches, document writes, and change-feed
//! subscriptions. The production backend is an external document
//! database; [`memory::MemoryRemoteStore`] is the in-process
//! implementation used by tests.

pub mod memory;

use std::time::Duration;

use chrono::{NaiveDate, TimeZone, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use tasknest_proto::event::ChangeEvent;
use tasknest_proto::task::{Task, TaskId};

/// Errors that can occur during remote store operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RemoteError {
    /// No document with the requested id exists.
    #[error("task not found")]
    NotFound,

    /// The store is unreachable (network or backend outage). Retryable.
    #[error("remote store unavailable: {0}")]
    Unavailable(String),

    /// The store rejected the operation on auth/rule grounds. Not retryable.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// A one-shot fetch exceeded its caller-supplied timeout.
    #[error("remote operation timed out")]
    Timeout,

    /// A stored document does not deserialize into a task.
    #[error("invalid task document: {0}")]
    InvalidDocument(String),
}

impl RemoteError {
    /// Whether retrying the same operation can reasonably succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout)
    }
}

/// Retry policy for remote writes.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Number of retries after the initial attempt.
    pub write_retries: u32,
    /// Delay between attempts.
    pub retry_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            write_retries: 1,
            retry_delay: Duration::from_millis(200),
        }
    }
}

/// Runs a remote operation, retrying retryable failures.
///
/// Non-retryable errors (`NotFound`, `PermissionDenied`, malformed
/// documents) are returned immediately.
///
/// # Errors
///
/// Returns the last error once the retry budget is exhausted.
pub async fn with_retry<T, F, Fut>(config: &RetryConfig, mut op: F) -> Result<T, RemoteError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, RemoteError>>,
{
    let mut last_err = None;
    for attempt in 0..=config.write_retries {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() => {
                tracing::debug!(
                    attempt,
                    max_retries = config.write_retries,
                    error = %e,
                    "remote operation failed, will retry"
                );
                last_err = Some(e);
                if attempt < config.write_retries {
                    tokio::time::sleep(config.retry_delay).await;
                }
            }
            Err(e) => return Err(e),
        }
    }
    Err(last_err.unwrap_or(RemoteError::Timeout))
}

/// An open change-feed subscription for one user's collection.
///
/// Infinite and restartable: on subscribe the store replays the full
/// current state as `Added` events before live changes. Feed errors are
/// emitted inline as `Err` items and do not end the feed.
///
/// Dropping or [`cancel`](Self::cancel)ling the feed unregisters the
/// underlying listener; after `cancel` resolves, no further items are
/// produced.
#[derive(Debug)]
pub struct ChangeFeed {
    rx: mpsc::Receiver<Result<ChangeEvent, RemoteError>>,
    task: Option<JoinHandle<()>>,
}

impl ChangeFeed {
    /// Assembles a feed from a receiving channel and its producer task.
    ///
    /// Store implementations hand the channel's sender to a task that
    /// pushes replay and live events; the feed owns both ends of the
    /// lifecycle.
    #[must_use]
    pub fn from_parts(
        rx: mpsc::Receiver<Result<ChangeEvent, RemoteError>>,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            rx,
            task: Some(task),
        }
    }

    /// Receives the next feed item.
    ///
    /// Returns `None` only after cancellation or store teardown.
    pub async fn recv(&mut self) -> Option<Result<ChangeEvent, RemoteError>> {
        self.rx.recv().await
    }

    /// Cancels the subscription. When this returns, the producer task
    /// has exited and no further items will be emitted.
    pub async fn cancel(mut self) {
        if let Some(handle) = self.task.take() {
            handle.abort();
            let _ = handle.await;
        }
    }
}

impl Drop for ChangeFeed {
    fn drop(&mut self) {
        if let Some(handle) = self.task.take() {
            handle.abort();
        }
    }
}

/// An open live day-query subscription.
///
/// Emits the full ordered day snapshot on subscribe and after every
/// change to the user's collection.
#[derive(Debug)]
pub struct DayFeed {
    rx: mpsc::Receiver<Result<Vec<Task>, RemoteError>>,
    task: Option<JoinHandle<()>>,
}

impl DayFeed {
    /// Assembles a feed from a receiving channel and its producer task.
    #[must_use]
    pub fn from_parts(
        rx: mpsc::Receiver<Result<Vec<Task>, RemoteError>>,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            rx,
            task: Some(task),
        }
    }

    /// Receives the next day snapshot.
    pub async fn recv(&mut self) -> Option<Result<Vec<Task>, RemoteError>> {
        self.rx.recv().await
    }

    /// Cancels the subscription; same guarantee as [`ChangeFeed::cancel`].
    pub async fn cancel(mut self) {
        if let Some(handle) = self.task.take() {
            handle.abort();
            let _ = handle.await;
        }
    }
}

impl Drop for DayFeed {
    fn drop(&mut self) {
        if let Some(handle) = self.task.take() {
            handle.abort();
        }
    }
}

/// Async trait over the remote per-user task collection.
///
/// Operations return `Result` values; nothing throws across this
/// boundary. Writes are full-document (last-writer-wins, no merge).
pub trait RemoteTaskStore: Send + Sync {
    /// Writes a new task under the owning user's collection and patches
    /// the stored document with its assigned id, which is returned.
    fn add_task(
        &self,
        task: &Task,
    ) -> impl std::future::Future<Output = Result<TaskId, RemoteError>> + Send;

    /// Full-document overwrite keyed by `task_id`.
    fn update_task(
        &self,
        task: &Task,
    ) -> impl std::future::Future<Output = Result<(), RemoteError>> + Send;

    /// One-shot fetch of the user's whole collection (cold-start
    /// reconciliation).
    fn get_all_once(
        &self,
        user_id: &str,
    ) -> impl std::future::Future<Output = Result<Vec<Task>, RemoteError>> + Send;

    /// One-shot fetch by id; [`RemoteError::NotFound`] when absent.
    fn get_by_id(
        &self,
        id: &TaskId,
    ) -> impl std::future::Future<Output = Result<Task, RemoteError>> + Send;

    /// Deletes the document with the given id. Absent ids succeed.
    fn delete_task(
        &self,
        id: &TaskId,
    ) -> impl std::future::Future<Output = Result<(), RemoteError>> + Send;

    /// Opens the change feed for a user's collection.
    fn observe_changes_for_user(&self, user_id: &str) -> ChangeFeed;

    /// Opens a live query scoped to one calendar day, ordered by
    /// `time_start`.
    fn observe_for_date(&self, user_id: &str, date: NaiveDate) -> DayFeed;
}

/// `[start_of_day, start_of_next_day)` in epoch milliseconds (UTC).
#[must_use]
pub fn day_bounds(date: NaiveDate) -> (i64, i64) {
    let start = Utc
        .from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN))
        .timestamp_millis();
    let end = date
        .succ_opt()
        .map_or(i64::MAX, |next| {
            Utc.from_utc_datetime(&next.and_time(chrono::NaiveTime::MIN))
                .timestamp_millis()
        });
    (start, end)
}
