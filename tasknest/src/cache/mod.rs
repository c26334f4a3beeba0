//! Local durable cache of task records.
//!
//! Defines the [`TaskCache`] trait that all cache implementations must
//! satisfy. Concrete implementations include:
//! - [`memory::MemoryCache`] — in-memory store for tests and fast startup
//! - [`sqlite::SqliteCache`] — durable SQLite-backed store
//!
//! The cache is the single mutable shared resource of the engine: the
//! sync engine's echoes and the sign-out purge both serialize through
//! its write API, and every committed write is announced on the change
//! channel so live queries ([`watch`]) re-emit regardless of which
//! component performed the write.

pub mod memory;
pub mod sqlite;
pub mod watch;

use tokio::sync::broadcast;

use tasknest_proto::task::{Task, TaskId};

/// Capacity of the cache change broadcast channel.
///
/// Watchers that fall further behind than this coalesce to the latest
/// snapshot instead of stalling writers.
pub const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// Errors that can occur during cache operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// A read operation failed.
    #[error("cache read failed: {0}")]
    ReadFailed(String),

    /// A write operation failed.
    #[error("cache write failed: {0}")]
    WriteFailed(String),

    /// The underlying storage is unavailable.
    #[error("cache storage unavailable: {0}")]
    Unavailable(String),
}

/// Notification of a committed cache write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheChange {
    /// A single record was inserted or replaced.
    Upserted(TaskId),
    /// A batch of records was inserted or replaced.
    UpsertedBatch(usize),
    /// A record was deleted.
    Deleted(TaskId),
    /// The whole cache was purged (sign-out).
    Cleared,
}

/// Async trait for the durable task cache.
///
/// # Invariants
///
/// - `upsert` replaces on conflict by `task_id` and is idempotent.
/// - `delete` of an absent id is a no-op, not an error.
/// - `delete_all` is transactional (all-or-nothing).
/// - Every committed write fires exactly one [`CacheChange`] on the
///   channel returned by [`changes`](TaskCache::changes).
pub trait TaskCache: Send + Sync {
    /// Insert or replace a single task by id.
    fn upsert(
        &self,
        task: &Task,
    ) -> impl std::future::Future<Output = Result<(), CacheError>> + Send;

    /// Insert or replace a batch of tasks in one transaction.
    fn upsert_all(
        &self,
        tasks: &[Task],
    ) -> impl std::future::Future<Output = Result<(), CacheError>> + Send;

    /// Delete a task by id. Absent ids are ignored.
    fn delete(
        &self,
        id: &TaskId,
    ) -> impl std::future::Future<Output = Result<(), CacheError>> + Send;

    /// Purge every record, returning how many were removed.
    ///
    /// Used only at sign-out; must be all-or-nothing.
    fn delete_all(&self) -> impl std::future::Future<Output = Result<usize, CacheError>> + Send;

    /// All cached tasks ordered by `date_start` descending.
    fn get_all(&self) -> impl std::future::Future<Output = Result<Vec<Task>, CacheError>> + Send;

    /// A single task by id; absent is `Ok(None)`, never an error.
    fn get_by_id(
        &self,
        id: &TaskId,
    ) -> impl std::future::Future<Output = Result<Option<Task>, CacheError>> + Send;

    /// Tasks with `date_start` in `[start_ms, end_ms)`, ordered by
    /// `time_start` ascending.
    fn get_by_date_range(
        &self,
        start_ms: i64,
        end_ms: i64,
    ) -> impl std::future::Future<Output = Result<Vec<Task>, CacheError>> + Send;

    /// Subscribe to committed-write notifications.
    fn changes(&self) -> broadcast::Receiver<CacheChange>;
}

/// Sorts a snapshot the way `get_all` promises: `date_start` descending,
/// ties broken by creation time so the order is stable.
pub(crate) fn sort_all(tasks: &mut [Task]) {
    tasks.sort_by(|a, b| {
        b.date_start
            .cmp(&a.date_start)
            .then_with(|| b.created_at.cmp(&a.created_at))
    });
}

/// Sorts a day snapshot the way `get_by_date_range` promises:
/// `time_start` ascending, stable by creation time.
pub(crate) fn sort_day(tasks: &mut [Task]) {
    tasks.sort_by(|a, b| {
        a.time_start
            .cmp(&b.time_start)
            .then_with(|| a.created_at.cmp(&b.created_at))
    });
}
