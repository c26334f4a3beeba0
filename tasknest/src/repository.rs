//! Task repository — the façade the rest of the app depends on.
//!
//! Merges cache reads, remote writes, and the sync lifecycle into one
//! API. Writes go to the remote store only; the cache is populated by
//! the sync engine's echo of the resulting change events, keeping a
//! single write path into the cache. A successful write therefore means
//! "remote accepted — the local view may lag until the echo lands".
//!
//! Nothing here throws across the boundary: callers always receive a
//! `Result` they must inspect.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tokio::sync::{mpsc, watch};

use tasknest_proto::task::{Task, TaskId, ValidationError};

use crate::cache::watch::{TaskWatch, watch_all, watch_by_id};
use crate::cache::{CacheError, TaskCache};
use crate::config::EngineConfig;
use crate::remote::{RemoteError, RemoteTaskStore, RetryConfig, day_bounds, with_retry};
use crate::session::{AuthUser, SessionContext};
use crate::sync::{SyncEngine, SyncStatus};

/// Errors surfaced by repository operations.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    /// No user is signed in; operations that need a uid fail fast
    /// instead of silently using an empty id.
    #[error("no user is signed in")]
    Unauthenticated,

    /// The task belongs to a different user than the session's.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The task has never been persisted, so it cannot be addressed.
    #[error("task has no assigned id")]
    UnassignedTask,

    /// The task failed UI-boundary validation.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// The remote store rejected or failed the operation.
    #[error("remote store error: {0}")]
    Remote(#[from] RemoteError),

    /// The local cache failed the operation.
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),
}

/// Façade over cache, remote store, and sync engine.
pub struct TaskRepository<C, R> {
    cache: Arc<C>,
    remote: Arc<R>,
    sync: SyncEngine<C, R>,
    session: SessionContext,
    retry: RetryConfig,
    fetch_timeout: Duration,
    watch_buffer: usize,
}

impl<C, R> TaskRepository<C, R>
where
    C: TaskCache + 'static,
    R: RemoteTaskStore + 'static,
{
    /// Wires a repository over the given stores.
    pub fn new(cache: Arc<C>, remote: Arc<R>, config: &EngineConfig) -> Self {
        let sync = SyncEngine::new(Arc::clone(&cache), Arc::clone(&remote), config);
        Self {
            cache,
            remote,
            sync,
            session: SessionContext::new(),
            retry: config.retry_config(),
            fetch_timeout: config.fetch_timeout,
            watch_buffer: config.watch_buffer,
        }
    }

    /// The session context owned by this repository.
    #[must_use]
    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    /// Current sync engine state.
    pub async fn sync_status(&self) -> SyncStatus {
        self.sync.status().await
    }

    fn require_uid(&self) -> Result<String, RepoError> {
        self.session.current_uid().ok_or(RepoError::Unauthenticated)
    }

    // -- Writes (remote-authoritative) ------------------------------------

    /// Creates a task under the signed-in user's collection.
    ///
    /// The cache is not written here; it is populated when the sync
    /// engine echoes the remote `Added` event.
    ///
    /// # Errors
    ///
    /// Fails fast with [`RepoError::Unauthenticated`] when nobody is
    /// signed in, with a validation error for an unacceptable task, or
    /// with the remote error once write retries are exhausted.
    pub async fn add_task(&self, mut task: Task) -> Result<(), RepoError> {
        let uid = self.require_uid()?;
        task.user_id = uid;
        task.validate()?;

        let assigned = with_retry(&self.retry, || self.remote.add_task(&task)).await?;
        tracing::debug!(task_id = %assigned, "task added remotely, awaiting sync echo");
        Ok(())
    }

    /// Overwrites an existing task remotely (last-writer-wins).
    ///
    /// # Errors
    ///
    /// Same failure modes as [`add_task`](Self::add_task), plus
    /// [`RepoError::UnassignedTask`] for a never-persisted task and
    /// [`RepoError::PermissionDenied`] when the task belongs to a
    /// different user than the session's.
    pub async fn update_task(&self, task: Task) -> Result<(), RepoError> {
        let uid = self.require_uid()?;
        if !task.task_id.is_assigned() {
            return Err(RepoError::UnassignedTask);
        }
        if task.user_id != uid {
            return Err(RepoError::PermissionDenied(format!(
                "task belongs to {}, session user is {uid}",
                task.user_id
            )));
        }
        task.validate()?;

        with_retry(&self.retry, || self.remote.update_task(&task)).await?;
        Ok(())
    }

    /// Deletes a task remotely; the cache row goes away on the echo.
    ///
    /// # Errors
    ///
    /// Fails fast when nobody is signed in, otherwise surfaces the
    /// remote error once retries are exhausted.
    pub async fn delete_task(&self, id: &TaskId) -> Result<(), RepoError> {
        self.require_uid()?;
        with_retry(&self.retry, || self.remote.delete_task(id)).await?;
        Ok(())
    }

    // -- Reads (cache-authoritative) --------------------------------------

    /// Live view of a single task. An absent id emits `None` — a valid
    /// terminal empty state, not an error.
    #[must_use]
    pub fn get_task_by_id(&self, id: &TaskId) -> TaskWatch<Option<Task>> {
        watch_by_id(Arc::clone(&self.cache), id.clone(), self.watch_buffer)
    }

    /// One-shot cache read of a single task.
    ///
    /// # Errors
    ///
    /// Returns a cache error only on storage failure; absent is
    /// `Ok(None)`.
    pub async fn get_task_once(&self, id: &TaskId) -> Result<Option<Task>, RepoError> {
        Ok(self.cache.get_by_id(id).await?)
    }

    /// Live view of every cached task, `date_start` descending.
    #[must_use]
    pub fn observe_all_tasks(&self) -> TaskWatch<Vec<Task>> {
        watch_all(Arc::clone(&self.cache), self.watch_buffer)
    }

    /// Live view of the tasks on a day, recomputed whenever the observed
    /// date changes and on every cache write.
    ///
    /// Switch-latest semantics: a new date value supersedes the in-flight
    /// query for the old date, so consumers never see a stale day's
    /// snapshot after changing the date.
    #[must_use]
    pub fn observe_tasks_for_date(
        &self,
        dates: watch::Receiver<NaiveDate>,
    ) -> TaskWatch<Vec<Task>> {
        let cache = Arc::clone(&self.cache);
        let (tx, rx) = mpsc::channel(self.watch_buffer);
        let handle = tokio::spawn(async move {
            let mut dates = dates;
            let mut changes = cache.changes();
            loop {
                let date = *dates.borrow_and_update();
                let (start_ms, end_ms) = day_bounds(date);
                match cache.get_by_date_range(start_ms, end_ms).await {
                    Ok(snapshot) => {
                        // A date change during the query supersedes this
                        // snapshot; re-query instead of emitting it.
                        if dates.has_changed().unwrap_or(false) {
                            continue;
                        }
                        if tx.send(snapshot).await.is_err() {
                            return;
                        }
                    }
                    Err(e) => tracing::warn!(%date, error = %e, "day query failed"),
                }

                tokio::select! {
                    changed = dates.changed() => {
                        if changed.is_err() {
                            // Date source dropped: the view is over.
                            return;
                        }
                    }
                    recv = changes.recv() => match recv {
                        Ok(_) => {}
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::debug!(skipped, "day view lagged, coalescing");
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
                    }
                }
            }
        });
        TaskWatch::from_parts(rx, handle)
    }

    // -- Sync lifecycle ----------------------------------------------------

    /// Starts observing the signed-in user's remote collection.
    ///
    /// # Errors
    ///
    /// Fails fast with [`RepoError::Unauthenticated`] when nobody is
    /// signed in.
    pub async fn start_observing_tasks(&self) -> Result<(), RepoError> {
        let uid = self.require_uid()?;
        self.sync.start(&uid).await;
        Ok(())
    }

    /// Stops the sync subscription. Safe to call when already stopped.
    pub async fn stop_observing_tasks(&self) {
        self.sync.stop().await;
    }

    /// Cold-start reconciliation: one-shot remote fetch upserted into
    /// the cache in a single transaction.
    ///
    /// # Errors
    ///
    /// Surfaces [`RemoteError::Timeout`] when the fetch exceeds the
    /// configured timeout, plus remote/cache failures.
    pub async fn refresh(&self) -> Result<(), RepoError> {
        let uid = self.require_uid()?;
        let tasks = tokio::time::timeout(self.fetch_timeout, self.remote.get_all_once(&uid))
            .await
            .map_err(|_| RemoteError::Timeout)??;
        self.cache.upsert_all(&tasks).await?;
        tracing::info!(user_id = %uid, count = tasks.len(), "cache refreshed from remote");
        Ok(())
    }

    /// One-shot remote fetch by id, with the configured timeout.
    ///
    /// # Errors
    ///
    /// [`RemoteError::NotFound`] when absent, [`RemoteError::Timeout`]
    /// when the fetch exceeds the timeout.
    pub async fn fetch_task(&self, id: &TaskId) -> Result<Task, RepoError> {
        let task = tokio::time::timeout(self.fetch_timeout, self.remote.get_by_id(id))
            .await
            .map_err(|_| RemoteError::Timeout)??;
        Ok(task)
    }

    // -- Sign-out ----------------------------------------------------------

    /// Purges the local cache. Remote data is preserved for the next
    /// sign-in.
    ///
    /// # Errors
    ///
    /// Surfaces the cache error if the transactional purge fails.
    pub async fn delete_all_tasks(&self) -> Result<usize, RepoError> {
        Ok(self.cache.delete_all().await?)
    }

    /// Applies an identity-provider transition.
    ///
    /// `Some(user)` records the sign-in and, if sync was already
    /// observing a different user, switches the subscription. `None`
    /// stops sync and purges the cache.
    pub async fn handle_auth_change(&self, user: Option<AuthUser>) {
        match user {
            Some(user) => {
                let uid = user.uid.clone();
                self.session.sign_in(user);
                if matches!(self.sync.status().await, SyncStatus::Observing(ref u) if *u != uid) {
                    self.sync.start(&uid).await;
                }
            }
            None => {
                self.session.sign_out();
                self.sync.stop().await;
                match self.cache.delete_all().await {
                    Ok(count) => tracing::info!(count, "cache purged on sign-out"),
                    Err(e) => tracing::warn!(error = %e, "cache purge on sign-out failed"),
                }
            }
        }
    }
}
