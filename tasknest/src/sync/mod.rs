//! Remote-to-cache synchronization engine.
//!
//! Owns the lifecycle of "observe the remote change feed, reconcile into
//! the local cache". At most one subscription is active per signed-in
//! user; events are applied strictly in feed order, which preserves the
//! per-task ordering the remote store emitted.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;

use tasknest_proto::event::ChangeEvent;

use crate::cache::TaskCache;
use crate::config::EngineConfig;
use crate::remote::{ChangeFeed, RemoteTaskStore};

/// Observable engine state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStatus {
    /// No subscription is open.
    Idle,
    /// A change feed is open for the given user.
    Observing(String),
}

/// The currently open subscription.
struct Active {
    user_id: String,
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Drives remote change events into the local cache.
///
/// State machine `Idle ⇄ Observing`; transitions via
/// [`start`](Self::start) and [`stop`](Self::stop), both safe to call in
/// any state.
pub struct SyncEngine<C, R> {
    cache: Arc<C>,
    remote: Arc<R>,
    active: Mutex<Option<Active>>,
    apply_retry_limit: u32,
    apply_retry_delay: Duration,
}

impl<C, R> SyncEngine<C, R>
where
    C: TaskCache + 'static,
    R: RemoteTaskStore + 'static,
{
    /// Creates an idle engine over the given cache and remote store.
    pub fn new(cache: Arc<C>, remote: Arc<R>, config: &EngineConfig) -> Self {
        Self {
            cache,
            remote,
            active: Mutex::new(None),
            apply_retry_limit: config.apply_retry_limit,
            apply_retry_delay: config.apply_retry_delay,
        }
    }

    /// Opens the change feed for `user_id` and starts applying events.
    ///
    /// No-op when already observing the same user. When observing a
    /// different user, the old subscription is fully stopped before the
    /// new one is opened.
    pub async fn start(&self, user_id: &str) {
        let mut active = self.active.lock().await;

        if let Some(current) = active.as_ref() {
            if current.user_id == user_id {
                tracing::debug!(user_id, "sync already observing this user");
                return;
            }
            if let Some(old) = active.take() {
                tracing::info!(
                    old_user = %old.user_id,
                    new_user = user_id,
                    "switching sync subscription"
                );
                shutdown(old).await;
            }
        }

        let feed = self.remote.observe_changes_for_user(user_id);
        let (stop_tx, stop_rx) = watch::channel(false);
        let cache = Arc::clone(&self.cache);
        let limit = self.apply_retry_limit;
        let delay = self.apply_retry_delay;
        let handle = tokio::spawn(apply_loop(cache, feed, stop_rx, limit, delay));

        *active = Some(Active {
            user_id: user_id.to_string(),
            stop_tx,
            handle,
        });
        tracing::info!(user_id, "sync started");
    }

    /// Cancels the subscription and waits for the apply loop to exit.
    ///
    /// When this returns, no further cache writes can originate from the
    /// cancelled subscription. Idempotent no-op when already idle.
    pub async fn stop(&self) {
        let taken = self.active.lock().await.take();
        if let Some(active) = taken {
            let user_id = active.user_id.clone();
            shutdown(active).await;
            tracing::info!(user_id, "sync stopped");
        }
    }

    /// Current engine state.
    pub async fn status(&self) -> SyncStatus {
        self.active
            .lock()
            .await
            .as_ref()
            .map_or(SyncStatus::Idle, |a| {
                SyncStatus::Observing(a.user_id.clone())
            })
    }
}

/// Signals the apply loop to stop and waits for it to finish.
async fn shutdown(active: Active) {
    let _ = active.stop_tx.send(true);
    let _ = active.handle.await;
}

/// Consumes the change feed until stopped, applying each event to the
/// cache before looking at the next one.
async fn apply_loop<C: TaskCache>(
    cache: Arc<C>,
    mut feed: ChangeFeed,
    mut stop_rx: watch::Receiver<bool>,
    retry_limit: u32,
    retry_delay: Duration,
) {
    loop {
        tokio::select! {
            _ = stop_rx.changed() => break,
            item = feed.recv() => match item {
                None => {
                    tracing::info!("change feed ended");
                    break;
                }
                Some(Ok(event)) => apply_event(cache.as_ref(), &event, retry_limit, retry_delay).await,
                Some(Err(e)) => {
                    // A feed error is not fatal to the subscription.
                    tracing::warn!(error = %e, "change feed error, continuing to observe");
                }
            }
        }
    }
    feed.cancel().await;
}

/// Applies one event, retrying a failed cache write a bounded number of
/// times before dropping it. Retrying in place (instead of queuing)
/// keeps per-task ordering intact.
async fn apply_event<C: TaskCache>(
    cache: &C,
    event: &ChangeEvent,
    retry_limit: u32,
    retry_delay: Duration,
) {
    for attempt in 0..=retry_limit {
        let result = match event {
            ChangeEvent::Added(task) | ChangeEvent::Modified(task) => cache.upsert(task).await,
            ChangeEvent::Removed(task) => cache.delete(&task.task_id).await,
        };
        match result {
            Ok(()) => {
                tracing::debug!(
                    kind = event.kind(),
                    task_id = %event.task_id(),
                    "applied change event"
                );
                return;
            }
            Err(e) => {
                tracing::warn!(
                    attempt,
                    retry_limit,
                    kind = event.kind(),
                    task_id = %event.task_id(),
                    error = %e,
                    "cache write failed"
                );
                if attempt < retry_limit {
                    tokio::time::sleep(retry_delay).await;
                }
            }
        }
    }
    tracing::warn!(
        kind = event.kind(),
        task_id = %event.task_id(),
        "dropping change event after exhausting cache-write retries"
    );
}
