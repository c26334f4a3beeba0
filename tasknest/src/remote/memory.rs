//! In-process remote store for testing.
//!
//! Simulates the remote document database: per-user collections of JSON
//! documents keyed by task id, change feeds with initial full-state
//! replay, and remote-side id assignment. Fault-injection switches let
//! tests exercise the outage and permission-denied paths, and
//! subscription counters let tests assert on listener lifecycle.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use chrono::NaiveDate;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};

use tasknest_proto::doc;
use tasknest_proto::event::ChangeEvent;
use tasknest_proto::task::{Task, TaskId};

use super::{ChangeFeed, DayFeed, RemoteError, RemoteTaskStore, day_bounds};
use crate::cache::{sort_all, sort_day};

/// Capacity of each feed's hand-off channel.
const FEED_CHANNEL_CAPACITY: usize = 64;

/// Capacity of the internal event fan-out.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Per-user collections of JSON documents keyed by task id.
type Collections = HashMap<String, BTreeMap<String, Value>>;

/// In-process document store implementing [`RemoteTaskStore`].
pub struct MemoryRemoteStore {
    collections: Mutex<Collections>,
    events: broadcast::Sender<(String, Result<ChangeEvent, RemoteError>)>,
    unavailable: AtomicBool,
    permission_denied: AtomicBool,
    subscriptions_opened: AtomicUsize,
    active_feeds: Arc<AtomicUsize>,
}

/// Decrements the active-feed counter when a feed task ends, however it
/// ends (graceful exit or abort).
struct FeedGuard(Arc<AtomicUsize>);

impl FeedGuard {
    fn register(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for FeedGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MemoryRemoteStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            collections: Mutex::new(HashMap::new()),
            events,
            unavailable: AtomicBool::new(false),
            permission_denied: AtomicBool::new(false),
            subscriptions_opened: AtomicUsize::new(0),
            active_feeds: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Simulates a backend outage: every operation fails retryably.
    pub fn set_unavailable(&self, down: bool) {
        self.unavailable.store(down, Ordering::SeqCst);
    }

    /// Simulates security-rule rejection: every operation fails terminally.
    pub fn set_permission_denied(&self, denied: bool) {
        self.permission_denied.store(denied, Ordering::SeqCst);
    }

    /// Pushes a synthetic error item into a user's live change feed.
    pub fn inject_feed_error(&self, user_id: &str, error: RemoteError) {
        let _ = self.events.send((user_id.to_string(), Err(error)));
    }

    /// Pushes a raw change event into a user's live feed without going
    /// through the write path. Lets tests replay duplicate or
    /// out-of-band event sequences.
    pub fn inject_event(&self, user_id: &str, event: ChangeEvent) {
        self.emit(user_id, event);
    }

    /// Total change-feed subscriptions ever opened.
    #[must_use]
    pub fn subscriptions_opened(&self) -> usize {
        self.subscriptions_opened.load(Ordering::SeqCst)
    }

    /// Change-feed subscriptions currently registered.
    #[must_use]
    pub fn active_feeds(&self) -> usize {
        self.active_feeds.load(Ordering::SeqCst)
    }

    /// Number of documents stored for a user (test assertions).
    #[must_use]
    pub fn document_count(&self, user_id: &str) -> usize {
        self.collections
            .lock()
            .get(user_id)
            .map_or(0, BTreeMap::len)
    }

    fn check(&self) -> Result<(), RemoteError> {
        if self.permission_denied.load(Ordering::SeqCst) {
            return Err(RemoteError::PermissionDenied(
                "rejected by security rules".to_string(),
            ));
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RemoteError::Unavailable("backend offline".to_string()));
        }
        Ok(())
    }

    fn emit(&self, user_id: &str, event: ChangeEvent) {
        let _ = self.events.send((user_id.to_string(), Ok(event)));
    }

    /// Snapshot of one user's collection as tasks, ordered like
    /// `get_all_once`. Malformed documents are skipped with a warning.
    fn snapshot(collections: &Collections, user_id: &str) -> Vec<Task> {
        let mut tasks: Vec<Task> = collections
            .get(user_id)
            .into_iter()
            .flat_map(BTreeMap::values)
            .filter_map(|value| match doc::from_document(value.clone()) {
                Ok(task) => Some(task),
                Err(e) => {
                    tracing::warn!(user_id, error = %e, "skipping malformed stored document");
                    None
                }
            })
            .collect();
        sort_all(&mut tasks);
        tasks
    }

    /// One user's tasks inside a day window, ordered by `time_start`.
    fn day_snapshot(collections: &Collections, user_id: &str, date: NaiveDate) -> Vec<Task> {
        let (start_ms, end_ms) = day_bounds(date);
        let mut tasks: Vec<Task> = Self::snapshot(collections, user_id)
            .into_iter()
            .filter(|t| {
                let ms = t.date_start_millis();
                ms >= start_ms && ms < end_ms
            })
            .collect();
        sort_day(&mut tasks);
        tasks
    }
}

impl Default for MemoryRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteTaskStore for MemoryRemoteStore {
    async fn add_task(&self, task: &Task) -> Result<TaskId, RemoteError> {
        self.check()?;
        if task.user_id.is_empty() {
            return Err(RemoteError::PermissionDenied(
                "document has no owning user".to_string(),
            ));
        }

        let assigned = TaskId::generate();
        let stored = {
            let mut collections = self.collections.lock();
            let collection = collections.entry(task.user_id.clone()).or_default();

            // Write the document, then patch the stored copy so the
            // assigned id is discoverable from the document itself.
            let mut document = doc::to_document(task);
            collection.insert(assigned.as_str().to_string(), document.clone());
            doc::patch_id(&mut document, &assigned);
            collection.insert(assigned.as_str().to_string(), document.clone());

            doc::from_document(document).map_err(|e| RemoteError::InvalidDocument(e.to_string()))?
        };

        self.emit(&task.user_id, ChangeEvent::Added(stored));
        Ok(assigned)
    }

    async fn update_task(&self, task: &Task) -> Result<(), RemoteError> {
        self.check()?;
        {
            let mut collections = self.collections.lock();
            let collection = collections
                .get_mut(&task.user_id)
                .ok_or(RemoteError::NotFound)?;
            if !collection.contains_key(task.task_id.as_str()) {
                return Err(RemoteError::NotFound);
            }
            // Last-writer-wins full-document overwrite.
            collection.insert(task.task_id.as_str().to_string(), doc::to_document(task));
        }
        self.emit(&task.user_id, ChangeEvent::Modified(task.clone()));
        Ok(())
    }

    async fn get_all_once(&self, user_id: &str) -> Result<Vec<Task>, RemoteError> {
        self.check()?;
        let collections = self.collections.lock();
        Ok(Self::snapshot(&collections, user_id))
    }

    async fn get_by_id(&self, id: &TaskId) -> Result<Task, RemoteError> {
        self.check()?;
        let collections = self.collections.lock();
        for collection in collections.values() {
            if let Some(document) = collection.get(id.as_str()) {
                return doc::from_document(document.clone())
                    .map_err(|e| RemoteError::InvalidDocument(e.to_string()));
            }
        }
        Err(RemoteError::NotFound)
    }

    async fn delete_task(&self, id: &TaskId) -> Result<(), RemoteError> {
        self.check()?;
        let removed = {
            let mut collections = self.collections.lock();
            let mut removed = None;
            for (user_id, collection) in collections.iter_mut() {
                if let Some(document) = collection.remove(id.as_str()) {
                    removed = Some((user_id.clone(), document));
                    break;
                }
            }
            removed
        };

        if let Some((user_id, document)) = removed {
            match doc::from_document(document) {
                Ok(task) => self.emit(&user_id, ChangeEvent::Removed(task)),
                Err(e) => {
                    tracing::warn!(task_id = %id, error = %e, "deleted document was malformed");
                }
            }
        }
        Ok(())
    }

    fn observe_changes_for_user(&self, user_id: &str) -> ChangeFeed {
        self.subscriptions_opened.fetch_add(1, Ordering::SeqCst);
        let guard = FeedGuard::register(&self.active_feeds);
        let uid = user_id.to_string();

        // Snapshot and subscribe under one lock so no event between the
        // replay and the live tail is missed or duplicated.
        let (replay, mut events) = {
            let collections = self.collections.lock();
            (Self::snapshot(&collections, user_id), self.events.subscribe())
        };

        let (tx, rx) = mpsc::channel(FEED_CHANNEL_CAPACITY);
        let handle = tokio::spawn(async move {
            let _guard = guard;

            // Initial replay of the full current state as Added events.
            for task in replay {
                if tx.send(Ok(ChangeEvent::Added(task))).await.is_err() {
                    return;
                }
            }

            // Live tail.
            loop {
                match events.recv().await {
                    Ok((user, item)) if user == uid => {
                        if tx.send(item).await.is_err() {
                            return;
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "change feed lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => return,
                }
            }
        });

        ChangeFeed::from_parts(rx, handle)
    }

    fn observe_for_date(&self, user_id: &str, date: NaiveDate) -> DayFeed {
        let guard = FeedGuard::register(&self.active_feeds);
        let uid = user_id.to_string();

        let (initial, mut events) = {
            let collections = self.collections.lock();
            (
                Self::day_snapshot(&collections, user_id, date),
                self.events.subscribe(),
            )
        };

        let (tx, rx) = mpsc::channel(FEED_CHANNEL_CAPACITY);

        // The day feed maintains its window from event snapshots rather
        // than re-reading the store, so it never touches the collections
        // lock from the spawned task.
        let handle = tokio::spawn(async move {
            let _guard = guard;
            let mut day: BTreeMap<String, Task> = initial
                .into_iter()
                .map(|t| (t.task_id.as_str().to_string(), t))
                .collect();
            let (start_ms, end_ms) = day_bounds(date);

            let emit_snapshot = |day: &BTreeMap<String, Task>| {
                let mut tasks: Vec<Task> = day.values().cloned().collect();
                sort_day(&mut tasks);
                tasks
            };

            if tx.send(Ok(emit_snapshot(&day))).await.is_err() {
                return;
            }

            loop {
                match events.recv().await {
                    Ok((user, Ok(event))) if user == uid => {
                        let task = event.task();
                        let in_window = {
                            let ms = task.date_start_millis();
                            ms >= start_ms && ms < end_ms
                        };
                        let key = task.task_id.as_str().to_string();
                        let relevant = match event {
                            ChangeEvent::Added(task) | ChangeEvent::Modified(task) => {
                                if in_window {
                                    day.insert(key, task);
                                    true
                                } else {
                                    // Moved out of the window or never in it.
                                    day.remove(&key).is_some()
                                }
                            }
                            ChangeEvent::Removed(_) => day.remove(&key).is_some(),
                        };
                        if relevant && tx.send(Ok(emit_snapshot(&day))).await.is_err() {
                            return;
                        }
                    }
                    Ok((user, Err(e))) if user == uid => {
                        if tx.send(Err(e)).await.is_err() {
                            return;
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "day feed lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => return,
                }
            }
        });

        DayFeed::from_parts(rx, handle)
    }
}
