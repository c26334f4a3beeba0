//! In-memory implementation of [`TaskCache`].
//!
//! Stores tasks in a `HashMap` keyed by task id. Not persistent — all
//! data is lost when the process exits. Used by tests and as a warm
//! first-tier cache; durable storage is [`super::sqlite::SqliteCache`].

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::broadcast;

use tasknest_proto::task::{Task, TaskId};

use super::{CHANGE_CHANNEL_CAPACITY, CacheChange, CacheError, TaskCache, sort_all, sort_day};

/// In-memory task cache.
pub struct MemoryCache {
    tasks: Mutex<HashMap<String, Task>>,
    changes: broadcast::Sender<CacheChange>,
}

impl MemoryCache {
    /// Creates a new, empty in-memory cache.
    #[must_use]
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            tasks: Mutex::new(HashMap::new()),
            changes,
        }
    }

    /// Number of records currently cached.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Whether the cache holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.lock().is_empty()
    }

    fn announce(&self, change: CacheChange) {
        // No receivers is fine; watchers subscribe lazily.
        let _ = self.changes.send(change);
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskCache for MemoryCache {
    async fn upsert(&self, task: &Task) -> Result<(), CacheError> {
        self.tasks
            .lock()
            .insert(task.task_id.as_str().to_string(), task.clone());
        self.announce(CacheChange::Upserted(task.task_id.clone()));
        Ok(())
    }

    async fn upsert_all(&self, tasks: &[Task]) -> Result<(), CacheError> {
        {
            let mut map = self.tasks.lock();
            for task in tasks {
                map.insert(task.task_id.as_str().to_string(), task.clone());
            }
        }
        self.announce(CacheChange::UpsertedBatch(tasks.len()));
        Ok(())
    }

    async fn delete(&self, id: &TaskId) -> Result<(), CacheError> {
        let removed = self.tasks.lock().remove(id.as_str()).is_some();
        if removed {
            self.announce(CacheChange::Deleted(id.clone()));
        }
        Ok(())
    }

    async fn delete_all(&self) -> Result<usize, CacheError> {
        let count = {
            let mut map = self.tasks.lock();
            let count = map.len();
            map.clear();
            count
        };
        self.announce(CacheChange::Cleared);
        Ok(count)
    }

    async fn get_all(&self) -> Result<Vec<Task>, CacheError> {
        let mut tasks: Vec<Task> = self.tasks.lock().values().cloned().collect();
        sort_all(&mut tasks);
        Ok(tasks)
    }

    async fn get_by_id(&self, id: &TaskId) -> Result<Option<Task>, CacheError> {
        Ok(self.tasks.lock().get(id.as_str()).cloned())
    }

    async fn get_by_date_range(&self, start_ms: i64, end_ms: i64) -> Result<Vec<Task>, CacheError> {
        let mut tasks: Vec<Task> = self
            .tasks
            .lock()
            .values()
            .filter(|t| {
                let ms = t.date_start_millis();
                ms >= start_ms && ms < end_ms
            })
            .cloned()
            .collect();
        sort_day(&mut tasks);
        Ok(tasks)
    }

    fn changes(&self) -> broadcast::Receiver<CacheChange> {
        self.changes.subscribe()
    }
}
