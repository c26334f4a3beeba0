//! SQLite-backed implementation of [`TaskCache`].
//!
//! One `tasks` table keyed by `task_id`, with `date_start` and
//! `time_start` stored as indexed integer columns next to a postcard
//! record blob, so range queries scan the index without deserializing
//! every row.
//!
//! Thread-safe via an internal `Mutex<Connection>`. All writes are
//! serialized; statements are short-lived, so the guard is never held
//! across an await point.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rusqlite::{Connection, params};
use tokio::sync::broadcast;

use tasknest_proto::record::{self, CacheRecord};
use tasknest_proto::task::{Task, TaskId};

use super::{CHANGE_CHANNEL_CAPACITY, CacheChange, CacheError, TaskCache};

/// Database filename within the cache directory.
const DB_FILENAME: &str = "tasknest.db";

/// SQLite-backed task cache.
pub struct SqliteCache {
    path: Option<PathBuf>,
    conn: Mutex<Connection>,
    changes: broadcast::Sender<CacheChange>,
}

impl SqliteCache {
    /// Open (or create) the database at `{dir}/tasknest.db`.
    ///
    /// Applies the schema if the database is new.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Unavailable`] if the directory cannot be
    /// created or the database cannot be opened.
    pub fn open(dir: &Path) -> Result<Self, CacheError> {
        std::fs::create_dir_all(dir).map_err(|e| CacheError::Unavailable(e.to_string()))?;
        let db_path = dir.join(DB_FILENAME);
        let conn =
            Connection::open(&db_path).map_err(|e| CacheError::Unavailable(e.to_string()))?;
        apply_schema(&conn)?;
        Ok(Self::from_connection(conn, Some(db_path)))
    }

    /// Open a throwaway in-memory database (tests).
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Unavailable`] if SQLite refuses the
    /// in-memory connection.
    pub fn open_in_memory() -> Result<Self, CacheError> {
        let conn =
            Connection::open_in_memory().map_err(|e| CacheError::Unavailable(e.to_string()))?;
        apply_schema(&conn)?;
        Ok(Self::from_connection(conn, None))
    }

    fn from_connection(conn: Connection, path: Option<PathBuf>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            path,
            conn: Mutex::new(conn),
            changes,
        }
    }

    /// Path of the backing database file, if file-backed.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn announce(&self, change: CacheChange) {
        let _ = self.changes.send(change);
    }
}

/// Idempotent schema application.
fn apply_schema(conn: &Connection) -> Result<(), CacheError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS tasks (
            task_id    TEXT PRIMARY KEY,
            date_start INTEGER NOT NULL,
            time_start INTEGER NOT NULL,
            record     BLOB NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_tasks_date_start ON tasks(date_start);",
    )
    .map_err(|e| CacheError::Unavailable(e.to_string()))
}

/// Binds one task's row values into an `INSERT OR REPLACE`.
fn insert_row(conn: &Connection, task: &Task) -> Result<(), CacheError> {
    let rec = CacheRecord::from_task(task);
    let blob = record::encode(&rec).map_err(|e| CacheError::WriteFailed(e.to_string()))?;
    conn.execute(
        "INSERT OR REPLACE INTO tasks (task_id, date_start, time_start, record)
         VALUES (?1, ?2, ?3, ?4)",
        params![rec.task_id, rec.date_start, rec.time_start, blob],
    )
    .map_err(|e| CacheError::WriteFailed(e.to_string()))?;
    Ok(())
}

/// Decodes a record blob back into a task.
fn blob_to_task(blob: &[u8]) -> Result<Task, CacheError> {
    record::decode(blob)
        .and_then(CacheRecord::into_task)
        .map_err(|e| CacheError::ReadFailed(e.to_string()))
}

impl TaskCache for SqliteCache {
    async fn upsert(&self, task: &Task) -> Result<(), CacheError> {
        {
            let conn = self.conn.lock();
            insert_row(&conn, task)?;
        }
        self.announce(CacheChange::Upserted(task.task_id.clone()));
        Ok(())
    }

    async fn upsert_all(&self, tasks: &[Task]) -> Result<(), CacheError> {
        {
            let mut conn = self.conn.lock();
            let tx = conn
                .transaction()
                .map_err(|e| CacheError::WriteFailed(e.to_string()))?;
            for task in tasks {
                insert_row(&tx, task)?;
            }
            tx.commit()
                .map_err(|e| CacheError::WriteFailed(e.to_string()))?;
        }
        self.announce(CacheChange::UpsertedBatch(tasks.len()));
        Ok(())
    }

    async fn delete(&self, id: &TaskId) -> Result<(), CacheError> {
        let removed = {
            let conn = self.conn.lock();
            conn.execute("DELETE FROM tasks WHERE task_id = ?1", params![id.as_str()])
                .map_err(|e| CacheError::WriteFailed(e.to_string()))?
        };
        if removed > 0 {
            self.announce(CacheChange::Deleted(id.clone()));
        }
        Ok(())
    }

    async fn delete_all(&self) -> Result<usize, CacheError> {
        let count = {
            let mut conn = self.conn.lock();
            let tx = conn
                .transaction()
                .map_err(|e| CacheError::WriteFailed(e.to_string()))?;
            let count = tx
                .execute("DELETE FROM tasks", [])
                .map_err(|e| CacheError::WriteFailed(e.to_string()))?;
            tx.commit()
                .map_err(|e| CacheError::WriteFailed(e.to_string()))?;
            count
        };
        self.announce(CacheChange::Cleared);
        Ok(count)
    }

    async fn get_all(&self) -> Result<Vec<Task>, CacheError> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT record FROM tasks ORDER BY date_start DESC, task_id ASC")
            .map_err(|e| CacheError::ReadFailed(e.to_string()))?;
        let rows = stmt
            .query_map([], |row| row.get::<_, Vec<u8>>(0))
            .map_err(|e| CacheError::ReadFailed(e.to_string()))?;

        let mut tasks = Vec::new();
        for blob in rows {
            let blob = blob.map_err(|e| CacheError::ReadFailed(e.to_string()))?;
            tasks.push(blob_to_task(&blob)?);
        }
        Ok(tasks)
    }

    async fn get_by_id(&self, id: &TaskId) -> Result<Option<Task>, CacheError> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT record FROM tasks WHERE task_id = ?1")
            .map_err(|e| CacheError::ReadFailed(e.to_string()))?;
        let mut rows = stmt
            .query_map(params![id.as_str()], |row| row.get::<_, Vec<u8>>(0))
            .map_err(|e| CacheError::ReadFailed(e.to_string()))?;

        match rows.next() {
            Some(blob) => {
                let blob = blob.map_err(|e| CacheError::ReadFailed(e.to_string()))?;
                Ok(Some(blob_to_task(&blob)?))
            }
            None => Ok(None),
        }
    }

    async fn get_by_date_range(&self, start_ms: i64, end_ms: i64) -> Result<Vec<Task>, CacheError> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT record FROM tasks
                 WHERE date_start >= ?1 AND date_start < ?2
                 ORDER BY time_start ASC, task_id ASC",
            )
            .map_err(|e| CacheError::ReadFailed(e.to_string()))?;
        let rows = stmt
            .query_map(params![start_ms, end_ms], |row| row.get::<_, Vec<u8>>(0))
            .map_err(|e| CacheError::ReadFailed(e.to_string()))?;

        let mut tasks = Vec::new();
        for blob in rows {
            let blob = blob.map_err(|e| CacheError::ReadFailed(e.to_string()))?;
            tasks.push(blob_to_task(&blob)?);
        }
        Ok(tasks)
    }

    fn changes(&self) -> broadcast::Receiver<CacheChange> {
        self.changes.subscribe()
    }
}
