//! Cache-record projection of [`Task`] and its postcard codec.
//!
//! [`CacheRecord`] is the local cache's on-disk shape: calendar instants
//! as epoch milliseconds and clock times as packed minutes, so the
//! storage layer can index and range-scan without touching chrono. The
//! mapping to [`Task`] is lossless in both directions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::task::{Priority, Task, TaskColor, TaskId, TimeParseError};

/// Error type for cache-record encode/decode and conversion.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    /// Serialization or deserialization failed.
    #[error("record serialization error: {0}")]
    Serialization(String),
    /// A stored packed time is outside the valid range.
    #[error("record carries an invalid packed time: {0}")]
    InvalidTime(#[from] TimeParseError),
    /// A stored timestamp is outside chrono's representable range.
    #[error("record carries an out-of-range timestamp: {0}")]
    InvalidTimestamp(i64),
}

/// Store-native projection of a [`Task`], one-to-one by `task_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheRecord {
    /// Remote-assigned task id.
    pub task_id: String,
    /// Owning user's uid.
    pub user_id: String,
    /// Task title.
    pub title: String,
    /// Task description.
    pub description: String,
    /// Start time as minutes since midnight.
    pub time_start: u16,
    /// End time as minutes since midnight.
    pub time_end: u16,
    /// Scheduled instant as epoch milliseconds.
    pub date_start: i64,
    /// Raw color string.
    pub color: String,
    /// Raw priority string.
    pub priority: String,
    /// Completion flag.
    pub completed: bool,
    /// Reminder flag.
    pub notification_enabled: bool,
    /// Creation instant as epoch milliseconds.
    pub created_at: i64,
}

impl CacheRecord {
    /// Projects a task into its store-native shape.
    #[must_use]
    pub fn from_task(task: &Task) -> Self {
        Self {
            task_id: task.task_id.as_str().to_string(),
            user_id: task.user_id.clone(),
            title: task.title.clone(),
            description: task.description.clone(),
            time_start: task.time_start.packed_minutes(),
            time_end: task.time_end.packed_minutes(),
            date_start: task.date_start.timestamp_millis(),
            color: task.task_color.as_str().to_string(),
            priority: task.priority.as_str().to_string(),
            completed: task.completed,
            notification_enabled: task.notification_enabled,
            created_at: task.created_at,
        }
    }

    /// Reconstructs the wire-native task from this record.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError`] if a packed time or timestamp stored in
    /// the record is out of range (corrupt row).
    pub fn into_task(self) -> Result<Task, RecordError> {
        let date_start: DateTime<Utc> = DateTime::from_timestamp_millis(self.date_start)
            .ok_or(RecordError::InvalidTimestamp(self.date_start))?;
        Ok(Task {
            task_id: TaskId::from_string(self.task_id),
            user_id: self.user_id,
            title: self.title,
            description: self.description,
            time_start: crate::task::ClockTime::from_packed_minutes(self.time_start)?,
            time_end: crate::task::ClockTime::from_packed_minutes(self.time_end)?,
            date_start,
            task_color: TaskColor::from_remote(self.color),
            priority: Priority::parse(&self.priority).unwrap_or_else(Priority::Other),
            completed: self.completed,
            notification_enabled: self.notification_enabled,
            created_at: self.created_at,
        })
    }
}

/// Encodes a [`CacheRecord`] into bytes using postcard.
///
/// # Errors
///
/// Returns `RecordError::Serialization` if the record cannot be serialized.
pub fn encode(record: &CacheRecord) -> Result<Vec<u8>, RecordError> {
    postcard::to_allocvec(record).map_err(|e| RecordError::Serialization(e.to_string()))
}

/// Decodes a [`CacheRecord`] from bytes using postcard.
///
/// # Errors
///
/// Returns `RecordError::Serialization` if the bytes cannot be deserialized.
pub fn decode(bytes: &[u8]) -> Result<CacheRecord, RecordError> {
    postcard::from_bytes(bytes).map_err(|e| RecordError::Serialization(e.to_string()))
}
