//! Change-feed events emitted by the remote task store.

use serde::{Deserialize, Serialize};

use crate::task::{Task, TaskId};

/// A single change observed on a user's remote task collection.
///
/// Each event carries a full document snapshot. On subscription the
/// remote store replays the entire current collection as `Added` events
/// before any live changes; consumers must treat that replay identically
/// to live adds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeEvent {
    /// A document appeared in the collection (live add or initial replay).
    Added(Task),
    /// An existing document was overwritten.
    Modified(Task),
    /// A document was deleted from the collection.
    Removed(Task),
}

impl ChangeEvent {
    /// Returns the task snapshot carried by this event.
    #[must_use]
    pub const fn task(&self) -> &Task {
        match self {
            Self::Added(task) | Self::Modified(task) | Self::Removed(task) => task,
        }
    }

    /// Consumes the event and returns the carried snapshot.
    #[must_use]
    pub fn into_task(self) -> Task {
        match self {
            Self::Added(task) | Self::Modified(task) | Self::Removed(task) => task,
        }
    }

    /// Returns the id of the affected task.
    #[must_use]
    pub const fn task_id(&self) -> &TaskId {
        &self.task().task_id
    }

    /// Short tag for logging.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Added(_) => "added",
            Self::Modified(_) => "modified",
            Self::Removed(_) => "removed",
        }
    }
}
