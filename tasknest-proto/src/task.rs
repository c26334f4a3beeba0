//! Core task model for `TaskNest`.
//!
//! Defines the [`Task`] record as it flows between the remote document
//! store, the local cache, and the UI layer, along with the validated
//! value types for its fields (`TaskId`, `ClockTime`, `Priority`,
//! `TaskColor`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

/// Maximum allowed task title length in characters.
pub const MAX_TITLE_LENGTH: usize = 256;

/// Maximum allowed task description length in characters.
pub const MAX_DESCRIPTION_LENGTH: usize = 4096;

/// Unique identifier for a task.
///
/// Assigned by the remote store when a task is first persisted. A task
/// that has never been persisted carries the unassigned (empty) sentinel,
/// and [`TaskId::is_assigned`] reports which side of that line an id is on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Returns the unassigned sentinel (empty id).
    #[must_use]
    pub const fn unassigned() -> Self {
        Self(String::new())
    }

    /// Generates a fresh time-ordered id (UUID v7).
    ///
    /// Only the store that owns id assignment should call this.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Wraps an existing id string.
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns `true` once the remote store has assigned a real id.
    #[must_use]
    pub fn is_assigned(&self) -> bool {
        !self.0.is_empty()
    }

    /// Returns the string representation of this id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error produced when parsing an `"HH:MM"` wall-clock string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimeParseError {
    /// The string is not in `HH:MM` form.
    #[error("invalid time format: {0:?} (expected HH:MM)")]
    Format(String),
    /// Hour or minute is outside its valid range.
    #[error("time out of range: {hour:02}:{minute:02}")]
    OutOfRange {
        /// Parsed hour component.
        hour: u8,
        /// Parsed minute component.
        minute: u8,
    },
}

/// A wall-clock time of day in 24-hour form.
///
/// Serialized as an `"HH:MM"` string on the wire; stored as packed
/// minutes-since-midnight in the cache so range queries can order by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClockTime {
    hour: u8,
    minute: u8,
}

impl ClockTime {
    /// Creates a clock time, rejecting out-of-range components.
    ///
    /// # Errors
    ///
    /// Returns [`TimeParseError::OutOfRange`] if `hour > 23` or
    /// `minute > 59`.
    pub const fn new(hour: u8, minute: u8) -> Result<Self, TimeParseError> {
        if hour > 23 || minute > 59 {
            return Err(TimeParseError::OutOfRange { hour, minute });
        }
        Ok(Self { hour, minute })
    }

    /// Midnight (`00:00`).
    #[must_use]
    pub const fn midnight() -> Self {
        Self { hour: 0, minute: 0 }
    }

    /// Returns the hour component (0-23).
    #[must_use]
    pub const fn hour(&self) -> u8 {
        self.hour
    }

    /// Returns the minute component (0-59).
    #[must_use]
    pub const fn minute(&self) -> u8 {
        self.minute
    }

    /// Packs this time as minutes since midnight (0-1439).
    #[must_use]
    pub const fn packed_minutes(&self) -> u16 {
        self.hour as u16 * 60 + self.minute as u16
    }

    /// Unpacks a minutes-since-midnight value.
    ///
    /// # Errors
    ///
    /// Returns [`TimeParseError::OutOfRange`] if `minutes >= 1440`.
    pub const fn from_packed_minutes(minutes: u16) -> Result<Self, TimeParseError> {
        if minutes >= 24 * 60 {
            return Err(TimeParseError::OutOfRange {
                hour: (minutes / 60) as u8,
                minute: (minutes % 60) as u8,
            });
        }
        Ok(Self {
            hour: (minutes / 60) as u8,
            minute: (minutes % 60) as u8,
        })
    }
}

impl std::str::FromStr for ClockTime {
    type Err = TimeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((h, m)) = s.split_once(':') else {
            return Err(TimeParseError::Format(s.to_string()));
        };
        if h.len() != 2 || m.len() != 2 {
            return Err(TimeParseError::Format(s.to_string()));
        }
        let hour: u8 = h
            .parse()
            .map_err(|_| TimeParseError::Format(s.to_string()))?;
        let minute: u8 = m
            .parse()
            .map_err(|_| TimeParseError::Format(s.to_string()))?;
        Self::new(hour, minute)
    }
}

impl std::fmt::Display for ClockTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl Serialize for ClockTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ClockTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Task priority level.
///
/// A closed set where the UI produces values, but unknown strings read
/// back from the remote store are preserved verbatim in [`Priority::Other`]
/// so data written by newer clients survives a round-trip.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Priority {
    /// Highest urgency.
    High,
    /// Default urgency.
    Medium,
    /// Lowest urgency.
    Low,
    /// A value this client does not recognize, kept as-is.
    Other(String),
}

impl Priority {
    /// Parses a priority the UI boundary is allowed to produce.
    ///
    /// # Errors
    ///
    /// Returns the rejected string when it is not one of the known levels.
    /// Use the lenient serde path for data read from the remote store.
    pub fn parse(s: &str) -> Result<Self, String> {
        match s {
            "High" => Ok(Self::High),
            "Medium" => Ok(Self::Medium),
            "Low" => Ok(Self::Low),
            other => Err(other.to_string()),
        }
    }

    /// Returns the wire string for this priority.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
            Self::Other(s) => s,
        }
    }

    /// Returns `true` when this is a value the current client recognizes.
    #[must_use]
    pub const fn is_known(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for Priority {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Priority {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::parse(&s).unwrap_or(Self::Other(s)))
    }
}

/// Error produced when validating a locally constructed color.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid task color: {0:?} (expected #RRGGBB)")]
pub struct ColorParseError(pub String);

/// Hex display color for a task (`#RRGGBB`).
///
/// [`TaskColor::parse`] validates colors the UI constructs; values read
/// from the remote store bypass validation and are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskColor(String);

impl TaskColor {
    /// Parses and validates a `#RRGGBB` color string.
    ///
    /// # Errors
    ///
    /// Returns [`ColorParseError`] if the string is not a `#` followed by
    /// exactly six hex digits.
    pub fn parse(s: &str) -> Result<Self, ColorParseError> {
        let valid = s.len() == 7
            && s.starts_with('#')
            && s[1..].chars().all(|c| c.is_ascii_hexdigit());
        if valid {
            Ok(Self(s.to_string()))
        } else {
            Err(ColorParseError(s.to_string()))
        }
    }

    /// Wraps a color string from the remote store without validation.
    pub fn from_remote(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Returns the raw color string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskColor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors that make a task unacceptable for a remote write.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Task title cannot be empty.
    #[error("task title cannot be empty")]
    TitleEmpty,
    /// Task title exceeds the maximum length.
    #[error("task title too long (max {MAX_TITLE_LENGTH} characters)")]
    TitleTooLong,
    /// Task description exceeds the maximum length.
    #[error("task description too long (max {MAX_DESCRIPTION_LENGTH} characters)")]
    DescriptionTooLong,
    /// Task is not owned by any user.
    #[error("task has no owning user")]
    UserMissing,
}

/// A task record as exchanged with the remote document store.
///
/// Field names serialize to the document schema (camelCase). `date_start`
/// travels as epoch milliseconds; the clock times travel as `"HH:MM"`.
///
/// `time_start <= time_end` is a UI-level soft invariant and is
/// deliberately not enforced here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Remote-assigned identifier; unassigned before first persistence.
    pub task_id: TaskId,
    /// Owning user's uid.
    pub user_id: String,
    /// Short human-readable title.
    pub title: String,
    /// Free-form description.
    pub description: String,
    /// Wall-clock start of the task's time slot.
    pub time_start: ClockTime,
    /// Wall-clock end of the task's time slot.
    pub time_end: ClockTime,
    /// The calendar instant the task is scheduled on.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub date_start: DateTime<Utc>,
    /// Display color.
    pub task_color: TaskColor,
    /// Priority level.
    pub priority: Priority,
    /// Whether the task has been completed.
    pub completed: bool,
    /// Whether a reminder should fire for this task.
    pub notification_enabled: bool,
    /// Creation instant in epoch milliseconds.
    pub created_at: i64,
}

impl Task {
    /// Checks the UI-boundary rules before a remote write.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] for an empty or oversized title, an
    /// oversized description, or a missing owner.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.title.is_empty() {
            return Err(ValidationError::TitleEmpty);
        }
        if self.title.chars().count() > MAX_TITLE_LENGTH {
            return Err(ValidationError::TitleTooLong);
        }
        if self.description.chars().count() > MAX_DESCRIPTION_LENGTH {
            return Err(ValidationError::DescriptionTooLong);
        }
        if self.user_id.is_empty() {
            return Err(ValidationError::UserMissing);
        }
        Ok(())
    }

    /// Returns `date_start` as epoch milliseconds.
    #[must_use]
    pub fn date_start_millis(&self) -> i64 {
        self.date_start.timestamp_millis()
    }
}
