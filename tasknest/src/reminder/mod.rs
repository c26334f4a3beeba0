//! Reminder scheduling and firing.
//!
//! The engine computes *when* and *what* to notify; the OS-level pieces
//! are collaborator traits. [`JobScheduler`] accepts one-shot background
//! jobs keyed by task id with at-least-once semantics near the requested
//! time, and [`Notifier`] presents a notification or reports that it
//! cannot (e.g. permission denied).
//!
//! At fire time [`run_reminder`] re-reads the task through the
//! repository and classifies the outcome so the job scheduler retries
//! transient failures but never retries a deleted task forever.

use chrono::{DateTime, NaiveTime, Utc};

use tasknest_proto::task::{Task, TaskId};

use crate::cache::TaskCache;
use crate::remote::RemoteTaskStore;
use crate::repository::TaskRepository;

/// A one-shot background job request.
///
/// The job id equals the task id, so rescheduling a task replaces its
/// pending job and deleting a task can cancel by id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderJob {
    /// Scheduler job key (the task id).
    pub job_id: String,
    /// When to fire, in epoch milliseconds.
    pub fire_at_ms: i64,
    /// Job payload: which task to look up at fire time.
    pub task_id: TaskId,
}

/// The job scheduler refused the request.
#[derive(Debug, thiserror::Error)]
#[error("job scheduler rejected the job: {0}")]
pub struct ScheduleError(pub String);

/// External one-shot background job scheduler.
pub trait JobScheduler: Send + Sync {
    /// Registers (or replaces) a job. Guaranteed at-least-once
    /// invocation near the requested time.
    ///
    /// # Errors
    ///
    /// Returns [`ScheduleError`] when the platform scheduler refuses
    /// the registration.
    fn schedule(&self, job: ReminderJob) -> Result<(), ScheduleError>;

    /// Cancels a pending job by its key. Unknown keys are ignored.
    fn cancel(&self, job_id: &str);
}

/// The notifier cannot present anything right now (e.g. notification
/// permission denied).
#[derive(Debug, thiserror::Error)]
#[error("notifier unavailable")]
pub struct NotifierUnavailable;

/// External notification presenter.
pub trait Notifier: Send + Sync {
    /// Presents a notification for a task.
    ///
    /// # Errors
    ///
    /// Returns [`NotifierUnavailable`] when presentation is impossible;
    /// callers treat this as a successful no-op.
    fn present(&self, task_id: &TaskId, title: &str, body: &str)
    -> Result<(), NotifierUnavailable>;
}

/// Classified result of a fired reminder, mapped by the caller onto the
/// job scheduler's retry/permanent-failure outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderOutcome {
    /// The work succeeded (including "found but nothing to present").
    Success,
    /// Transient failure; the scheduler should retry.
    Retry,
    /// Permanent failure; the task no longer exists.
    Failure,
}

/// The instant a task's reminder should fire: `date_start`'s calendar
/// date combined with `time_start`'s wall-clock time.
#[must_use]
pub fn fire_time(task: &Task) -> DateTime<Utc> {
    let time = NaiveTime::from_hms_opt(
        u32::from(task.time_start.hour()),
        u32::from(task.time_start.minute()),
        0,
    )
    .unwrap_or(NaiveTime::MIN);
    task.date_start.date_naive().and_time(time).and_utc()
}

/// The fire-time body of a reminder job.
///
/// Re-reads the task by id through the repository's cache view:
/// - absent → [`ReminderOutcome::Failure`] (the task was deleted;
///   retrying forever would be pointless);
/// - found with notifications disabled → `Success` without presenting;
/// - found but the notifier is unavailable → `Success` (locating the
///   task succeeded; presentation is best-effort);
/// - transient read failure → [`ReminderOutcome::Retry`].
pub async fn run_reminder<C, R, N>(
    repo: &TaskRepository<C, R>,
    notifier: &N,
    task_id: &TaskId,
) -> ReminderOutcome
where
    C: TaskCache + 'static,
    R: RemoteTaskStore + 'static,
    N: Notifier,
{
    match repo.get_task_once(task_id).await {
        Ok(Some(task)) => {
            if !task.notification_enabled {
                tracing::debug!(task_id = %task_id, "notifications disabled, skipping");
                return ReminderOutcome::Success;
            }
            match notifier.present(task_id, &task.title, &task.description) {
                Ok(()) => ReminderOutcome::Success,
                Err(NotifierUnavailable) => {
                    tracing::warn!(task_id = %task_id, "notifier unavailable, reminder dropped");
                    ReminderOutcome::Success
                }
            }
        }
        Ok(None) => {
            tracing::info!(task_id = %task_id, "task gone at fire time");
            ReminderOutcome::Failure
        }
        Err(e) => {
            tracing::warn!(task_id = %task_id, error = %e, "reminder lookup failed, will retry");
            ReminderOutcome::Retry
        }
    }
}

/// Registers and cancels reminder jobs for tasks.
pub struct ReminderScheduler<J> {
    jobs: J,
}

impl<J: JobScheduler> ReminderScheduler<J> {
    /// Wraps the platform job scheduler.
    pub const fn new(jobs: J) -> Self {
        Self { jobs }
    }

    /// Returns the underlying platform scheduler.
    pub const fn jobs(&self) -> &J {
        &self.jobs
    }

    /// Schedules a reminder for a task, if one is warranted.
    ///
    /// Skipped (returning `Ok(false)`) when notifications are disabled,
    /// the task has never been persisted, or the fire time is already in
    /// the past.
    ///
    /// # Errors
    ///
    /// Propagates [`ScheduleError`] from the platform scheduler.
    pub fn schedule_for(&self, task: &Task, now_ms: i64) -> Result<bool, ScheduleError> {
        if !task.notification_enabled || !task.task_id.is_assigned() {
            return Ok(false);
        }
        let fire_at_ms = fire_time(task).timestamp_millis();
        if fire_at_ms <= now_ms {
            return Ok(false);
        }
        self.jobs.schedule(ReminderJob {
            job_id: task.task_id.as_str().to_string(),
            fire_at_ms,
            task_id: task.task_id.clone(),
        })?;
        tracing::debug!(task_id = %task.task_id, fire_at_ms, "reminder scheduled");
        Ok(true)
    }

    /// Cancels the pending reminder for a task, if any.
    pub fn cancel_for(&self, id: &TaskId) {
        self.jobs.cancel(id.as_str());
    }
}
