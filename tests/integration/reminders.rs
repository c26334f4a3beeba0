//! Integration tests for reminder scheduling and firing.
//!
//! Covers the at-fire-time outcome classification (success, retry,
//! terminal failure) against a real repository, and the schedule/cancel
//! flow against a recording job scheduler.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use tokio::sync::broadcast;

use tasknest::cache::memory::MemoryCache;
use tasknest::cache::{CHANGE_CHANNEL_CAPACITY, CacheChange, CacheError, TaskCache};
use tasknest::config::EngineConfig;
use tasknest::reminder::{
    JobScheduler, Notifier, NotifierUnavailable, ReminderJob, ReminderOutcome, ReminderScheduler,
    ScheduleError, fire_time, run_reminder,
};
use tasknest::remote::memory::MemoryRemoteStore;
use tasknest::repository::TaskRepository;
use tasknest_proto::task::{ClockTime, Priority, Task, TaskColor, TaskId};

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------

/// Notifier that records presentations and can be switched off.
#[derive(Default)]
struct RecordingNotifier {
    presented: Mutex<Vec<(String, String, String)>>,
    unavailable: AtomicBool,
}

impl Notifier for RecordingNotifier {
    fn present(
        &self,
        task_id: &TaskId,
        title: &str,
        body: &str,
    ) -> Result<(), NotifierUnavailable> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(NotifierUnavailable);
        }
        self.presented.lock().push((
            task_id.as_str().to_string(),
            title.to_string(),
            body.to_string(),
        ));
        Ok(())
    }
}

/// Job scheduler that records registrations and cancellations.
#[derive(Default)]
struct RecordingScheduler {
    scheduled: Mutex<Vec<ReminderJob>>,
    cancelled: Mutex<Vec<String>>,
}

impl JobScheduler for RecordingScheduler {
    fn schedule(&self, job: ReminderJob) -> Result<(), ScheduleError> {
        self.scheduled.lock().push(job);
        Ok(())
    }

    fn cancel(&self, job_id: &str) {
        self.cancelled.lock().push(job_id.to_string());
    }
}

/// Cache whose reads always fail, for the transient-error path.
struct FailingCache {
    changes: broadcast::Sender<CacheChange>,
}

impl FailingCache {
    fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self { changes }
    }
}

impl TaskCache for FailingCache {
    async fn upsert(&self, _task: &Task) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("disk detached".to_string()))
    }

    async fn upsert_all(&self, _tasks: &[Task]) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("disk detached".to_string()))
    }

    async fn delete(&self, _id: &TaskId) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("disk detached".to_string()))
    }

    async fn delete_all(&self) -> Result<usize, CacheError> {
        Err(CacheError::Unavailable("disk detached".to_string()))
    }

    async fn get_all(&self) -> Result<Vec<Task>, CacheError> {
        Err(CacheError::ReadFailed("disk detached".to_string()))
    }

    async fn get_by_id(&self, _id: &TaskId) -> Result<Option<Task>, CacheError> {
        Err(CacheError::ReadFailed("disk detached".to_string()))
    }

    async fn get_by_date_range(
        &self,
        _start_ms: i64,
        _end_ms: i64,
    ) -> Result<Vec<Task>, CacheError> {
        Err(CacheError::ReadFailed("disk detached".to_string()))
    }

    fn changes(&self) -> broadcast::Receiver<CacheChange> {
        self.changes.subscribe()
    }
}

// ---------------------------------------------------------------------------
// Helper functions
// ---------------------------------------------------------------------------

fn make_task(id: &str, notification_enabled: bool) -> Task {
    Task {
        task_id: TaskId::from_string(id),
        user_id: "u-1".to_string(),
        title: "Team stand-up".to_string(),
        description: "Room 3".to_string(),
        time_start: ClockTime::new(9, 30).unwrap(),
        time_end: ClockTime::new(9, 45).unwrap(),
        date_start: Utc.with_ymd_and_hms(2026, 4, 2, 0, 0, 0).unwrap(),
        task_color: TaskColor::parse("#99AABB").unwrap(),
        priority: Priority::High,
        completed: false,
        notification_enabled,
        created_at: 0,
    }
}

fn make_repo_with_cache<C: TaskCache + 'static>(
    cache: Arc<C>,
) -> TaskRepository<C, MemoryRemoteStore> {
    TaskRepository::new(
        cache,
        Arc::new(MemoryRemoteStore::new()),
        &EngineConfig::default(),
    )
}

// ---------------------------------------------------------------------------
// Fire-time outcomes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn firing_a_cached_task_presents_the_notification() {
    let cache = Arc::new(MemoryCache::new());
    let task = make_task("rem-1", true);
    cache.upsert(&task).await.unwrap();
    let repo = make_repo_with_cache(Arc::clone(&cache));
    let notifier = RecordingNotifier::default();

    let outcome = run_reminder(&repo, &notifier, &task.task_id).await;
    assert_eq!(outcome, ReminderOutcome::Success);

    let presented = notifier.presented.lock();
    assert_eq!(presented.len(), 1);
    assert_eq!(
        presented[0],
        (
            "rem-1".to_string(),
            "Team stand-up".to_string(),
            "Room 3".to_string()
        )
    );
}

#[tokio::test]
async fn firing_a_deleted_task_is_a_terminal_failure() {
    let cache = Arc::new(MemoryCache::new());
    let repo = make_repo_with_cache(cache);
    let notifier = RecordingNotifier::default();

    let outcome = run_reminder(&repo, &notifier, &TaskId::from_string("gone")).await;
    assert_eq!(outcome, ReminderOutcome::Failure);
    assert!(notifier.presented.lock().is_empty());
}

#[tokio::test]
async fn unavailable_notifier_still_counts_as_success() {
    let cache = Arc::new(MemoryCache::new());
    let task = make_task("rem-2", true);
    cache.upsert(&task).await.unwrap();
    let repo = make_repo_with_cache(Arc::clone(&cache));

    let notifier = RecordingNotifier::default();
    notifier.unavailable.store(true, Ordering::SeqCst);

    // Locating the task succeeded; presentation is best-effort.
    let outcome = run_reminder(&repo, &notifier, &task.task_id).await;
    assert_eq!(outcome, ReminderOutcome::Success);
    assert!(notifier.presented.lock().is_empty());
}

#[tokio::test]
async fn notifications_disabled_skips_presentation_but_succeeds() {
    let cache = Arc::new(MemoryCache::new());
    let task = make_task("rem-3", false);
    cache.upsert(&task).await.unwrap();
    let repo = make_repo_with_cache(Arc::clone(&cache));
    let notifier = RecordingNotifier::default();

    let outcome = run_reminder(&repo, &notifier, &task.task_id).await;
    assert_eq!(outcome, ReminderOutcome::Success);
    assert!(notifier.presented.lock().is_empty());
}

#[tokio::test]
async fn transient_cache_failure_requests_a_retry() {
    let repo = make_repo_with_cache(Arc::new(FailingCache::new()));
    let notifier = RecordingNotifier::default();

    let outcome = run_reminder(&repo, &notifier, &TaskId::from_string("rem-4")).await;
    assert_eq!(outcome, ReminderOutcome::Retry);
    assert!(notifier.presented.lock().is_empty());
}

// ---------------------------------------------------------------------------
// Scheduling flow
// ---------------------------------------------------------------------------

#[tokio::test]
async fn scheduled_job_carries_the_combined_fire_instant() {
    let scheduler = ReminderScheduler::new(RecordingScheduler::default());
    let task = make_task("rem-5", true);
    let now = Utc
        .with_ymd_and_hms(2026, 4, 1, 12, 0, 0)
        .unwrap()
        .timestamp_millis();

    assert!(scheduler.schedule_for(&task, now).unwrap());

    let expected = Utc.with_ymd_and_hms(2026, 4, 2, 9, 30, 0).unwrap();
    assert_eq!(fire_time(&task), expected);
}

#[tokio::test]
async fn schedule_then_fire_then_cancel_round_trip() {
    let jobs = RecordingScheduler::default();
    let scheduler = ReminderScheduler::new(jobs);

    let cache = Arc::new(MemoryCache::new());
    let task = make_task("rem-6", true);
    cache.upsert(&task).await.unwrap();
    let repo = make_repo_with_cache(Arc::clone(&cache));
    let notifier = RecordingNotifier::default();

    let now = Utc
        .with_ymd_and_hms(2026, 4, 1, 12, 0, 0)
        .unwrap()
        .timestamp_millis();
    assert!(scheduler.schedule_for(&task, now).unwrap());

    // Simulate the platform invoking the job with its payload.
    let job = scheduler.jobs().scheduled.lock()[0].clone();
    assert_eq!(job.job_id, "rem-6");
    let outcome = run_reminder(&repo, &notifier, &job.task_id).await;
    assert_eq!(outcome, ReminderOutcome::Success);

    // Deleting the task cancels by the same key.
    scheduler.cancel_for(&task.task_id);
    assert_eq!(*scheduler.jobs().cancelled.lock(), vec!["rem-6".to_string()]);
}
