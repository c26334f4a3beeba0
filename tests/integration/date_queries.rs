//! Integration tests for date-scoped queries and live day views.
//!
//! Covers the half-open day window on the durable cache, and the
//! repository's switch-latest date observation.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, TimeZone, Utc};
use tokio::sync::watch;

use tasknest::cache::TaskCache;
use tasknest::cache::memory::MemoryCache;
use tasknest::cache::sqlite::SqliteCache;
use tasknest::config::EngineConfig;
use tasknest::remote::day_bounds;
use tasknest::remote::memory::MemoryRemoteStore;
use tasknest::repository::TaskRepository;
use tasknest_proto::task::{ClockTime, Priority, Task, TaskColor, TaskId};

// ---------------------------------------------------------------------------
// Helper functions
// ---------------------------------------------------------------------------

fn make_task(id: &str, day: u32, hour: u32, minute: u32, start: &str) -> Task {
    Task {
        task_id: TaskId::from_string(id),
        user_id: "u-1".to_string(),
        title: format!("task {id}"),
        description: String::new(),
        time_start: start.parse().unwrap(),
        time_end: ClockTime::new(23, 59).unwrap(),
        date_start: Utc.with_ymd_and_hms(2026, 4, day, hour, minute, 0).unwrap(),
        task_color: TaskColor::parse("#667788").unwrap(),
        priority: Priority::Medium,
        completed: false,
        notification_enabled: false,
        created_at: 0,
    }
}

fn ids(tasks: &[Task]) -> Vec<&str> {
    tasks.iter().map(|t| t.task_id.as_str()).collect()
}

async fn next<T>(watch: &mut tasknest::cache::watch::TaskWatch<T>) -> T {
    tokio::time::timeout(Duration::from_secs(2), watch.recv())
        .await
        .expect("watch should emit within the timeout")
        .expect("watch should still be open")
}

// ---------------------------------------------------------------------------
// Range correctness on the durable cache
// ---------------------------------------------------------------------------

#[tokio::test]
async fn middle_day_query_returns_exactly_that_day_time_ordered() {
    let cache = SqliteCache::open_in_memory().unwrap();

    // Three consecutive days; the middle one has out-of-order inserts.
    cache.upsert(&make_task("day1", 1, 12, 0, "08:00")).await.unwrap();
    cache.upsert(&make_task("mid-late", 2, 9, 0, "16:00")).await.unwrap();
    cache.upsert(&make_task("mid-early", 2, 20, 0, "07:30")).await.unwrap();
    cache.upsert(&make_task("mid-noon", 2, 1, 0, "12:00")).await.unwrap();
    cache.upsert(&make_task("day3", 3, 12, 0, "06:00")).await.unwrap();

    let (start, end) = day_bounds(NaiveDate::from_ymd_opt(2026, 4, 2).unwrap());
    let day = cache.get_by_date_range(start, end).await.unwrap();
    assert_eq!(ids(&day), ["mid-early", "mid-noon", "mid-late"]);
}

#[tokio::test]
async fn day_window_is_half_open_at_midnight() {
    let cache = SqliteCache::open_in_memory().unwrap();
    cache.upsert(&make_task("at-midnight", 2, 0, 0, "00:00")).await.unwrap();
    cache.upsert(&make_task("last-minute", 2, 23, 59, "23:59")).await.unwrap();
    cache.upsert(&make_task("next-midnight", 3, 0, 0, "00:00")).await.unwrap();

    let (start, end) = day_bounds(NaiveDate::from_ymd_opt(2026, 4, 2).unwrap());
    let day = cache.get_by_date_range(start, end).await.unwrap();
    assert_eq!(ids(&day), ["at-midnight", "last-minute"]);
}

#[tokio::test]
async fn memory_and_sqlite_agree_on_the_day_window() {
    let sqlite = SqliteCache::open_in_memory().unwrap();
    let memory = MemoryCache::new();
    for task in [
        make_task("a", 1, 5, 0, "09:00"),
        make_task("b", 2, 5, 0, "11:00"),
        make_task("c", 2, 5, 0, "10:00"),
        make_task("d", 3, 5, 0, "08:00"),
    ] {
        sqlite.upsert(&task).await.unwrap();
        memory.upsert(&task).await.unwrap();
    }

    let (start, end) = day_bounds(NaiveDate::from_ymd_opt(2026, 4, 2).unwrap());
    let from_sqlite = sqlite.get_by_date_range(start, end).await.unwrap();
    let from_memory = memory.get_by_date_range(start, end).await.unwrap();
    assert_eq!(from_sqlite, from_memory);
    assert_eq!(ids(&from_sqlite), ["c", "b"]);
}

// ---------------------------------------------------------------------------
// Switch-latest date observation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn observe_tasks_for_date_recomputes_when_the_date_changes() {
    let cache = Arc::new(MemoryCache::new());
    let remote = Arc::new(MemoryRemoteStore::new());
    let repo = TaskRepository::new(Arc::clone(&cache), remote, &EngineConfig::default());

    cache.upsert(&make_task("on-day1", 1, 9, 0, "09:00")).await.unwrap();
    cache.upsert(&make_task("on-day2", 2, 9, 0, "10:00")).await.unwrap();

    let (date_tx, date_rx) = watch::channel(NaiveDate::from_ymd_opt(2026, 4, 1).unwrap());
    let mut view = repo.observe_tasks_for_date(date_rx);

    let snapshot = next(&mut view).await;
    assert_eq!(ids(&snapshot), ["on-day1"]);

    // Changing the date supersedes the old day's query.
    date_tx
        .send(NaiveDate::from_ymd_opt(2026, 4, 2).unwrap())
        .unwrap();
    let snapshot = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let snapshot = next(&mut view).await;
            if ids(&snapshot) == ["on-day2"] {
                return snapshot;
            }
        }
    })
    .await
    .expect("view should converge on the new date");
    assert_eq!(snapshot.len(), 1);
    view.cancel().await;
}

#[tokio::test]
async fn observe_tasks_for_date_re_emits_on_cache_writes() {
    let cache = Arc::new(MemoryCache::new());
    let remote = Arc::new(MemoryRemoteStore::new());
    let repo = TaskRepository::new(Arc::clone(&cache), remote, &EngineConfig::default());

    let (_date_tx, date_rx) = watch::channel(NaiveDate::from_ymd_opt(2026, 4, 2).unwrap());
    let mut view = repo.observe_tasks_for_date(date_rx);
    assert!(next(&mut view).await.is_empty());

    cache.upsert(&make_task("landed", 2, 9, 0, "09:00")).await.unwrap();
    let snapshot = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let snapshot = next(&mut view).await;
            if !snapshot.is_empty() {
                return snapshot;
            }
        }
    })
    .await
    .expect("view should pick up the cache write");
    assert_eq!(ids(&snapshot), ["landed"]);
    view.cancel().await;
}

#[tokio::test]
async fn observe_tasks_for_date_ends_when_the_date_source_is_dropped() {
    let cache = Arc::new(MemoryCache::new());
    let remote = Arc::new(MemoryRemoteStore::new());
    let repo = TaskRepository::new(Arc::clone(&cache), remote, &EngineConfig::default());

    let (date_tx, date_rx) = watch::channel(NaiveDate::from_ymd_opt(2026, 4, 2).unwrap());
    let mut view = repo.observe_tasks_for_date(date_rx);
    let _ = next(&mut view).await;

    drop(date_tx);
    let ended = tokio::time::timeout(Duration::from_secs(2), view.recv())
        .await
        .expect("view should end promptly");
    assert!(ended.is_none());
}
