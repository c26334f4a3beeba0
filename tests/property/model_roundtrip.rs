//! Property-based round-trip tests for the task model.
//!
//! Uses proptest to verify:
//! 1. Any valid `Task` survives the cache-record projection and the
//!    postcard codec round-trip.
//! 2. Any valid `Task` survives the JSON document round-trip, including
//!    unknown priority strings.
//! 3. `ClockTime` parse/display round-trips and never panics on
//!    arbitrary input.
//! 4. Random bytes never cause a panic in `record::decode`.

use chrono::{DateTime, Utc};
use proptest::prelude::*;

use tasknest_proto::record::{self, CacheRecord};
use tasknest_proto::task::{ClockTime, Priority, Task, TaskColor, TaskId};
use tasknest_proto::{doc, event::ChangeEvent};

// --- Strategies for model types ---

/// Strategy for generating valid `ClockTime` values.
fn arb_clock_time() -> impl Strategy<Value = ClockTime> {
    (0u8..24, 0u8..60).prop_map(|(h, m)| ClockTime::new(h, m).expect("components in range"))
}

/// Strategy for generating `TaskId` values (assigned and unassigned).
fn arb_task_id() -> impl Strategy<Value = TaskId> {
    prop_oneof![
        Just(TaskId::unassigned()),
        "[a-z0-9]{1,32}".prop_map(TaskId::from_string),
    ]
}

/// Strategy for generating `Priority` values, including unknown strings
/// a newer client might produce.
fn arb_priority() -> impl Strategy<Value = Priority> {
    prop_oneof![
        Just(Priority::High),
        Just(Priority::Medium),
        Just(Priority::Low),
        "[A-Za-z]{1,16}"
            .prop_filter("must not be a known level", |s| Priority::parse(s).is_err())
            .prop_map(Priority::Other),
    ]
}

/// Strategy for generating colors: valid hex plus arbitrary remote strings.
fn arb_color() -> impl Strategy<Value = TaskColor> {
    prop_oneof![
        (0u32..0x0100_0000).prop_map(|rgb| {
            TaskColor::parse(&format!("#{rgb:06X}")).expect("formatted hex is valid")
        }),
        "[a-z]{1,12}".prop_map(TaskColor::from_remote),
    ]
}

/// Strategy for generating instants between 1970 and ~2100.
fn arb_instant() -> impl Strategy<Value = DateTime<Utc>> {
    (0i64..4_102_444_800_000).prop_map(|ms| {
        DateTime::from_timestamp_millis(ms).expect("millis in supported range")
    })
}

/// Strategy for generating arbitrary `Task` values.
fn arb_task() -> impl Strategy<Value = Task> {
    (
        (
            arb_task_id(),
            "[a-z0-9]{1,16}",
            "[^\x00]{0,64}",
            "[^\x00]{0,128}",
        ),
        (arb_clock_time(), arb_clock_time()),
        arb_instant(),
        (arb_color(), arb_priority()),
        any::<bool>(),
        any::<bool>(),
        any::<i64>(),
    )
        .prop_map(
            |(
                (task_id, user_id, title, description),
                (time_start, time_end),
                date_start,
                (task_color, priority),
                completed,
                notification_enabled,
                created_at,
            )| Task {
                task_id,
                user_id,
                title,
                description,
                time_start,
                time_end,
                date_start,
                task_color,
                priority,
                completed,
                notification_enabled,
                created_at,
            },
        )
}

// --- Property tests ---

proptest! {
    /// Display → parse round-trips every valid clock time.
    #[test]
    fn clock_time_display_parse_round_trip(time in arb_clock_time()) {
        let text = time.to_string();
        let parsed: ClockTime = text.parse().expect("displayed form should parse");
        prop_assert_eq!(parsed, time);
    }

    /// Parsing arbitrary input returns a result, never panics.
    #[test]
    fn clock_time_parse_never_panics(input in ".{0,16}") {
        let _ = input.parse::<ClockTime>();
    }

    /// Packed-minutes projection round-trips every valid clock time.
    #[test]
    fn clock_time_packed_round_trip(time in arb_clock_time()) {
        let packed = time.packed_minutes();
        prop_assert_eq!(ClockTime::from_packed_minutes(packed).expect("valid packing"), time);
    }

    /// Any task survives the cache-record projection in both directions.
    #[test]
    fn cache_record_projection_is_lossless(task in arb_task()) {
        let rec = CacheRecord::from_task(&task);
        prop_assert_eq!(rec.into_task().expect("projection should invert"), task);
    }

    /// Any cache record survives the postcard encode → decode round-trip.
    #[test]
    fn record_codec_round_trip(task in arb_task()) {
        let rec = CacheRecord::from_task(&task);
        let bytes = record::encode(&rec).expect("encode should succeed");
        let decoded = record::decode(&bytes).expect("decode should succeed");
        prop_assert_eq!(decoded, rec);
    }

    /// Random bytes never cause a panic in record decode.
    #[test]
    fn record_decode_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..256)) {
        let _ = record::decode(&bytes);
    }

    /// Any task survives the JSON document round-trip, unknown enum
    /// strings included.
    #[test]
    fn document_round_trip(task in arb_task()) {
        let document = doc::to_document(&task);
        let decoded = doc::from_document(document).expect("document should parse");
        prop_assert_eq!(decoded, task);
    }

    /// Change events preserve their snapshot through serde.
    #[test]
    fn change_event_json_round_trip(task in arb_task()) {
        let event = ChangeEvent::Modified(task);
        let json = serde_json::to_string(&event).expect("serialize");
        let decoded: ChangeEvent = serde_json::from_str(&json).expect("deserialize");
        prop_assert_eq!(decoded, event);
    }
}
