//! Integration tests for the sequence clock.
//!
//! Walks the documented scenarios end to end, checks save/restore through
//! the SQLite store, and property-tests the time arithmetic.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use pomocycle_core::{
    Database, KeyValueStore, ManualTimer, PhaseSequence, PomoSettings, PomoTimer, SequenceClock,
};
use proptest::prelude::*;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 11, 14, 30, 0).unwrap()
}

fn at(secs: i64) -> DateTime<Utc> {
    t0() + chrono::Duration::seconds(secs)
}

fn short_sequence() -> PhaseSequence {
    PhaseSequence::build(
        1,
        Duration::from_secs(4),
        Duration::from_secs(2),
        Duration::from_secs(5),
    )
    .unwrap()
}

fn clock_with_log() -> (SequenceClock<ManualTimer>, Arc<Mutex<Vec<usize>>>) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    let clock = SequenceClock::new(short_sequence(), ManualTimer::new(), t0(), move |i| {
        sink.lock().unwrap().push(i)
    });
    (clock, log)
}

/// Fire whatever is pending at the moment it comes due, until nothing is.
fn run_to_end(clock: &mut SequenceClock<ManualTimer>, mut now: DateTime<Utc>) -> DateTime<Utc> {
    while let Some(pending) = clock.timer_mut().take() {
        now += chrono::Duration::from_std(pending.delay).unwrap();
        clock.fire(pending.token, now);
    }
    now
}

#[test]
fn four_two_five_scenario() {
    let seq = short_sequence();
    assert_eq!(seq.len(), 3);
    assert_eq!(seq.total_duration(), Duration::from_secs(11));

    let (mut clock, log) = clock_with_log();
    clock.start(t0(), None);

    assert_eq!(clock.current_index(at(3)), 0);
    assert_eq!(clock.time_remaining(at(3)), Duration::from_secs(1));
    assert_eq!(clock.current_index(at(5)), 1);
    assert_eq!(clock.time_remaining(at(5)), Duration::from_secs(1));

    let end = run_to_end(&mut clock, t0());
    assert_eq!(end, at(11));
    assert_eq!(clock.current_index(at(11)), 2);
    assert_eq!(clock.time_remaining(at(11)), Duration::ZERO);
    assert_eq!(clock.time_remaining(at(60)), Duration::ZERO);
    assert_eq!(log.lock().unwrap().last(), Some(&3));
}

#[test]
fn long_pause_keeps_remaining_time() {
    let (mut clock, _) = clock_with_log();
    clock.start(t0(), None);
    clock.pause(at(2));
    assert_eq!(clock.time_remaining(at(2)), Duration::from_secs(2));

    clock.resume(at(102));
    assert_eq!(clock.current_index(at(102)), 0);
    assert_eq!(clock.time_remaining(at(102)), Duration::from_secs(2));
    assert_eq!(clock.timer().pending().unwrap().delay, Duration::from_secs(2));
}

#[test]
fn suspended_process_catches_up_without_replay() {
    let seq = PhaseSequence::build(
        4,
        Duration::from_secs(25 * 60),
        Duration::from_secs(5 * 60),
        Duration::from_secs(15 * 60),
    )
    .unwrap();
    let mut db = Database::open_memory().unwrap();

    let mut clock = SequenceClock::new(seq.clone(), ManualTimer::new(), t0(), |_| {});
    clock.start(t0(), None);
    clock.save_state(&mut db, at(60)).unwrap();
    drop(clock);

    // 25 + 5 + 25 + 5 minutes later, plus a bit: three boundaries were missed.
    let later = at(60 * 60 + 90);
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    let mut restored = SequenceClock::new(seq, ManualTimer::new(), later, move |i| {
        sink.lock().unwrap().push(i)
    });
    let report = restored.restore_state(&db, later);

    assert_eq!(report.saved_at, Some(at(60)));
    assert_eq!(restored.current_index(later), 4);
    assert_eq!(
        restored.time_remaining(later),
        Duration::from_secs(25 * 60 - 90)
    );
    assert_eq!(restored.timer().armed_count(), 1);
    assert_eq!(restored.armed_index(), Some(4));
    assert!(log.lock().unwrap().is_empty());
}

#[test]
fn restore_after_sequence_ended_finishes_once() {
    let mut db = Database::open_memory().unwrap();
    let mut pomo = PomoTimer::new(
        PomoSettings {
            pomo_count: 1,
            work: Duration::from_secs(4),
            rest: Duration::from_secs(2),
            long_break: Duration::from_secs(5),
            segment_stagger: Duration::ZERO,
        },
        ManualTimer::new(),
        t0(),
    )
    .unwrap();
    pomo.start(t0());
    pomo.save_state(&mut db, at(1)).unwrap();

    let mut fresh = PomoTimer::new(PomoSettings::default(), ManualTimer::new(), at(300)).unwrap();
    fresh.restore_state(&db, at(300));
    assert_eq!(fresh.sequence().len(), 3);

    let pending = fresh.clock_mut().timer_mut().take().unwrap();
    assert_eq!(pending.delay, Duration::ZERO);
    let events = fresh.handle_fire(pending.token, at(300));
    assert_eq!(events.len(), 1);
    assert!(matches!(
        events[0],
        pomocycle_core::Event::SequenceFinished { segments: 3, .. }
    ));
    assert!(fresh.clock().timer().pending().is_none());
    assert!(fresh.clock().is_paused());
}

#[test]
fn saved_keys_use_fixed_names() {
    let mut db = Database::open_memory().unwrap();
    let pomo = PomoTimer::new(PomoSettings::default(), ManualTimer::new(), t0()).unwrap();
    pomo.save_state(&mut db, t0()).unwrap();
    for key in [
        "isPaused",
        "startTime",
        "pauseStart",
        "pauseOffset",
        "timeAmounts",
        "order",
        "pomoCount",
    ] {
        assert!(db.get(key).unwrap().is_some(), "missing {key}");
    }
    assert_eq!(db.get("isPaused").unwrap().as_deref(), Some("true"));
    assert_eq!(db.get("pomoCount").unwrap().as_deref(), Some("4"));
}

#[test]
fn reset_is_idempotent() {
    let (mut clock, _) = clock_with_log();
    clock.start(t0(), None);
    clock.reset(at(3), None);
    clock.reset(at(3), None);
    assert!(clock.is_paused());
    assert_eq!(clock.current_index(at(8)), 0);
    assert_eq!(clock.time_remaining(at(8)), Duration::from_secs(4));
    assert!(clock.timer().pending().is_none());
}

proptest! {
    #[test]
    fn total_duration_round_trip(n in 1usize..=6, w in 1u64..=3600, r in 1u64..=900, b in 1u64..=3600) {
        let seq = PhaseSequence::build(
            n,
            Duration::from_secs(w),
            Duration::from_secs(r),
            Duration::from_secs(b),
        ).unwrap();
        prop_assert_eq!(seq.total_duration(), Duration::from_secs(n as u64 * w + n as u64 * r + b));
        prop_assert_eq!(seq.len(), 2 * n + 1);
    }

    #[test]
    fn index_never_moves_backwards(
        n in 1usize..=6,
        w in 1u64..=120,
        r in 1u64..=60,
        b in 1u64..=120,
        mut offsets in proptest::collection::vec(0i64..2_000_000, 1..40),
    ) {
        let seq = PhaseSequence::build(
            n,
            Duration::from_secs(w),
            Duration::from_secs(r),
            Duration::from_secs(b),
        ).unwrap();
        let mut clock = SequenceClock::new(seq, ManualTimer::new(), t0(), |_| {});
        clock.start(t0(), None);
        offsets.sort_unstable();
        let mut last = 0;
        for ms in offsets {
            let now = t0() + chrono::Duration::milliseconds(ms);
            let index = clock.current_index(now);
            prop_assert!(index >= last);
            last = index;
        }
    }

    #[test]
    fn pause_freezes_remaining(pause_at in 0i64..700_000, wait in 0i64..10_000_000) {
        let mut clock = SequenceClock::new(PhaseSequence::default(), ManualTimer::new(), t0(), |_| {});
        clock.start(t0(), None);
        let paused = t0() + chrono::Duration::milliseconds(pause_at);
        clock.pause(paused);
        let frozen = clock.time_remaining(paused);
        let index = clock.current_index(paused);
        let later = paused + chrono::Duration::milliseconds(wait);
        prop_assert_eq!(clock.time_remaining(later), frozen);
        prop_assert_eq!(clock.current_index(later), index);

        clock.resume(later);
        prop_assert_eq!(clock.time_remaining(later), frozen);
        prop_assert_eq!(clock.current_index(later), index);
    }
}
