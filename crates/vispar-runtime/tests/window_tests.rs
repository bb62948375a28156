//! Integration tests for the hybrid time/length window

use vispar_runtime::clock::{ManualClock, NoopScheduler, RecordingScheduler};
use vispar_runtime::event::{Event, EventKind};
use vispar_runtime::persistence::{Checkpointable, OperatorCheckpoint, OperatorState};
use vispar_runtime::{Clock, HybridWindow, StateError};

fn reading(ts: i64, room: &str) -> Event {
    Event::new("Dht11", ts)
        .with_field("room", room)
        .with_field("temperature", 20.5)
}

fn timestamps(events: &[Event]) -> Vec<i64> {
    events.iter().map(|e| e.timestamp).collect()
}

// =============================================================================
// Eviction scenarios
// =============================================================================

#[test]
fn test_age_evicts_everything_before_admitting() {
    let mut window = HybridWindow::new(3, 1_000).unwrap();
    let mut sched = RecordingScheduler::new();

    for ts in [0, 100, 200] {
        let admission = window.admit(reading(ts, "lab"), ts, &mut sched);
        assert!(admission.evicted.is_empty());
    }
    assert_eq!(window.len(), 3);

    let admission = window.admit(reading(2_000, "lab"), 2_000, &mut sched);
    assert!(admission.retained);
    assert_eq!(timestamps(&admission.evicted), vec![0, 100, 200]);
    assert!(admission.evicted.iter().all(Event::is_expired));
    assert_eq!(timestamps(&window.snapshot()), vec![2_000]);
}

#[test]
fn test_capacity_evicts_oldest_at_same_instant() {
    let mut window = HybridWindow::new(2, 100_000).unwrap();
    let mut sched = RecordingScheduler::new();

    window.admit(reading(0, "a"), 0, &mut sched);
    window.admit(reading(0, "b"), 0, &mut sched);
    let admission = window.admit(reading(0, "c"), 0, &mut sched);

    assert_eq!(admission.evicted.len(), 1);
    assert_eq!(admission.evicted[0].get_str("room"), Some("a"));
    assert!(admission.evicted[0].is_expired());
    assert_eq!(window.len(), 2);
}

#[test]
fn test_capacity_wins_over_remaining_ttl() {
    let mut window = HybridWindow::new(1, 60_000).unwrap();
    let mut sched = NoopScheduler;

    window.admit(reading(0, "first"), 0, &mut sched);
    let admission = window.admit(reading(10, "second"), 10, &mut sched);
    assert_eq!(admission.evicted[0].get_str("room"), Some("first"));
}

#[test]
fn test_age_and_capacity_in_one_admission() {
    let mut window = HybridWindow::new(2, 100).unwrap();
    let mut sched = NoopScheduler;

    window.admit(reading(0, "old"), 0, &mut sched);
    window.admit(reading(90, "mid"), 90, &mut sched);
    window.admit(reading(95, "new"), 95, &mut sched);
    // "old" left by capacity at 95; "mid" expires by age at 190.
    let admission = window.admit(reading(190, "latest"), 190, &mut sched);
    assert_eq!(timestamps(&admission.evicted), vec![90]);
    assert_eq!(timestamps(&window.snapshot()), vec![95, 190]);
}

// =============================================================================
// Proactive expiry
// =============================================================================

#[test]
fn test_quiet_stream_expires_through_wakeups() {
    let clock = ManualClock::new(0);
    let mut window = HybridWindow::new(8, 250).unwrap();
    let mut sched = RecordingScheduler::new();

    window.admit(reading(clock.now(), "a"), clock.now(), &mut sched);
    clock.advance(100);
    window.admit(reading(clock.now(), "b"), clock.now(), &mut sched);

    let mut expired = Vec::new();
    // Deliver each requested callback at its deadline until nothing is pending.
    while let Some(wakeup) = sched.take().pop() {
        clock.set(wakeup.at);
        expired.extend(window.on_wakeup(wakeup.token, clock.now(), &mut sched));
    }

    assert_eq!(timestamps(&expired), vec![0, 100]);
    assert!(window.is_empty());
    assert_eq!(window.pending_wakeup(), None);
}

#[test]
fn test_find_filters_retained_events() {
    let mut window = HybridWindow::new(4, 1_000).unwrap();
    let mut sched = NoopScheduler;
    for (ts, room) in [(0, "lab"), (1, "hall"), (2, "lab")] {
        window.admit(reading(ts, room), ts, &mut sched);
    }

    let labs = window.find(|e| e.get_str("room") == Some("lab"));
    assert_eq!(labs.len(), 2);
    assert_eq!(labs[0].timestamp, 0);
    assert_eq!(labs[1].timestamp, 2);
    assert!(window.find(|e| e.get_str("room") == Some("roof")).is_empty());
}

// =============================================================================
// Checkpoint / restore
// =============================================================================

#[test]
fn test_restore_through_bytes_continues_identically() {
    let mut original = HybridWindow::new(3, 500).unwrap();
    let mut sched = RecordingScheduler::new();
    original.admit(reading(0, "a"), 0, &mut sched);
    original.admit(reading(200, "b"), 200, &mut sched);

    let blob = original.checkpoint().to_bytes().unwrap();
    let mut restored = HybridWindow::new(3, 500).unwrap();
    restored
        .restore(&OperatorCheckpoint::from_bytes(&blob).unwrap())
        .unwrap();
    assert_eq!(restored.pending_wakeup(), Some(500));

    let mut other = RecordingScheduler::new();
    assert_eq!(
        original.tick(500, &mut sched),
        restored.tick(500, &mut other)
    );
    assert_eq!(
        original.admit(reading(600, "c"), 600, &mut sched),
        restored.admit(reading(600, "c"), 600, &mut other)
    );
    assert_eq!(original.snapshot(), restored.snapshot());
}

#[test]
fn test_restore_rejects_tampered_checkpoints() {
    let mut window = HybridWindow::new(2, 500).unwrap();
    let mut sched = NoopScheduler;
    window.admit(reading(0, "a"), 0, &mut sched);
    window.admit(reading(10, "b"), 10, &mut sched);
    let good = window.checkpoint();

    let mut reordered = good.clone();
    if let OperatorState::Window(cp) = &mut reordered.state {
        cp.entries.reverse();
    }
    let mut over_capacity = good.clone();
    if let OperatorState::Window(cp) = &mut over_capacity.state {
        let extra = cp.entries[1].clone();
        cp.entries.push(extra);
        cp.occupancy = 3;
    }

    let mut late_wakeup = good.clone();
    if let OperatorState::Window(cp) = &mut late_wakeup.state {
        cp.pending_wakeup = Some(1_000_000);
    }
    let mut wakeup_on_empty = good.clone();
    if let OperatorState::Window(cp) = &mut wakeup_on_empty.state {
        cp.entries.clear();
        cp.occupancy = 0;
    }
    let mut expired_entry = good.clone();
    if let OperatorState::Window(cp) = &mut expired_entry.state {
        cp.entries[0].event.kind = EventKind::Expired;
    }

    let mut target = HybridWindow::new(2, 500).unwrap();
    for bad in [
        reordered,
        over_capacity,
        late_wakeup,
        wakeup_on_empty,
        expired_entry,
    ] {
        assert!(matches!(
            target.restore(&bad),
            Err(StateError::Inconsistent(_))
        ));
        assert!(target.is_empty(), "rejected restore must not change state");
    }

    let mut different_config = HybridWindow::new(5, 500).unwrap();
    assert!(different_config.restore(&good).is_err());
}

#[test]
fn test_restore_keeps_proactive_expiry() {
    let mut window = HybridWindow::new(2, 100).unwrap();
    window.admit(reading(0, "a"), 0, &mut NoopScheduler);
    let mut cp = window.checkpoint();

    // An earlier wake-up than the front deadline only costs one empty tick.
    if let OperatorState::Window(state) = &mut cp.state {
        assert_eq!(state.pending_wakeup, Some(100));
        state.pending_wakeup = Some(40);
    }
    let mut target = HybridWindow::new(2, 100).unwrap();
    target.restore(&cp).unwrap();

    let mut sched = RecordingScheduler::new();
    target.resume(&mut sched);
    let first = sched.take();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].at, 40);
    assert!(target.on_wakeup(first[0].token, 40, &mut sched).is_empty());

    let next = sched.last().unwrap();
    assert_eq!(next.at, 100);
    assert_eq!(
        timestamps(&target.on_wakeup(next.token, 100, &mut sched)),
        vec![0]
    );
}
