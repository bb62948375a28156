//! Hybrid time-and-length sliding window
//!
//! [`HybridWindow`] retains the most recent events subject to both a maximum
//! count and a maximum age. Whichever bound is violated first evicts; when both
//! are, capacity wins and the oldest entry goes regardless of its remaining
//! time-to-live. Age-based expiry is proactive: the window asks its
//! [`Scheduler`] for a callback at the oldest deadline, so events expire even
//! when the stream goes quiet.

use std::collections::VecDeque;

use tracing::{debug, trace, warn};
use vispar_core::EventTime;

use crate::clock::{Scheduler, Wakeup, WakeupToken};
use crate::error::{ConfigError, StateError};
use crate::event::{Event, EventKind};
use crate::persistence::{
    Checkpointable, OperatorCheckpoint, OperatorState, SerializableEvent, WindowCheckpoint,
    WindowEntryCheckpoint,
};

const OPERATOR: &str = "timeLengthWindow";

#[derive(Debug, Clone, PartialEq)]
struct WindowEntry {
    event: Event,
    expiry_deadline: EventTime,
}

/// Result of admitting one event
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Admission {
    /// Whether the admitted event is now held by the window
    pub retained: bool,
    /// Events that left the window, oldest first, tagged expired
    pub evicted: Vec<Event>,
}

/// A window bounded by both length and time
pub struct HybridWindow {
    capacity: usize,
    ttl_ms: i64,
    entries: VecDeque<WindowEntry>,
    /// Always equal to `entries.len()`; kept explicitly because it is part of
    /// the checkpointed state.
    occupancy: usize,
    pending_wakeup: Option<EventTime>,
    generation: u64,
}

impl HybridWindow {
    pub fn new(capacity: usize, ttl_ms: i64) -> Result<Self, ConfigError> {
        if capacity < 1 {
            return Err(ConfigError::bound(OPERATOR, "capacity must be at least 1"));
        }
        if ttl_ms < 0 {
            return Err(ConfigError::bound(
                OPERATOR,
                format!("time-to-live must not be negative, got {ttl_ms}ms"),
            ));
        }
        Ok(Self {
            capacity,
            ttl_ms,
            entries: VecDeque::with_capacity(capacity),
            occupancy: 0,
            pending_wakeup: None,
            generation: 0,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn ttl_ms(&self) -> i64 {
        self.ttl_ms
    }

    pub fn len(&self) -> usize {
        self.occupancy
    }

    pub fn is_empty(&self) -> bool {
        self.occupancy == 0
    }

    /// Deadline of the outstanding wake-up request, if any.
    pub fn pending_wakeup(&self) -> Option<EventTime> {
        self.pending_wakeup
    }

    /// Token that callbacks for the current generation must present.
    pub fn token(&self) -> WakeupToken {
        WakeupToken {
            generation: self.generation,
        }
    }

    /// Admit `event` at time `now`.
    pub fn admit(
        &mut self,
        event: Event,
        now: EventTime,
        scheduler: &mut dyn Scheduler,
    ) -> Admission {
        let mut evicted = Vec::new();
        self.drain_expired(now, &mut evicted);

        if self.occupancy >= self.capacity {
            if let Some(oldest) = self.entries.pop_front() {
                self.occupancy -= 1;
                trace!(
                    deadline = oldest.expiry_deadline,
                    now,
                    "evicting oldest entry under capacity pressure"
                );
                evicted.push(oldest.event.expired());
            }
        }

        let deadline = now.saturating_add(self.ttl_ms);
        let mut copy = event;
        copy.kind = EventKind::Current;
        self.entries.push_back(WindowEntry {
            event: copy,
            expiry_deadline: deadline,
        });
        self.occupancy += 1;

        if self.pending_wakeup.is_none() {
            self.request_wakeup(deadline, scheduler);
        }

        if !evicted.is_empty() {
            debug!(
                evicted = evicted.len(),
                occupancy = self.occupancy,
                "window admit evicted entries"
            );
        }

        Admission {
            retained: true,
            evicted,
        }
    }

    /// Advance time without new input and return the expired entries.
    pub fn tick(&mut self, now: EventTime, scheduler: &mut dyn Scheduler) -> Vec<Event> {
        self.pending_wakeup = None;

        let mut evicted = Vec::new();
        self.drain_expired(now, &mut evicted);

        if let Some(front) = self.entries.front() {
            let next = front.expiry_deadline;
            self.request_wakeup(next, scheduler);
        }

        if !evicted.is_empty() {
            debug!(
                evicted = evicted.len(),
                occupancy = self.occupancy,
                "window tick expired entries"
            );
        }
        evicted
    }

    /// Scheduler callback. Tokens from an earlier generation are ignored.
    pub fn on_wakeup(
        &mut self,
        token: WakeupToken,
        now: EventTime,
        scheduler: &mut dyn Scheduler,
    ) -> Vec<Event> {
        if token.generation != self.generation {
            warn!(
                stale = token.generation,
                current = self.generation,
                "ignoring wake-up from an earlier generation"
            );
            return Vec::new();
        }
        self.tick(now, scheduler)
    }

    /// Re-issue the pending wake-up to a new scheduler after a restore.
    pub fn resume(&mut self, scheduler: &mut dyn Scheduler) {
        if let Some(at) = self.pending_wakeup.or_else(|| self.next_deadline()) {
            self.request_wakeup(at, scheduler);
        }
    }

    /// Retained events, oldest first.
    pub fn snapshot(&self) -> Vec<Event> {
        self.entries.iter().map(|e| e.event.clone()).collect()
    }

    /// Retained events matching `predicate`, oldest first.
    pub fn find<F>(&self, mut predicate: F) -> Vec<&Event>
    where
        F: FnMut(&Event) -> bool,
    {
        self.entries
            .iter()
            .map(|e| &e.event)
            .filter(|e| predicate(e))
            .collect()
    }

    /// Oldest retained entry's deadline.
    pub fn next_deadline(&self) -> Option<EventTime> {
        self.entries.front().map(|e| e.expiry_deadline)
    }

    fn drain_expired(&mut self, now: EventTime, evicted: &mut Vec<Event>) {
        // Deadlines are non-decreasing front to back because ttl is fixed.
        while self
            .entries
            .front()
            .is_some_and(|front| front.expiry_deadline <= now)
        {
            if let Some(entry) = self.entries.pop_front() {
                self.occupancy -= 1;
                evicted.push(entry.event.expired());
            }
        }
    }

    fn request_wakeup(&mut self, at: EventTime, scheduler: &mut dyn Scheduler) {
        self.pending_wakeup = Some(at);
        trace!(at, generation = self.generation, "requesting wake-up");
        scheduler.notify_at(Wakeup {
            at,
            token: self.token(),
        });
    }

    fn validate(&self, cp: &WindowCheckpoint) -> Result<VecDeque<WindowEntry>, StateError> {
        if cp.capacity != self.capacity || cp.ttl_ms != self.ttl_ms {
            return Err(StateError::Inconsistent(format!(
                "checkpoint was taken from a window of capacity {} / ttl {}ms, this window is {} / {}ms",
                cp.capacity, cp.ttl_ms, self.capacity, self.ttl_ms
            )));
        }
        if cp.occupancy != cp.entries.len() {
            return Err(StateError::Inconsistent(format!(
                "occupancy {} does not match {} entries",
                cp.occupancy,
                cp.entries.len()
            )));
        }
        if cp.occupancy > self.capacity {
            return Err(StateError::Inconsistent(format!(
                "occupancy {} exceeds capacity {}",
                cp.occupancy, self.capacity
            )));
        }
        if cp
            .entries
            .windows(2)
            .any(|pair| pair[0].expiry_deadline > pair[1].expiry_deadline)
        {
            return Err(StateError::Inconsistent(
                "entry deadlines are not in admission order".to_string(),
            ));
        }
        if cp
            .entries
            .iter()
            .any(|e| e.event.kind == EventKind::Expired)
        {
            return Err(StateError::Inconsistent(
                "retained entries must be current events".to_string(),
            ));
        }
        match (cp.pending_wakeup, cp.entries.first()) {
            (Some(at), None) => {
                return Err(StateError::Inconsistent(format!(
                    "wake-up pending at {at} on an empty window"
                )));
            }
            (Some(at), Some(front)) if at > front.expiry_deadline => {
                return Err(StateError::Inconsistent(format!(
                    "wake-up at {at} is later than the oldest deadline {}",
                    front.expiry_deadline
                )));
            }
            _ => {}
        }
        Ok(cp
            .entries
            .iter()
            .map(|e| WindowEntry {
                event: Event::from(e.event.clone()),
                expiry_deadline: e.expiry_deadline,
            })
            .collect())
    }
}

impl Checkpointable for HybridWindow {
    fn checkpoint(&self) -> OperatorCheckpoint {
        OperatorCheckpoint::new(OperatorState::Window(WindowCheckpoint {
            capacity: self.capacity,
            ttl_ms: self.ttl_ms,
            entries: self
                .entries
                .iter()
                .map(|e| WindowEntryCheckpoint {
                    event: SerializableEvent::from(&e.event),
                    expiry_deadline: e.expiry_deadline,
                })
                .collect(),
            occupancy: self.occupancy,
            pending_wakeup: self.pending_wakeup,
        }))
    }

    fn restore(&mut self, checkpoint: &OperatorCheckpoint) -> Result<(), StateError> {
        let cp = match checkpoint.state()? {
            OperatorState::Window(cp) => cp,
            other => return Err(other.mismatch("window")),
        };
        let entries = self.validate(cp)?;

        self.entries = entries;
        self.occupancy = cp.occupancy;
        self.pending_wakeup = cp.pending_wakeup;
        // Callbacks requested before the restore must not reach the new state.
        self.generation += 1;
        Ok(())
    }
}

impl std::fmt::Debug for HybridWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HybridWindow")
            .field("capacity", &self.capacity)
            .field("ttl_ms", &self.ttl_ms)
            .field("occupancy", &self.occupancy)
            .field("pending_wakeup", &self.pending_wakeup)
            .field("generation", &self.generation)
            .finish()
    }
}
