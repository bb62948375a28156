//! Window actor
//!
//! One tokio task owns a [`HybridWindow`]. Admissions, snapshots, checkpoints,
//! restores and the expiry timer are all handled by a single `select!` loop,
//! so no two of them ever touch the window at the same time and no lock is
//! needed. Expirations caused by the timer are published on the expiry
//! channel; evictions caused by an admission are returned to the caller in
//! the [`Admission`].
//!
//! Publishing never blocks the loop. Batches the receiver has not made room
//! for wait in a queue bounded by the channel capacity; when that queue is
//! full the oldest waiting batch is dropped with a warning.
//!
//! The task ends on [`WindowHandle::shutdown`] or when every handle has been
//! dropped. Its timer is a branch of the same loop, so it goes with it.

use std::collections::VecDeque;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::clock::{Clock, Scheduler, Wakeup};
use crate::config::ActorConfig;
use crate::error::OperatorError;
use crate::event::Event;
use crate::persistence::{Checkpointable, OperatorCheckpoint};
use crate::window::{Admission, HybridWindow};

#[derive(Debug)]
enum Command {
    Admit {
        event: Event,
        reply: oneshot::Sender<Admission>,
    },
    Snapshot {
        reply: oneshot::Sender<Vec<Event>>,
    },
    Checkpoint {
        reply: oneshot::Sender<OperatorCheckpoint>,
    },
    Restore {
        checkpoint: OperatorCheckpoint,
        reply: oneshot::Sender<Result<(), OperatorError>>,
    },
    Shutdown,
}

/// Holds the single outstanding wake-up of the owned window.
#[derive(Debug, Default)]
struct DeadlineSlot {
    next: Option<Wakeup>,
}

impl Scheduler for DeadlineSlot {
    fn notify_at(&mut self, wakeup: Wakeup) {
        self.next = Some(wakeup);
    }
}

/// Cloneable handle to a running window actor
#[derive(Debug, Clone)]
pub struct WindowHandle {
    tx: mpsc::Sender<Command>,
}

impl WindowHandle {
    /// Admit `event` at the actor clock's current time.
    pub async fn admit(&self, event: Event) -> Result<Admission, OperatorError> {
        self.request(|reply| Command::Admit { event, reply }).await
    }

    /// Retained events, oldest first.
    pub async fn snapshot(&self) -> Result<Vec<Event>, OperatorError> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    pub async fn checkpoint(&self) -> Result<OperatorCheckpoint, OperatorError> {
        self.request(|reply| Command::Checkpoint { reply }).await
    }

    /// Replace the window state and re-arm its timer.
    pub async fn restore(&self, checkpoint: OperatorCheckpoint) -> Result<(), OperatorError> {
        self.request(|reply| Command::Restore { checkpoint, reply })
            .await?
    }

    /// Stop the actor. Pending requests queued before this one are served.
    pub async fn shutdown(&self) {
        let _ = self.tx.send(Command::Shutdown).await;
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, OperatorError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(command(reply))
            .await
            .map_err(|_| OperatorError::Closed)?;
        rx.await.map_err(|_| OperatorError::Closed)
    }
}

/// Task state for one window
pub struct WindowActor<C> {
    window: HybridWindow,
    clock: C,
    slot: DeadlineSlot,
    inbox: mpsc::Receiver<Command>,
    expiry_tx: Option<mpsc::Sender<Vec<Event>>>,
    /// Timer batches waiting for room on the expiry channel
    outbox: VecDeque<Vec<Event>>,
    outbox_limit: usize,
    admitted: u64,
    expired: u64,
    dropped: u64,
}

impl<C: Clock + 'static> WindowActor<C> {
    /// Spawn a task owning `window`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        window: HybridWindow,
        clock: C,
        config: &ActorConfig,
    ) -> (WindowHandle, mpsc::Receiver<Vec<Event>>) {
        let (tx, inbox) = mpsc::channel(config.inbox_capacity.max(1));
        let expiry_capacity = config.expiry_channel_capacity.max(1);
        let (expiry_tx, expiry_rx) = mpsc::channel(expiry_capacity);

        let mut actor = WindowActor {
            window,
            clock,
            slot: DeadlineSlot::default(),
            inbox,
            expiry_tx: Some(expiry_tx),
            outbox: VecDeque::new(),
            outbox_limit: expiry_capacity,
            admitted: 0,
            expired: 0,
            dropped: 0,
        };
        // A window handed over with entries already needs its timer.
        actor.window.resume(&mut actor.slot);

        tokio::spawn(actor.run());
        (WindowHandle { tx }, expiry_rx)
    }

    async fn run(mut self) {
        info!(
            capacity = self.window.capacity(),
            ttl_ms = self.window.ttl_ms(),
            "window actor started"
        );

        loop {
            let deadline = self.slot.next.map(|w| self.clock.instant_at(w.at));
            let expiry_tx = self.expiry_tx.clone();

            tokio::select! {
                biased;

                command = self.inbox.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle(command),
                },

                permit = reserve(expiry_tx.as_ref()), if !self.outbox.is_empty() => {
                    let sent = permit.map(|permit| {
                        if let Some(batch) = self.outbox.pop_front() {
                            permit.send(batch);
                        }
                    });
                    if sent.is_none() {
                        self.close_expiry();
                    }
                }

                _ = tokio::time::sleep_until(
                    deadline.unwrap_or_else(tokio::time::Instant::now)
                ), if deadline.is_some() => {
                    self.fire();
                }
            }
        }

        // Hand over whatever already fits; the rest goes with the task.
        if let Some(tx) = &self.expiry_tx {
            while let Some(batch) = self.outbox.pop_front() {
                if tx.try_send(batch).is_err() {
                    self.dropped += 1 + self.outbox.len() as u64;
                    break;
                }
            }
        }

        info!(
            admitted = self.admitted,
            expired = self.expired,
            dropped_batches = self.dropped,
            occupancy = self.window.len(),
            "window actor stopped"
        );
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Admit { event, reply } => {
                let now = self.clock.now();
                let admission = self.window.admit(event, now, &mut self.slot);
                self.admitted += 1;
                let _ = reply.send(admission);
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.window.snapshot());
            }
            Command::Checkpoint { reply } => {
                let _ = reply.send(self.window.checkpoint());
            }
            Command::Restore { checkpoint, reply } => {
                let result = self.window.restore(&checkpoint).map(|()| {
                    // Tokens issued before the restore are stale now.
                    self.slot.next = None;
                    self.window.resume(&mut self.slot);
                });
                if let Err(e) = &result {
                    warn!(error = %e, "window restore rejected");
                }
                let _ = reply.send(result.map_err(OperatorError::from));
            }
            // Handled by the loop.
            Command::Shutdown => {}
        }
    }

    fn fire(&mut self) {
        let Some(wakeup) = self.slot.next.take() else {
            return;
        };
        let now = self.clock.now();
        let expired = self.window.on_wakeup(wakeup.token, now, &mut self.slot);
        if expired.is_empty() {
            return;
        }
        self.expired += expired.len() as u64;
        debug!(count = expired.len(), now, "publishing timer expirations");

        if self.expiry_tx.is_none() {
            return;
        }
        if self.outbox.len() >= self.outbox_limit {
            if let Some(stale) = self.outbox.pop_front() {
                self.dropped += 1;
                warn!(
                    discarded = stale.len(),
                    waiting = self.outbox.len(),
                    "expiry receiver is not draining, dropping oldest batch"
                );
            }
        }
        self.outbox.push_back(expired);
    }

    fn close_expiry(&mut self) {
        warn!("expiry receiver dropped, timer expirations will be discarded");
        self.expiry_tx = None;
        self.outbox.clear();
    }
}

/// Room for one batch on the expiry channel. `None` once the receiver is
/// gone; never resolves when there is no channel.
async fn reserve(
    tx: Option<&mpsc::Sender<Vec<Event>>>,
) -> Option<mpsc::Permit<'_, Vec<Event>>> {
    match tx {
        Some(tx) => tx.reserve().await.ok(),
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TokioClock;
    use std::time::Duration;

    fn reading(ts: i64) -> Event {
        Event::new("Dht11", ts).with_field("room", "lab")
    }

    #[tokio::test(start_paused = true)]
    async fn timer_expires_without_further_input() {
        let window = HybridWindow::new(10, 1_000).unwrap();
        let (handle, mut expiry) =
            WindowActor::spawn(window, TokioClock::new(0), &ActorConfig::default());

        let admission = handle.admit(reading(0)).await.unwrap();
        assert!(admission.retained);
        assert!(admission.evicted.is_empty());

        let start = tokio::time::Instant::now();
        let batch = expiry.recv().await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_millis(1_000));
        assert_eq!(batch.len(), 1);
        assert!(batch[0].is_expired());
        assert!(handle.snapshot().await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn timer_rearms_for_the_next_entry() {
        let window = HybridWindow::new(10, 1_000).unwrap();
        let clock = TokioClock::new(0);
        let (handle, mut expiry) = WindowActor::spawn(window, clock, &ActorConfig::default());

        handle.admit(reading(0)).await.unwrap();
        tokio::time::advance(Duration::from_millis(300)).await;
        handle.admit(reading(300)).await.unwrap();

        let first = expiry.recv().await.unwrap();
        assert_eq!(first[0].timestamp, 0);
        assert_eq!(clock.now(), 1_000);

        let second = expiry.recv().await.unwrap();
        assert_eq!(second[0].timestamp, 300);
        assert_eq!(clock.now(), 1_300);
    }

    #[tokio::test(start_paused = true)]
    async fn capacity_evictions_are_returned_to_the_caller() {
        let window = HybridWindow::new(1, 10_000).unwrap();
        let (handle, _expiry) =
            WindowActor::spawn(window, TokioClock::new(0), &ActorConfig::default());

        handle.admit(reading(1)).await.unwrap();
        let admission = handle.admit(reading(2)).await.unwrap();
        assert_eq!(admission.evicted.len(), 1);
        assert_eq!(admission.evicted[0].timestamp, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn undrained_expiry_receiver_does_not_stall_admissions() {
        let config = ActorConfig {
            inbox_capacity: 8,
            expiry_channel_capacity: 1,
        };
        let (handle, mut expiry) = WindowActor::spawn(
            HybridWindow::new(4, 10).unwrap(),
            TokioClock::new(0),
            &config,
        );

        for i in 0..6 {
            let admitted =
                tokio::time::timeout(Duration::from_secs(60), handle.admit(reading(i * 50))).await;
            assert!(matches!(admitted, Ok(Ok(_))), "admit {i} stalled");
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        let snapshot = tokio::time::timeout(Duration::from_secs(60), handle.snapshot()).await;
        assert!(matches!(snapshot, Ok(Ok(ref events)) if events.is_empty()));

        // The channel holds the first batch and the newest one is queued
        // behind it; the batches in between were dropped.
        assert_eq!(expiry.recv().await.unwrap()[0].timestamp, 0);
        assert_eq!(expiry.recv().await.unwrap()[0].timestamp, 250);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_expiry_receiver_is_tolerated() {
        let (handle, expiry) = WindowActor::spawn(
            HybridWindow::new(4, 10).unwrap(),
            TokioClock::new(0),
            &ActorConfig::default(),
        );
        drop(expiry);

        handle.admit(reading(0)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.admit(reading(50)).await.unwrap();
        assert_eq!(handle.snapshot().await.unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn restore_rearms_the_timer() {
        let config = ActorConfig::default();
        let (source, _source_expiry) = WindowActor::spawn(
            HybridWindow::new(4, 500).unwrap(),
            TokioClock::new(0),
            &config,
        );
        source.admit(reading(0)).await.unwrap();
        let checkpoint = source.checkpoint().await.unwrap();
        source.shutdown().await;

        let (target, mut expiry) = WindowActor::spawn(
            HybridWindow::new(4, 500).unwrap(),
            TokioClock::new(0),
            &config,
        );
        target.restore(checkpoint).await.unwrap();
        assert_eq!(target.snapshot().await.unwrap().len(), 1);

        let batch = expiry.recv().await.unwrap();
        assert_eq!(batch.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_restore_reports_state_error() {
        let (handle, _expiry) = WindowActor::spawn(
            HybridWindow::new(4, 500).unwrap(),
            TokioClock::new(0),
            &ActorConfig::default(),
        );
        let foreign = crate::aggregation::EventCounter::new().checkpoint();
        let err = handle.restore(foreign).await.unwrap_err();
        assert!(matches!(err, OperatorError::State(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_closes_everything() {
        let (handle, mut expiry) = WindowActor::spawn(
            HybridWindow::new(4, 500).unwrap(),
            TokioClock::new(0),
            &ActorConfig::default(),
        );
        handle.admit(reading(0)).await.unwrap();
        handle.shutdown().await;

        assert_eq!(
            handle.admit(reading(1)).await.unwrap_err(),
            OperatorError::Closed
        );
        // The pending timer died with the task.
        assert!(expiry.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_all_handles_stops_the_task() {
        let (handle, mut expiry) = WindowActor::spawn(
            HybridWindow::new(4, 500).unwrap(),
            TokioClock::new(0),
            &ActorConfig::default(),
        );
        let clone = handle.clone();
        drop(handle);
        assert!(!clone.is_closed());
        drop(clone);
        assert!(expiry.recv().await.is_none());
    }
}
