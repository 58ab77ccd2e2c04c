use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use coffee_db::Database;
use coffee_types::{ChatAddress, Clock, Reminder};

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("reminder deadline {fire_at} is not after the current time {now}")]
    PastDeadline {
        fire_at: DateTime<Utc>,
        now: DateTime<Utc>,
    },

    #[error("reminder dispatcher is not running, reminder {id} stays persisted")]
    DispatcherStopped { id: i64 },

    #[error("reminder store error: {0}")]
    Store(#[from] anyhow::Error),
}

/// Anything that can accept a future-dated notification.
pub trait ReminderQueue: Send + Sync {
    /// Persist and arm a reminder. Returns the reminder id.
    fn schedule(
        &self,
        fire_at: DateTime<Utc>,
        destination: ChatAddress,
        body: &str,
    ) -> Result<i64, ScheduleError>;
}

/// What `recover` did with the persisted reminders.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryReport {
    pub rearmed: usize,
    pub delivered_late: usize,
    pub dropped: usize,
}

/// Persists reminders and arms them on the dispatcher task.
#[derive(Clone)]
pub struct ReminderScheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    db: Arc<Database>,
    clock: Arc<dyn Clock>,

    /// Newly armed reminders -> dispatcher
    arm_tx: mpsc::UnboundedSender<Armed>,

    /// Reminders that missed their deadline by at most this much while the
    /// process was down are still delivered on recovery.
    grace: chrono::Duration,

    recovered: AtomicBool,
}

/// A reminder waiting on the dispatcher heap.
struct Armed {
    deadline: Instant,
    reminder: Reminder,
}

impl PartialEq for Armed {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Armed {}

impl PartialOrd for Armed {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Armed {
    fn cmp(&self, other: &Self) -> Ordering {
        self.deadline
            .cmp(&other.deadline)
            .then(self.reminder.id.cmp(&other.reminder.id))
    }
}

impl ReminderScheduler {
    /// Spawn the dispatcher task. Fired reminders are pushed into `handoff`
    /// and stay persisted until the delivery worker confirms them.
    pub fn start(
        db: Arc<Database>,
        clock: Arc<dyn Clock>,
        handoff: mpsc::Sender<Reminder>,
        grace: chrono::Duration,
    ) -> (Self, JoinHandle<()>) {
        let (arm_tx, arm_rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run_dispatch_loop(arm_rx, handoff));

        let scheduler = Self {
            inner: Arc::new(SchedulerInner {
                db,
                clock,
                arm_tx,
                grace,
                recovered: AtomicBool::new(false),
            }),
        };
        (scheduler, handle)
    }

    /// Re-arm every persisted reminder. Call once, right after `start`.
    pub fn recover(&self) -> Result<RecoveryReport, ScheduleError> {
        let mut report = RecoveryReport::default();
        if self.inner.recovered.swap(true, AtomicOrdering::SeqCst) {
            warn!("Reminder recovery already ran, skipping");
            return Ok(report);
        }

        let now = self.inner.clock.now();
        for row in self.inner.db.pending_reminders()? {
            let reminder = Reminder::from(row);
            let Some(fire_at) = reminder.fire_at_utc() else {
                warn!("Dropping reminder {} with unreadable deadline {}", reminder.id, reminder.fire_at);
                self.inner.db.delete_reminder(reminder.id)?;
                report.dropped += 1;
                continue;
            };

            if fire_at > now {
                debug!("Restoring reminder {} for {} at {}", reminder.id, reminder.destination, fire_at);
                self.arm(reminder, until(fire_at, now))?;
                report.rearmed += 1;
            } else if now - fire_at <= self.inner.grace {
                info!(
                    "Reminder {} for {} missed its deadline {} while down, delivering now",
                    reminder.id, reminder.destination, fire_at
                );
                self.arm(reminder, Duration::ZERO)?;
                report.delivered_late += 1;
            } else {
                warn!(
                    "Dropping reminder {} for {}: deadline {} passed {}s ago",
                    reminder.id,
                    reminder.destination,
                    fire_at,
                    (now - fire_at).num_seconds()
                );
                self.inner.db.delete_reminder(reminder.id)?;
                report.dropped += 1;
            }
        }

        info!(
            "Reminder recovery: {} re-armed, {} delivered late, {} dropped",
            report.rearmed, report.delivered_late, report.dropped
        );
        Ok(report)
    }

    fn arm(&self, reminder: Reminder, delay: Duration) -> Result<(), ScheduleError> {
        let id = reminder.id;
        let armed = Armed {
            deadline: Instant::now() + delay,
            reminder,
        };
        self.inner.arm_tx.send(armed).map_err(|_| {
            warn!("Dispatcher stopped, reminder {} stays persisted until the next start", id);
            ScheduleError::DispatcherStopped { id }
        })
    }
}

impl ReminderQueue for ReminderScheduler {
    fn schedule(
        &self,
        fire_at: DateTime<Utc>,
        destination: ChatAddress,
        body: &str,
    ) -> Result<i64, ScheduleError> {
        let now = self.inner.clock.now();
        if fire_at <= now {
            return Err(ScheduleError::PastDeadline { fire_at, now });
        }

        let id = self
            .inner
            .db
            .insert_reminder(fire_at.timestamp(), destination, body)?;
        info!("Saved reminder {} for {} at {}", id, destination, fire_at);

        self.arm(
            Reminder {
                id,
                fire_at: fire_at.timestamp(),
                destination,
                body: body.to_string(),
            },
            until(fire_at, now),
        )?;
        Ok(id)
    }
}

fn until(fire_at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (fire_at - now).to_std().unwrap_or_default()
}

/// Owns the armed reminders and fires them in deadline order.
///
/// Runs until every `ReminderScheduler` handle is dropped and the heap is
/// empty, or until the delivery queue is closed.
async fn run_dispatch_loop(
    mut arm_rx: mpsc::UnboundedReceiver<Armed>,
    handoff: mpsc::Sender<Reminder>,
) {
    let mut pending: BinaryHeap<Reverse<Armed>> = BinaryHeap::new();
    let mut accepting = true;

    loop {
        let next_deadline = pending.peek().map(|Reverse(armed)| armed.deadline);
        if !accepting && next_deadline.is_none() {
            break;
        }

        tokio::select! {
            armed = arm_rx.recv(), if accepting => match armed {
                Some(armed) => pending.push(Reverse(armed)),
                None => accepting = false,
            },
            _ = tokio::time::sleep_until(next_deadline.unwrap_or_else(Instant::now)), if next_deadline.is_some() => {
                let now = Instant::now();
                while pending.peek().is_some_and(|Reverse(armed)| armed.deadline <= now) {
                    if let Some(Reverse(armed)) = pending.pop() {
                        fire(armed.reminder, &handoff);
                    }
                }
                if handoff.is_closed() {
                    warn!("Delivery queue closed, {} armed reminders stay persisted", pending.len());
                    break;
                }
            }
        }
    }

    debug!("Reminder dispatcher stopped");
}

/// Hand a due reminder to the delivery queue. The row is pruned by the
/// delivery worker once the sink accepts it.
///
/// A full queue parks only this reminder on its own task; the dispatcher
/// keeps serving other deadlines.
fn fire(reminder: Reminder, handoff: &mpsc::Sender<Reminder>) {
    let id = reminder.id;
    match handoff.try_send(reminder) {
        Ok(()) => debug!("Reminder {} handed to delivery", id),
        Err(TrySendError::Full(reminder)) => {
            debug!("Delivery queue full, reminder {} waits for room", id);
            let handoff = handoff.clone();
            tokio::spawn(async move {
                if handoff.send(reminder).await.is_err() {
                    warn!("Delivery queue closed, reminder {} stays persisted", id);
                }
            });
        }
        Err(TrySendError::Closed(_)) => {
            warn!("Delivery queue closed, reminder {} stays persisted", id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use coffee_types::FakeClock;

    fn start_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 7, 5, 4, 20, 0).unwrap()
    }

    fn setup(
        capacity: usize,
    ) -> (Arc<Database>, Arc<FakeClock>, ReminderScheduler, mpsc::Receiver<Reminder>, JoinHandle<()>) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let clock = Arc::new(FakeClock::new(start_time()));
        let (tx, rx) = mpsc::channel(capacity);
        let (scheduler, handle) =
            ReminderScheduler::start(db.clone(), clock.clone(), tx, chrono::Duration::minutes(10));
        (db, clock, scheduler, rx, handle)
    }

    #[tokio::test(start_paused = true)]
    async fn rejects_deadlines_at_or_before_now() {
        let (db, clock, scheduler, _rx, _handle) = setup(8);

        let err = scheduler.schedule(clock.now(), 1, "now").unwrap_err();
        assert!(matches!(err, ScheduleError::PastDeadline { .. }));

        let err = scheduler
            .schedule(clock.now() - chrono::Duration::hours(1), 1, "yesterday")
            .unwrap_err();
        assert!(matches!(err, ScheduleError::PastDeadline { .. }));

        assert!(db.pending_reminders().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn fires_at_the_deadline_and_keeps_the_row_until_delivered() {
        let (db, clock, scheduler, mut rx, _handle) = setup(8);

        let start = Instant::now();
        let fire_at = clock.now() + chrono::Duration::seconds(4);
        scheduler.schedule(fire_at, 42, "bring a towel").unwrap();
        assert_eq!(db.pending_reminders().unwrap().len(), 1);

        let fired = rx.recv().await.unwrap();
        let elapsed = start.elapsed();
        assert_eq!(fired.destination, 42);
        assert_eq!(fired.body, "bring a towel");
        assert_eq!(fired.fire_at, fire_at.timestamp());
        assert!(elapsed >= Duration::from_secs(4));
        assert!(elapsed < Duration::from_secs(5));

        // Only the delivery worker prunes.
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(db.pending_reminders().unwrap().len(), 1);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn later_schedule_with_earlier_deadline_fires_first() {
        let (_db, clock, scheduler, mut rx, _handle) = setup(8);

        scheduler
            .schedule(clock.now() + chrono::Duration::seconds(10), 1, "late")
            .unwrap();
        scheduler
            .schedule(clock.now() + chrono::Duration::seconds(3), 2, "early")
            .unwrap();

        assert_eq!(rx.recv().await.unwrap().body, "early");
        assert_eq!(rx.recv().await.unwrap().body, "late");
    }

    #[tokio::test(start_paused = true)]
    async fn recovery_rearms_future_reminders() {
        let (db, clock, first, _rx, handle) = setup(8);
        let fire_at = clock.now() + chrono::Duration::seconds(4);
        first.schedule(fire_at, 42, "bring a towel").unwrap();

        // Simulate a crash: the dispatcher dies with the reminder still armed.
        handle.abort();
        drop(first);

        clock.advance(chrono::Duration::seconds(2));
        let (tx, mut rx) = mpsc::channel(8);
        let (second, _handle) =
            ReminderScheduler::start(db.clone(), clock.clone(), tx, chrono::Duration::minutes(10));

        let start = Instant::now();
        let report = second.recover().unwrap();
        assert_eq!(report, RecoveryReport { rearmed: 1, delivered_late: 0, dropped: 0 });

        let fired = rx.recv().await.unwrap();
        let elapsed = start.elapsed();
        assert_eq!(fired.body, "bring a towel");
        assert!(elapsed >= Duration::from_secs(2));
        assert!(elapsed < Duration::from_secs(3));

        // A second call must not arm duplicates.
        assert_eq!(second.recover().unwrap(), RecoveryReport::default());
    }

    #[tokio::test(start_paused = true)]
    async fn recovery_applies_the_grace_window_to_overdue_reminders() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let now = start_time();
        db.insert_reminder((now - chrono::Duration::minutes(5)).timestamp(), 1, "slightly late")
            .unwrap();
        db.insert_reminder((now - chrono::Duration::hours(3)).timestamp(), 2, "stale")
            .unwrap();

        let clock = Arc::new(FakeClock::new(now));
        let (tx, mut rx) = mpsc::channel(8);
        let (scheduler, _handle) =
            ReminderScheduler::start(db.clone(), clock, tx, chrono::Duration::minutes(10));

        let report = scheduler.recover().unwrap();
        assert_eq!(report, RecoveryReport { rearmed: 0, delivered_late: 1, dropped: 1 });

        let fired = rx.recv().await.unwrap();
        assert_eq!(fired.body, "slightly late");

        let rows = db.pending_reminders().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].body, "slightly late");
    }

    #[tokio::test(start_paused = true)]
    async fn reminders_handed_off_but_not_delivered_survive_a_crash() {
        let (db, clock, first, rx, handle) = setup(8);
        first
            .schedule(clock.now() + chrono::Duration::seconds(4), 42, "bring a towel")
            .unwrap();

        // Fires into a queue nobody drains, then the process dies.
        tokio::time::sleep(Duration::from_secs(5)).await;
        handle.abort();
        let _ = handle.await;
        drop(rx);
        drop(first);
        assert_eq!(db.pending_reminders().unwrap().len(), 1);

        clock.advance(chrono::Duration::seconds(5));
        let (tx, mut rx) = mpsc::channel(8);
        let (second, _handle) =
            ReminderScheduler::start(db.clone(), clock.clone(), tx, chrono::Duration::minutes(10));
        let report = second.recover().unwrap();
        assert_eq!(report, RecoveryReport { rearmed: 0, delivered_late: 1, dropped: 0 });

        let redelivered = rx.recv().await.unwrap();
        assert_eq!(redelivered.destination, 42);
        assert_eq!(redelivered.body, "bring a towel");
    }

    #[tokio::test(start_paused = true)]
    async fn schedule_fails_once_the_dispatcher_is_gone() {
        let (db, clock, scheduler, _rx, handle) = setup(8);
        handle.abort();
        let _ = handle.await;

        let err = scheduler
            .schedule(clock.now() + chrono::Duration::seconds(4), 42, "bring a towel")
            .unwrap_err();
        assert!(matches!(err, ScheduleError::DispatcherStopped { .. }));

        // Still on disk for the next start.
        assert_eq!(db.pending_reminders().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn full_delivery_queue_does_not_hold_back_other_deadlines() {
        let (db, clock, scheduler, mut rx, _handle) = setup(1);

        for (secs, body) in [(1, "one"), (2, "two"), (3, "three")] {
            scheduler
                .schedule(clock.now() + chrono::Duration::seconds(secs), 7, body)
                .unwrap();
        }

        // Nobody drains the queue until every deadline has passed.
        tokio::time::sleep(Duration::from_secs(5)).await;

        let mut bodies = Vec::new();
        for _ in 0..3 {
            bodies.push(rx.recv().await.unwrap().body);
        }
        bodies.sort();
        assert_eq!(bodies, vec!["one", "three", "two"]);
        assert_eq!(db.pending_reminders().unwrap().len(), 3);
    }
}
