//! Shared fixtures for the engine's unit tests.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};

use coffee_db::Database;
use coffee_scheduler::{ReminderQueue, ScheduleError};
use coffee_types::{ChatAddress, Clock, FakeClock};

use crate::sqlite::SqliteMatchStore;

/// Sunday 2020-07-05 04:20 UTC.
pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2020, 7, 5, 4, 20, 0).unwrap()
}

/// Records scheduled reminders instead of arming them.
pub struct RecordingQueue {
    clock: Arc<dyn Clock>,
    pub scheduled: Mutex<Vec<(DateTime<Utc>, ChatAddress, String)>>,
}

impl RecordingQueue {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            scheduled: Mutex::new(Vec::new()),
        }
    }

    pub fn take(&self) -> Vec<(DateTime<Utc>, ChatAddress, String)> {
        std::mem::take(&mut *self.scheduled.lock().unwrap())
    }
}

impl ReminderQueue for RecordingQueue {
    fn schedule(&self, fire_at: DateTime<Utc>, destination: ChatAddress, body: &str) -> Result<i64, ScheduleError> {
        let now = self.clock.now();
        if fire_at <= now {
            return Err(ScheduleError::PastDeadline { fire_at, now });
        }
        let mut scheduled = self.scheduled.lock().unwrap();
        scheduled.push((fire_at, destination, body.to_string()));
        Ok(scheduled.len() as i64)
    }
}

pub struct Fixture {
    pub db: Arc<Database>,
    pub clock: Arc<FakeClock>,
    pub store: Arc<SqliteMatchStore>,
    pub queue: Arc<RecordingQueue>,
}

impl Fixture {
    pub fn new() -> Self {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let clock = Arc::new(FakeClock::new(start_time()));
        let store = Arc::new(SqliteMatchStore::open(db.clone(), clock.clone()).unwrap());
        let queue = Arc::new(RecordingQueue::new(clock.clone()));
        Self { db, clock, store, queue }
    }

    /// Register members `ids` in `city`. Handles are `user<id>`, chat
    /// addresses are `100 + id`.
    pub fn add_members(&self, city: &str, ids: impl IntoIterator<Item = i64>) {
        for id in ids {
            self.db
                .upsert_member(id, &format!("user{}", id), city, 100 + id)
                .unwrap();
        }
    }
}
