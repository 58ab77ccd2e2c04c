//! Durable reminder scheduling.
//!
//! Reminders are written to SQLite before they are armed, so a restart can
//! rebuild the pending set with `ReminderScheduler::recover`. A single
//! dispatcher task keeps the armed reminders in deadline order and hands
//! each one to the delivery queue when it is due.

pub mod delivery;
pub mod scheduler;

pub use delivery::{DeliverySink, run_delivery_worker};
pub use scheduler::{RecoveryReport, ReminderQueue, ReminderScheduler, ScheduleError};
