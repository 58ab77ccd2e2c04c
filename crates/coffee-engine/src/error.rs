use chrono::{DateTime, Utc};
use thiserror::Error;

use coffee_scheduler::ScheduleError;
use coffee_types::MemberId;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("member {member} already has a live match in cycle {cycle}")]
    Conflict { member: MemberId, cycle: i64 },

    #[error("{0} not found")]
    NotFound(String),

    #[error("deadline {fire_at} is not in the future")]
    PastDeadline { fire_at: DateTime<Utc> },

    #[error("store error: {0}")]
    Store(#[from] anyhow::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;

impl From<ScheduleError> for EngineError {
    fn from(err: ScheduleError) -> Self {
        match err {
            ScheduleError::PastDeadline { fire_at, .. } => EngineError::PastDeadline { fire_at },
            ScheduleError::Store(e) => EngineError::Store(e),
            other @ ScheduleError::DispatcherStopped { .. } => EngineError::Store(other.into()),
        }
    }
}
