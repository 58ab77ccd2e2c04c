//! Database row types. These map directly to SQLite rows and are converted
//! into `coffee-types` models at the edge of this crate.

use chrono::DateTime;

use coffee_types::{Match, Member, PairingScope, Reminder};

pub struct MemberRow {
    pub id: i64,
    pub handle: String,
    pub city: String,
    pub chat_address: i64,
    pub active: bool,
    pub pairing_scope: String,
}

pub struct MatchRow {
    pub id: i64,
    pub first_id: i64,
    pub second_id: i64,
    pub cycle: i64,
    pub created_at: i64,
    pub meeting_time: Option<i64>,
    pub refused: bool,
}

pub struct ReminderRow {
    pub id: i64,
    pub fire_at: i64,
    pub destination: i64,
    pub body: String,
}

impl From<MemberRow> for Member {
    fn from(row: MemberRow) -> Self {
        Member {
            id: row.id,
            handle: row.handle,
            city: row.city,
            chat_address: row.chat_address,
            active: row.active,
            pairing_scope: PairingScope::from_db(&row.pairing_scope),
        }
    }
}

impl From<MatchRow> for Match {
    fn from(row: MatchRow) -> Self {
        Match {
            first_id: row.first_id,
            second_id: row.second_id,
            cycle: row.cycle,
            created_at: DateTime::from_timestamp(row.created_at, 0).unwrap_or_default(),
            meeting_time: row.meeting_time.and_then(|t| DateTime::from_timestamp(t, 0)),
            refused: row.refused,
        }
    }
}

impl From<ReminderRow> for Reminder {
    fn from(row: ReminderRow) -> Self {
        Reminder {
            id: row.id,
            fire_at: row.fire_at,
            destination: row.destination,
            body: row.body,
        }
    }
}
