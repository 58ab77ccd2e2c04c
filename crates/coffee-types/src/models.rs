use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable member identifier assigned by the chat platform.
pub type MemberId = i64;

/// Where replies and reminders for a member are sent.
pub type ChatAddress = i64;

/// Whether a member wants partners from their own city only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairingScope {
    #[default]
    Local,
    AnyCity,
}

impl PairingScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::AnyCity => "any_city",
        }
    }

    /// Parse the stored representation. Unknown values fall back to `Local`.
    pub fn from_db(value: &str) -> Self {
        match value {
            "any_city" => Self::AnyCity,
            _ => Self::Local,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: MemberId,
    pub handle: String,
    pub city: String,
    pub chat_address: ChatAddress,
    pub active: bool,
    pub pairing_scope: PairingScope,
}

/// A pairing of two members within one matching cycle.
///
/// `first_id` and `second_id` are unordered on disk. Lookups normalize the
/// record so the member asking is always `first_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    pub first_id: MemberId,
    pub second_id: MemberId,
    pub cycle: i64,
    pub created_at: DateTime<Utc>,
    pub meeting_time: Option<DateTime<Utc>>,
    pub refused: bool,
}

impl Match {
    /// Return the record with `member` on the first side.
    pub fn normalized_for(mut self, member: MemberId) -> Self {
        if self.second_id == member {
            std::mem::swap(&mut self.first_id, &mut self.second_id);
        }
        self
    }

    pub fn partner_id(&self) -> MemberId {
        self.second_id
    }
}

/// A persisted, one-shot notification due at `fire_at` (unix seconds).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reminder {
    pub id: i64,
    pub fire_at: i64,
    pub destination: ChatAddress,
    pub body: String,
}

impl Reminder {
    pub fn fire_at_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.fire_at, 0)
    }
}
