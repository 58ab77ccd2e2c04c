use std::collections::HashSet;

use chrono::{DateTime, Utc};

use coffee_types::{Match, MemberId};

use crate::error::EngineResult;

/// Cycle-versioned match records.
///
/// "Live" means not refused and stamped with the current cycle. A member is
/// in at most one live match at a time. The store owns the cycle counter:
/// it is read with `current_cycle` and only ever moved by `advance_cycle`.
pub trait MatchStore: Send + Sync {
    fn current_cycle(&self) -> i64;

    /// Move to the next cycle and return it. Call once per matching round.
    fn advance_cycle(&self) -> i64;

    /// The member's live match, with the member on the first side.
    fn find_current_match(&self, member: MemberId) -> EngineResult<Option<Match>>;

    /// Fails with `Conflict` when either side already has a live match.
    fn add_match(&self, first: MemberId, second: MemberId) -> EngineResult<()>;

    /// Mark the member's live match as refused. Fails with `NotFound`.
    fn break_match(&self, member: MemberId) -> EngineResult<()>;

    /// Fails with `NotFound` when the member has no live match.
    fn update_meeting_time(&self, member: MemberId, time: DateTime<Utc>) -> EngineResult<()>;

    fn all_matched_user_ids(&self) -> EngineResult<HashSet<MemberId>>;
}
