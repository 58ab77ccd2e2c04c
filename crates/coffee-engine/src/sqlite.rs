//! SQLite-backed registry and match store.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use coffee_db::{Database, MatchInsert};
use coffee_types::{ChatAddress, Clock, Match, Member, MemberId, PairingScope};

use crate::error::{EngineError, EngineResult};
use crate::match_store::MatchStore;
use crate::registry::UserRegistry;

impl UserRegistry for Database {
    fn list_active(&self) -> EngineResult<Vec<Member>> {
        Ok(self.active_members()?.into_iter().map(Member::from).collect())
    }

    fn get(&self, id: MemberId) -> EngineResult<Option<Member>> {
        Ok(self.get_member(id)?.map(Member::from))
    }

    fn set_active(&self, id: MemberId, active: bool) -> EngineResult<()> {
        if !self.set_member_active(id, active)? {
            return Err(EngineError::NotFound(format!("member {}", id)));
        }
        info!("Member {} is now {}", id, if active { "active" } else { "inactive" });
        Ok(())
    }

    fn register(&self, id: MemberId, handle: &str, city: &str, chat_address: ChatAddress) -> EngineResult<()> {
        self.upsert_member(id, handle, city, chat_address)?;
        info!("Registered member {} (@{}) in {}", id, handle, city);
        Ok(())
    }

    fn set_pairing_scope(&self, id: MemberId, scope: PairingScope) -> EngineResult<()> {
        if !Database::set_pairing_scope(self, id, scope.as_str())? {
            return Err(EngineError::NotFound(format!("member {}", id)));
        }
        Ok(())
    }
}

pub struct SqliteMatchStore {
    db: Arc<Database>,
    clock: Arc<dyn Clock>,
    cycle: AtomicI64,
}

impl SqliteMatchStore {
    /// Seeds the cycle counter from the highest cycle on disk, so numbering
    /// carries on across restarts.
    pub fn open(db: Arc<Database>, clock: Arc<dyn Clock>) -> EngineResult<Self> {
        let cycle = db.max_cycle()?;
        info!("Match store starting at cycle {}", cycle);
        Ok(Self {
            db,
            clock,
            cycle: AtomicI64::new(cycle),
        })
    }
}

impl MatchStore for SqliteMatchStore {
    fn current_cycle(&self) -> i64 {
        self.cycle.load(Ordering::SeqCst)
    }

    fn advance_cycle(&self) -> i64 {
        let next = self.cycle.fetch_add(1, Ordering::SeqCst) + 1;
        info!("Advanced to matching cycle {}", next);
        next
    }

    fn find_current_match(&self, member: MemberId) -> EngineResult<Option<Match>> {
        let row = self.db.find_live_match(member, self.current_cycle())?;
        Ok(row.map(|r| Match::from(r).normalized_for(member)))
    }

    fn add_match(&self, first: MemberId, second: MemberId) -> EngineResult<()> {
        let cycle = self.current_cycle();
        if first == second {
            return Err(EngineError::Conflict { member: first, cycle });
        }

        let created_at = self.clock.now().timestamp();
        match self.db.insert_match_if_free(first, second, cycle, created_at)? {
            MatchInsert::Inserted(id) => {
                debug!("Match {}: {} <-> {} in cycle {}", id, first, second, cycle);
                Ok(())
            }
            MatchInsert::Conflict(member) => Err(EngineError::Conflict { member, cycle }),
        }
    }

    fn break_match(&self, member: MemberId) -> EngineResult<()> {
        if self.db.refuse_live_match(member, self.current_cycle())? == 0 {
            return Err(EngineError::NotFound(format!("live match for member {}", member)));
        }
        info!("Member {} broke their match", member);
        Ok(())
    }

    fn update_meeting_time(&self, member: MemberId, time: DateTime<Utc>) -> EngineResult<()> {
        let changed = self
            .db
            .set_meeting_time(member, self.current_cycle(), time.timestamp())?;
        if changed == 0 {
            return Err(EngineError::NotFound(format!("live match for member {}", member)));
        }
        Ok(())
    }

    fn all_matched_user_ids(&self) -> EngineResult<HashSet<MemberId>> {
        Ok(self
            .db
            .matched_member_ids(self.current_cycle())?
            .into_iter()
            .collect())
    }
}
