use crate::Database;
use crate::models::{MatchRow, MemberRow, ReminderRow};
use anyhow::Result;
use rusqlite::{Connection, Row, params};

/// Outcome of a guarded match insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchInsert {
    Inserted(i64),
    /// The given member already holds a live match in that cycle.
    Conflict(i64),
}

impl Database {
    // -- Members --

    /// Create or refresh a member. Re-registering reactivates the member but
    /// keeps their pairing scope.
    pub fn upsert_member(&self, id: i64, handle: &str, city: &str, chat_address: i64) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO members (id, handle, city, chat_address, active)
                 VALUES (?1, ?2, ?3, ?4, 1)
                 ON CONFLICT(id) DO UPDATE SET
                    handle = excluded.handle,
                    city = excluded.city,
                    chat_address = excluded.chat_address,
                    active = 1,
                    updated_at = datetime('now')",
                params![id, handle, city, chat_address],
            )?;
            Ok(())
        })
    }

    pub fn get_member(&self, id: i64) -> Result<Option<MemberRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, handle, city, chat_address, active, pairing_scope FROM members WHERE id = ?1",
                [id],
                member_from_row,
            )
            .optional()
        })
    }

    pub fn active_members(&self) -> Result<Vec<MemberRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, handle, city, chat_address, active, pairing_scope
                 FROM members WHERE active = 1 ORDER BY id",
            )?;
            let rows = stmt
                .query_map([], member_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Returns false when the member does not exist.
    pub fn set_member_active(&self, id: i64, active: bool) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE members SET active = ?2, updated_at = datetime('now') WHERE id = ?1",
                params![id, active],
            )?;
            Ok(changed > 0)
        })
    }

    /// Returns false when the member does not exist.
    pub fn set_pairing_scope(&self, id: i64, scope: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE members SET pairing_scope = ?2, updated_at = datetime('now') WHERE id = ?1",
                params![id, scope],
            )?;
            Ok(changed > 0)
        })
    }

    // -- Matches --

    pub fn max_cycle(&self) -> Result<i64> {
        self.with_conn(|conn| {
            let cycle = conn.query_row("SELECT COALESCE(MAX(cycle), 0) FROM matches", [], |r| r.get(0))?;
            Ok(cycle)
        })
    }

    pub fn find_live_match(&self, member: i64, cycle: i64) -> Result<Option<MatchRow>> {
        self.with_conn(|conn| query_live_match(conn, member, cycle))
    }

    /// Insert a match unless either side already holds a live match in
    /// `cycle`. The check and the insert share one transaction.
    pub fn insert_match_if_free(
        &self,
        first_id: i64,
        second_id: i64,
        cycle: i64,
        created_at: i64,
    ) -> Result<MatchInsert> {
        self.with_conn_mut(|conn| {
            let tx = conn.unchecked_transaction()?;

            for member in [first_id, second_id] {
                if query_live_match(&tx, member, cycle)?.is_some() {
                    return Ok(MatchInsert::Conflict(member));
                }
            }

            tx.execute(
                "INSERT INTO matches (first_id, second_id, cycle, created_at, refused)
                 VALUES (?1, ?2, ?3, ?4, 0)",
                params![first_id, second_id, cycle, created_at],
            )?;
            let id = tx.last_insert_rowid();
            tx.commit()?;

            Ok(MatchInsert::Inserted(id))
        })
    }

    /// Mark the member's live match in `cycle` as refused. Returns rows changed.
    pub fn refuse_live_match(&self, member: i64, cycle: i64) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE matches SET refused = 1
                 WHERE cycle = ?2 AND refused = 0 AND (first_id = ?1 OR second_id = ?1)",
                params![member, cycle],
            )?;
            Ok(changed)
        })
    }

    /// Set the meeting time (unix seconds) on the member's live match. Returns rows changed.
    pub fn set_meeting_time(&self, member: i64, cycle: i64, meeting_time: i64) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE matches SET meeting_time = ?3
                 WHERE cycle = ?2 AND refused = 0 AND (first_id = ?1 OR second_id = ?1)",
                params![member, cycle, meeting_time],
            )?;
            Ok(changed)
        })
    }

    pub fn matched_member_ids(&self, cycle: i64) -> Result<Vec<i64>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT first_id FROM matches WHERE cycle = ?1 AND refused = 0
                 UNION
                 SELECT second_id FROM matches WHERE cycle = ?1 AND refused = 0",
            )?;
            let ids = stmt
                .query_map([cycle], |row| row.get::<_, i64>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(ids)
        })
    }

    /// Every match of a cycle, refused ones included, oldest first.
    pub fn matches_in_cycle(&self, cycle: i64) -> Result<Vec<MatchRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, first_id, second_id, cycle, created_at, meeting_time, refused
                 FROM matches WHERE cycle = ?1 ORDER BY id",
            )?;
            let rows = stmt
                .query_map([cycle], match_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Reminders --

    pub fn insert_reminder(&self, fire_at: i64, destination: i64, body: &str) -> Result<i64> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO reminders (fire_at, destination, body) VALUES (?1, ?2, ?3)",
                params![fire_at, destination, body],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// All undelivered reminders, earliest first.
    pub fn pending_reminders(&self) -> Result<Vec<ReminderRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, fire_at, destination, body FROM reminders ORDER BY fire_at, id",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(ReminderRow {
                        id: row.get(0)?,
                        fire_at: row.get(1)?,
                        destination: row.get(2)?,
                        body: row.get(3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn delete_reminder(&self, id: i64) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute("DELETE FROM reminders WHERE id = ?1", [id])?;
            Ok(changed > 0)
        })
    }
}

fn member_from_row(row: &Row<'_>) -> rusqlite::Result<MemberRow> {
    Ok(MemberRow {
        id: row.get(0)?,
        handle: row.get(1)?,
        city: row.get(2)?,
        chat_address: row.get(3)?,
        active: row.get(4)?,
        pairing_scope: row.get(5)?,
    })
}

fn match_from_row(row: &Row<'_>) -> rusqlite::Result<MatchRow> {
    Ok(MatchRow {
        id: row.get(0)?,
        first_id: row.get(1)?,
        second_id: row.get(2)?,
        cycle: row.get(3)?,
        created_at: row.get(4)?,
        meeting_time: row.get(5)?,
        refused: row.get(6)?,
    })
}

fn query_live_match(conn: &Connection, member: i64, cycle: i64) -> Result<Option<MatchRow>> {
    conn.query_row(
        "SELECT id, first_id, second_id, cycle, created_at, meeting_time, refused
         FROM matches
         WHERE cycle = ?2 AND refused = 0 AND (first_id = ?1 OR second_id = ?1)
         ORDER BY id
         LIMIT 1",
        params![member, cycle],
        match_from_row,
    )
    .optional()
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> Database {
        Database::open_in_memory().unwrap()
    }

    #[test]
    fn upsert_keeps_pairing_scope_and_reactivates() {
        let db = db();
        db.upsert_member(1, "durov", "Dubai", 1).unwrap();
        assert!(db.set_pairing_scope(1, "any_city").unwrap());
        assert!(db.set_member_active(1, false).unwrap());

        db.upsert_member(1, "durov", "Minsk", 1).unwrap();
        let row = db.get_member(1).unwrap().unwrap();
        assert_eq!(row.city, "Minsk");
        assert!(row.active);
        assert_eq!(row.pairing_scope, "any_city");
    }

    #[test]
    fn active_members_skips_inactive() {
        let db = db();
        db.upsert_member(1, "durov", "Dubai", 1).unwrap();
        db.upsert_member(2, "nikolai", "Dubai", 2).unwrap();
        db.set_member_active(2, false).unwrap();

        assert!(db.get_member(5).unwrap().is_none());
        let active = db.active_members().unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].handle, "durov");
        assert!(!db.set_member_active(42, true).unwrap());
    }

    #[test]
    fn guarded_insert_rejects_either_side() {
        let db = db();
        assert_eq!(db.insert_match_if_free(2, 3, 1, 100).unwrap(), MatchInsert::Inserted(1));
        assert_eq!(db.insert_match_if_free(4, 3, 1, 100).unwrap(), MatchInsert::Conflict(3));
        assert_eq!(db.insert_match_if_free(2, 5, 1, 100).unwrap(), MatchInsert::Conflict(2));

        // A different cycle is unaffected, and a refused match frees the member.
        assert!(matches!(db.insert_match_if_free(2, 3, 2, 100).unwrap(), MatchInsert::Inserted(_)));
        assert_eq!(db.refuse_live_match(3, 1).unwrap(), 1);
        assert!(matches!(db.insert_match_if_free(4, 3, 1, 100).unwrap(), MatchInsert::Inserted(_)));
        assert_eq!(db.max_cycle().unwrap(), 2);
    }

    #[test]
    fn matched_ids_ignore_refused_matches() {
        let db = db();
        db.insert_match_if_free(2, 3, 1, 100).unwrap();
        db.insert_match_if_free(4, 5, 1, 100).unwrap();
        db.refuse_live_match(5, 1).unwrap();

        let mut ids = db.matched_member_ids(1).unwrap();
        ids.sort();
        assert_eq!(ids, vec![2, 3]);
        assert_eq!(db.matches_in_cycle(1).unwrap().len(), 2);
    }

    #[test]
    fn meeting_time_only_touches_live_match() {
        let db = db();
        db.insert_match_if_free(2, 3, 1, 100).unwrap();
        assert_eq!(db.set_meeting_time(3, 1, 5000).unwrap(), 1);
        assert_eq!(db.set_meeting_time(9, 1, 5000).unwrap(), 0);

        let row = db.find_live_match(2, 1).unwrap().unwrap();
        assert_eq!(row.meeting_time, Some(5000));
    }

    #[test]
    fn reminders_come_back_in_deadline_order() {
        let db = db();
        let late = db.insert_reminder(300, 1, "late").unwrap();
        let early = db.insert_reminder(100, 2, "early").unwrap();

        let pending = db.pending_reminders().unwrap();
        assert_eq!(pending.iter().map(|r| r.id).collect::<Vec<_>>(), vec![early, late]);

        assert!(db.delete_reminder(early).unwrap());
        assert!(!db.delete_reminder(early).unwrap());
        assert_eq!(db.pending_reminders().unwrap().len(), 1);
    }
}
