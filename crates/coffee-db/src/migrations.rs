use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (members, matches, reminders)");
        conn.execute_batch(
            "
            CREATE TABLE members (
                id              INTEGER PRIMARY KEY,
                handle          TEXT NOT NULL,
                city            TEXT NOT NULL,
                chat_address    INTEGER NOT NULL,
                active          INTEGER NOT NULL DEFAULT 1,
                pairing_scope   TEXT NOT NULL DEFAULT 'local',
                updated_at      TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX idx_members_active ON members(active);

            CREATE TABLE matches (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                first_id        INTEGER NOT NULL,
                second_id       INTEGER NOT NULL,
                cycle           INTEGER NOT NULL,
                created_at      INTEGER NOT NULL,
                meeting_time    INTEGER,
                refused         INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX idx_matches_cycle ON matches(cycle, refused);

            CREATE TABLE reminders (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                fire_at         INTEGER NOT NULL,
                destination     INTEGER NOT NULL,
                body            TEXT NOT NULL
            );

            CREATE INDEX idx_reminders_fire_at ON reminders(fire_at);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
