use rusqlite::Connection;

use crate::error::Result;

/// Initialise the `sessions` table.
///
/// Safe to call on every startup — uses `IF NOT EXISTS` throughout. Shares
/// the connection passed to `reeflow_history::db::init_db`; both tables
/// live in one database file.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS sessions (
            session_id    TEXT PRIMARY KEY,
            user_id       TEXT NOT NULL,
            config        TEXT NOT NULL,
            status        TEXT NOT NULL,
            session_name  TEXT,
            summary       TEXT,
            created_at    TEXT NOT NULL,
            updated_at    TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_sessions_user
            ON sessions(user_id, updated_at DESC);",
    )?;
    Ok(())
}
