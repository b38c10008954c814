use rusqlite::Connection;

use crate::error::Result;

/// Initialise the `chat_history` table and its index.
///
/// Safe to call on every startup — uses `IF NOT EXISTS` throughout.
/// Columns mirror the wire `ChatMessage` shape.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS chat_history (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id  TEXT NOT NULL,
            role        TEXT NOT NULL,
            content     TEXT NOT NULL,
            type        TEXT,
            status      TEXT,
            message_id  TEXT NOT NULL,
            tool_calls  TEXT,
            meta_data   TEXT,
            timestamp   TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_chat_history_session_ts
            ON chat_history(session_id, timestamp);",
    )?;
    Ok(())
}
