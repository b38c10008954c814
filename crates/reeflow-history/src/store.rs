use std::sync::{Arc, Mutex};

use rusqlite::{params, Connection, OptionalExtension};
use tracing::instrument;
use uuid::Uuid;

use reeflow_core::time::now_secs;

use crate::error::Result;
use crate::types::{ChatMessage, LlmMessage, Role};

/// Default window size for `recent`.
pub const DEFAULT_RECENT_LIMIT: usize = 20;

/// Thread-safe manager for persisted chat history.
///
/// Wraps a shared SQLite connection handle, following
/// `SessionManager`/`MemoryManager`: a Mutex is sufficient because no query
/// holds the lock across an `.await` point. The handle is shared with
/// `reeflow-sessions`, since both stores live in the same database file.
pub struct HistoryStore {
    db: Arc<Mutex<Connection>>,
}

impl HistoryStore {
    /// Wrap an already-open (and `db::init_db`-initialised) connection.
    pub fn new(db: Arc<Mutex<Connection>>) -> Self {
        Self { db }
    }

    /// Append one message and return the persisted row.
    ///
    /// Assigns `timestamp = now()` (second precision) and a fresh
    /// `message_id` when the caller doesn't supply one. Durable before
    /// return — the `INSERT` has committed by the time this function
    /// returns `Ok`.
    #[instrument(skip(self, content, meta_data), fields(session_id, role = %role))]
    #[allow(clippy::too_many_arguments)]
    pub fn append(
        &self,
        session_id: &str,
        role: Role,
        content: &str,
        message_type: Option<&str>,
        message_id: Option<&str>,
        meta_data: Option<serde_json::Value>,
    ) -> Result<ChatMessage> {
        let now = now_secs();
        let message_id = message_id
            .map(|s| s.to_string())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let meta_data_text = meta_data.as_ref().map(|v| v.to_string());
        let now_str = now.to_rfc3339();

        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO chat_history
                (session_id, role, content, type, status, message_id, tool_calls, meta_data, timestamp, updated_at)
             VALUES (?1, ?2, ?3, ?4, NULL, ?5, NULL, ?6, ?7, ?7)",
            params![
                session_id,
                role.to_string(),
                content,
                message_type,
                message_id,
                meta_data_text,
                now_str,
            ],
        )?;

        let id = db.last_insert_rowid();

        Ok(ChatMessage {
            id,
            session_id: session_id.to_string(),
            role,
            content: content.to_string(),
            message_type: message_type.map(|s| s.to_string()),
            status: None,
            message_id,
            tool_calls: None,
            meta_data,
            timestamp: now,
            updated_at: now,
        })
    }

    /// Return the most recent `limit` rows for a session, oldest first.
    ///
    /// Never raises `NotFound` for an unknown session — returns an empty
    /// vector instead.
    #[instrument(skip(self), fields(session_id, limit))]
    pub fn recent(&self, session_id: &str, limit: usize) -> Result<Vec<ChatMessage>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, session_id, role, content, type, status, message_id,
                    tool_calls, meta_data, timestamp, updated_at
             FROM chat_history
             WHERE session_id = ?1
             ORDER BY timestamp DESC, id DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![session_id, limit as i64], row_to_message)?;
        let mut messages: Vec<ChatMessage> = rows.filter_map(|r| r.ok()).collect();
        // query is newest-first for the LIMIT to pick the right window;
        // the contract requires ascending time order in the result.
        messages.reverse();
        Ok(messages)
    }

    /// Remove all rows for a session. Returns the number of rows removed.
    #[instrument(skip(self), fields(session_id))]
    pub fn clear(&self, session_id: &str) -> Result<usize> {
        let db = self.db.lock().unwrap();
        let removed = db.execute(
            "DELETE FROM chat_history WHERE session_id = ?1",
            params![session_id],
        )?;
        Ok(removed)
    }

    /// Look up a single message by its stable `message_id`, if present.
    pub fn get_by_message_id(&self, message_id: &str) -> Result<Option<ChatMessage>> {
        let db = self.db.lock().unwrap();
        let row = db
            .query_row(
                "SELECT id, session_id, role, content, type, status, message_id,
                        tool_calls, meta_data, timestamp, updated_at
                 FROM chat_history WHERE message_id = ?1",
                params![message_id],
                row_to_message,
            )
            .optional()?;
        Ok(row)
    }
}

/// Strip metadata and map `role` 1:1, preserving order.
pub fn format_for_llm(messages: &[ChatMessage]) -> Vec<LlmMessage> {
    messages.iter().map(LlmMessage::from).collect()
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatMessage> {
    let role_str: String = row.get(2)?;
    let role = role_str.parse::<Role>().unwrap_or(Role::User);

    let meta_text: Option<String> = row.get(8)?;
    let meta_data = meta_text.and_then(|t| serde_json::from_str(&t).ok());

    let tool_calls_text: Option<String> = row.get(7)?;
    let tool_calls = tool_calls_text.and_then(|t| serde_json::from_str(&t).ok());

    let timestamp_str: String = row.get(9)?;
    let updated_at_str: String = row.get(10)?;

    Ok(ChatMessage {
        id: row.get(0)?,
        session_id: row.get(1)?,
        role,
        content: row.get(3)?,
        message_type: row.get(4)?,
        status: row.get(5)?,
        message_id: row.get(6)?,
        tool_calls,
        meta_data,
        timestamp: parse_rfc3339(&timestamp_str),
        updated_at: parse_rfc3339(&updated_at_str),
    })
}

fn parse_rfc3339(s: &str) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .unwrap_or_else(|_| chrono::Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_store() -> HistoryStore {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_db(&conn).unwrap();
        HistoryStore::new(Arc::new(Mutex::new(conn)))
    }

    #[test]
    fn append_assigns_message_id_when_absent() {
        let store = open_store();
        let msg = store.append("s1", Role::User, "hello", None, None, None).unwrap();
        assert!(!msg.message_id.is_empty());
        assert_eq!(msg.session_id, "s1");
    }

    #[test]
    fn append_preserves_supplied_message_id() {
        let store = open_store();
        let msg = store
            .append("s1", Role::User, "hello", None, Some("fixed-id"), None)
            .unwrap();
        assert_eq!(msg.message_id, "fixed-id");
    }

    #[test]
    fn recent_returns_ascending_order() {
        let store = open_store();
        store.append("s1", Role::User, "one", None, None, None).unwrap();
        store.append("s1", Role::Assistant, "two", None, None, None).unwrap();
        store.append("s1", Role::User, "three", None, None, None).unwrap();

        let rows = store.recent("s1", 20).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].content, "one");
        assert_eq!(rows[1].content, "two");
        assert_eq!(rows[2].content, "three");
    }

    #[test]
    fn recent_respects_limit_keeping_newest() {
        let store = open_store();
        for i in 0..5 {
            store
                .append("s1", Role::User, &format!("m{i}"), None, None, None)
                .unwrap();
        }
        let rows = store.recent("s1", 2).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].content, "m3");
        assert_eq!(rows[1].content, "m4");
    }

    #[test]
    fn recent_returns_empty_for_unknown_session() {
        let store = open_store();
        let rows = store.recent("nope", 20).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn clear_removes_all_rows_and_returns_count() {
        let store = open_store();
        store.append("s1", Role::User, "a", None, None, None).unwrap();
        store.append("s1", Role::Assistant, "b", None, None, None).unwrap();
        store.append("s2", Role::User, "c", None, None, None).unwrap();

        let removed = store.clear("s1").unwrap();
        assert_eq!(removed, 2);
        assert!(store.recent("s1", 20).unwrap().is_empty());
        assert_eq!(store.recent("s2", 20).unwrap().len(), 1);
    }

    #[test]
    fn format_for_llm_strips_metadata_and_preserves_order() {
        let store = open_store();
        store
            .append(
                "s1",
                Role::User,
                "hi",
                Some("greeting"),
                None,
                Some(serde_json::json!({"routing": "x"})),
            )
            .unwrap();
        store.append("s1", Role::Assistant, "hello!", None, None, None).unwrap();

        let rows = store.recent("s1", 20).unwrap();
        let llm = format_for_llm(&rows);
        assert_eq!(llm.len(), 2);
        assert_eq!(llm[0].content, "hi");
        assert_eq!(llm[1].content, "hello!");
    }

    #[test]
    fn meta_data_round_trips_through_storage() {
        let store = open_store();
        let meta = serde_json::json!({"expert_consulted": true, "decision": "expert"});
        let msg = store
            .append("s1", Role::Assistant, "answer", Some("domain_knowledge"), None, Some(meta.clone()))
            .unwrap();
        assert_eq!(msg.meta_data, Some(meta.clone()));

        let fetched = store.get_by_message_id(&msg.message_id).unwrap().unwrap();
        assert_eq!(fetched.meta_data, Some(meta));
        assert_eq!(fetched.message_type.as_deref(), Some("domain_knowledge"));
    }
}
