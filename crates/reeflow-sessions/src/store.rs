use std::sync::{Arc, Mutex};

use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, instrument};
use uuid::Uuid;

use reeflow_core::time::now_secs;
use reeflow_history::{ChatMessage, HistoryStore};

use crate::config::{deep_merge, default_session_config};
use crate::error::Result;
use crate::types::{Session, SessionStatus};

/// Number of history rows loaded back by `ensure` for an existing session.
const ENSURE_HISTORY_WINDOW: usize = 100;

/// The `{session_id, messages, config}` shape returned by `ensure`.
pub struct EnsureResult {
    pub session_id: String,
    pub messages: Vec<ChatMessage>,
    pub config: serde_json::Value,
}

/// Thread-safe manager for persisted sessions.
///
/// Shares its SQLite connection handle with the `HistoryStore` it is built
/// from — both tables live in the same database file.
pub struct SessionStore {
    db: Arc<Mutex<Connection>>,
    history: Arc<HistoryStore>,
}

impl SessionStore {
    pub fn new(db: Arc<Mutex<Connection>>, history: Arc<HistoryStore>) -> Self {
        Self { db, history }
    }

    /// Return an existing session (with config and recent history), or
    /// create a new one.
    ///
    /// An unknown or empty `session_id` never reuses the caller-proposed
    /// value — a fresh id is generated, matching the "freshly generated id"
    /// wording for the create path.
    #[instrument(skip(self), fields(session_id, user_id))]
    pub fn ensure(&self, session_id: Option<&str>, user_id: &str) -> Result<EnsureResult> {
        if let Some(id) = session_id {
            if !id.is_empty() {
                if let Some(session) = self.get(id)? {
                    debug!("session cache hit");
                    let messages = self.history.recent(id, ENSURE_HISTORY_WINDOW)?;
                    return Ok(EnsureResult {
                        session_id: session.session_id,
                        messages,
                        config: session.config,
                    });
                }
            }
        }

        let new_id = Uuid::new_v4().to_string();
        let config = default_session_config();
        let now = now_secs();

        {
            let db = self.db.lock().unwrap();
            db.execute(
                "INSERT INTO sessions
                    (session_id, user_id, config, status, session_name, summary, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, NULL, NULL, ?5, ?5)",
                params![
                    new_id,
                    user_id,
                    config.to_string(),
                    SessionStatus::Active.to_string(),
                    now.to_rfc3339(),
                ],
            )?;
        }

        Ok(EnsureResult {
            session_id: new_id,
            messages: Vec::new(),
            config,
        })
    }

    /// Retrieve a session by id, returning `None` if it does not exist.
    #[instrument(skip(self), fields(session_id))]
    pub fn get(&self, session_id: &str) -> Result<Option<Session>> {
        let db = self.db.lock().unwrap();
        let row = db
            .query_row(
                "SELECT session_id, user_id, config, status, session_name, summary,
                        created_at, updated_at
                 FROM sessions WHERE session_id = ?1",
                params![session_id],
                row_to_session,
            )
            .optional()?;
        Ok(row)
    }

    /// List the most-recently-updated sessions for a user, newest first.
    #[instrument(skip(self), fields(user_id, limit))]
    pub fn list_for_user(&self, user_id: &str, limit: usize) -> Result<Vec<Session>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT session_id, user_id, config, status, session_name, summary,
                    created_at, updated_at
             FROM sessions
             WHERE user_id = ?1
             ORDER BY updated_at DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![user_id, limit as i64], row_to_session)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Deep-merge `patch` into the session's stored config and persist it.
    ///
    /// Returns the updated session. A session that does not exist is left
    /// untouched and yields `Ok(None)` rather than an error — callers treat
    /// a config update for an unknown session the same as a no-op.
    #[instrument(skip(self, patch), fields(session_id))]
    pub fn update_config(
        &self,
        session_id: &str,
        patch: &serde_json::Value,
    ) -> Result<Option<Session>> {
        let Some(mut session) = self.get(session_id)? else {
            return Ok(None);
        };

        deep_merge(&mut session.config, patch);
        let now = now_secs();

        let db = self.db.lock().unwrap();
        db.execute(
            "UPDATE sessions SET config = ?1, updated_at = ?2 WHERE session_id = ?3",
            params![session.config.to_string(), now.to_rfc3339(), session_id],
        )?;
        drop(db);

        session.updated_at = now;
        Ok(Some(session))
    }
}

fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<Session> {
    let config_text: String = row.get(2)?;
    let config = serde_json::from_str(&config_text).unwrap_or(serde_json::Value::Null);

    let status_str: String = row.get(3)?;
    let status = status_str.parse::<SessionStatus>().unwrap_or(SessionStatus::Active);

    let created_at_str: String = row.get(6)?;
    let updated_at_str: String = row.get(7)?;

    Ok(Session {
        session_id: row.get(0)?,
        user_id: row.get(1)?,
        config,
        status,
        session_name: row.get(4)?,
        summary: row.get(5)?,
        created_at: parse_rfc3339(&created_at_str),
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

    fn open_store() -> SessionStore {
        let conn = Connection::open_in_memory().unwrap();
        reeflow_history::db::init_db(&conn).unwrap();
        crate::db::init_db(&conn).unwrap();
        let db = Arc::new(Mutex::new(conn));
        let history = Arc::new(HistoryStore::new(db.clone()));
        SessionStore::new(db, history)
    }

    #[test]
    fn ensure_with_no_id_creates_active_session_with_default_config() {
        let store = open_store();
        let result = store.ensure(None, "user-1").unwrap();
        assert!(!result.session_id.is_empty());
        assert!(result.messages.is_empty());
        assert_eq!(result.config["mode"], "single");

        let session = store.get(&result.session_id).unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::Active);
        assert_eq!(session.user_id, "user-1");
    }

    #[test]
    fn ensure_with_unknown_id_generates_fresh_id_rather_than_reusing_it() {
        let store = open_store();
        let result = store.ensure(Some("client-proposed"), "user-1").unwrap();
        assert_ne!(result.session_id, "client-proposed");
    }

    #[test]
    fn ensure_with_known_id_returns_existing_config_and_history() {
        let store = open_store();
        let created = store.ensure(None, "user-1").unwrap();
        store
            .history
            .append(&created.session_id, reeflow_history::Role::User, "hi", None, None, None)
            .unwrap();

        store
            .update_config(&created.session_id, &serde_json::json!({"temperature": 0.1}))
            .unwrap();

        let reloaded = store.ensure(Some(&created.session_id), "user-1").unwrap();
        assert_eq!(reloaded.session_id, created.session_id);
        assert_eq!(reloaded.messages.len(), 1);
        assert_eq!(reloaded.config["temperature"], 0.1);
    }

    #[test]
    fn update_config_deep_merges_and_bumps_updated_at() {
        let store = open_store();
        let created = store.ensure(None, "user-1").unwrap();
        let before = store.get(&created.session_id).unwrap().unwrap();

        std::thread::sleep(std::time::Duration::from_millis(10));
        let updated = store
            .update_config(&created.session_id, &serde_json::json!({"rag": {"topk_single": 9}}))
            .unwrap()
            .unwrap();

        assert_eq!(updated.config["rag"]["topk_single"], 9);
        assert_eq!(updated.config["rag"]["topk_multi"], 3);
        assert!(updated.updated_at >= before.updated_at);
    }

    #[test]
    fn update_config_on_unknown_session_is_a_no_op() {
        let store = open_store();
        let result = store.update_config("does-not-exist", &serde_json::json!({"mode": "multi"})).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn list_for_user_orders_newest_first() {
        let store = open_store();
        let a = store.ensure(None, "user-1").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(10));
        let b = store.ensure(None, "user-1").unwrap();

        let sessions = store.list_for_user("user-1", 10).unwrap();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].session_id, b.session_id);
        assert_eq!(sessions[1].session_id, a.session_id);
    }
}
