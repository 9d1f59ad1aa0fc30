//! SQLite-backed per-agent exchange memory.
//!
//! Each engine records the prompts it received and the responses it
//! produced, so an agent can carry recent context into its next run.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::{params, Connection};

use crate::error::Error;

/// One remembered exchange line.
#[derive(Debug, Clone)]
pub struct Exchange {
    pub role: String,
    pub content: String,
    pub ts: i64,
}

/// Per-agent memory backed by a SQLite file in the agent workspace.
pub struct Memory {
    conn: Mutex<Connection>,
    agent_id: String,
}

impl Memory {
    /// Open (creating if needed) the memory database under `dir`.
    pub fn open(dir: &Path, agent_id: &str) -> Result<Self, Error> {
        let path = db_path(dir);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn =
            Connection::open(&path).map_err(|e| Error::Memory(format!("sqlite open: {}", e)))?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS exchanges (
                id TEXT PRIMARY KEY,
                ts INTEGER NOT NULL,
                agent_id TEXT NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_exchanges_agent ON exchanges(agent_id, ts);
            "#,
        )
        .map_err(|e| Error::Memory(format!("sqlite init: {}", e)))?;

        Ok(Self {
            conn: Mutex::new(conn),
            agent_id: agent_id.to_string(),
        })
    }

    /// Record one exchange line (role is "user" or "assistant").
    pub fn record(&self, role: &str, content: &str) -> Result<(), Error> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.execute(
            "INSERT INTO exchanges (id, ts, agent_id, role, content) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                ulid::Ulid::new().to_string(),
                chrono::Utc::now().timestamp_millis(),
                self.agent_id,
                role,
                content
            ],
        )
        .map_err(|e| Error::Memory(format!("sqlite insert: {}", e)))?;
        Ok(())
    }

    /// Most recent exchanges for this agent, oldest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<Exchange>, Error> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let mut stmt = conn
            .prepare(
                "SELECT role, content, ts FROM exchanges WHERE agent_id = ?1 \
                 ORDER BY ts DESC, id DESC LIMIT ?2",
            )
            .map_err(|e| Error::Memory(format!("sqlite prepare: {}", e)))?;

        let rows = stmt
            .query_map(params![self.agent_id, limit as i64], |row| {
                Ok(Exchange {
                    role: row.get(0)?,
                    content: row.get(1)?,
                    ts: row.get(2)?,
                })
            })
            .map_err(|e| Error::Memory(format!("sqlite query: {}", e)))?;

        let mut exchanges: Vec<Exchange> = Vec::new();
        for row in rows {
            exchanges.push(row.map_err(|e| Error::Memory(format!("sqlite row: {}", e)))?);
        }
        exchanges.reverse();
        Ok(exchanges)
    }
}

fn db_path(dir: &Path) -> PathBuf {
    dir.join("memory.db")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_recent() {
        let dir = tempfile::tempdir().unwrap();
        let memory = Memory::open(dir.path(), "coder").unwrap();

        memory.record("user", "fix the bug").unwrap();
        memory.record("assistant", "done").unwrap();

        let recent = memory.recent(10).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].role, "user");
        assert_eq!(recent[0].content, "fix the bug");
        assert_eq!(recent[1].role, "assistant");
    }

    #[test]
    fn test_recent_is_scoped_per_agent() {
        let dir = tempfile::tempdir().unwrap();
        let coder = Memory::open(dir.path(), "coder").unwrap();
        let reviewer = Memory::open(dir.path(), "reviewer").unwrap();

        coder.record("user", "coder message").unwrap();

        assert_eq!(coder.recent(10).unwrap().len(), 1);
        assert!(reviewer.recent(10).unwrap().is_empty());
    }

    #[test]
    fn test_recent_limit() {
        let dir = tempfile::tempdir().unwrap();
        let memory = Memory::open(dir.path(), "coder").unwrap();

        for i in 0..5 {
            memory.record("user", &format!("message {}", i)).unwrap();
        }

        let recent = memory.recent(2).unwrap();
        assert_eq!(recent.len(), 2);
        // Oldest-first within the window of the two newest rows.
        assert_eq!(recent[1].content, "message 4");
    }
}
