//! Board-state snapshots.
//!
//! The whiteboard document comes from the canvas subsystem's serializer
//! and is stored opaquely; this service never looks inside it.

use anyhow::{Context, Result};
use rusqlite::params;
use serde::Serialize;

use super::Database;

#[derive(Debug, Clone, Serialize)]
pub struct BoardState {
    pub id: i64,
    pub project_id: String,
    pub document: serde_json::Value,
    pub created_at: String,
}

#[derive(Clone)]
pub struct BoardStateStore {
    db: Database,
}

impl BoardStateStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Append a snapshot for the project. Returns the snapshot id.
    pub fn save(&self, project_id: &str, document: &serde_json::Value) -> Result<i64> {
        let serialized =
            serde_json::to_string(document).context("Failed to serialize board document")?;

        let conn = self.db.conn()?;
        conn.execute(
            "INSERT INTO board_states (project_id, document) VALUES (?1, ?2)",
            params![project_id, serialized],
        )
        .context("Failed to insert board state")?;

        Ok(conn.last_insert_rowid())
    }

    /// Most recent snapshot for the project, if any.
    pub fn latest(&self, project_id: &str) -> Result<Option<BoardState>> {
        let conn = self.db.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, project_id, document, created_at FROM board_states
                 WHERE project_id = ?1 ORDER BY created_at DESC, id DESC LIMIT 1",
            )
            .context("Failed to prepare board state query")?;

        let mut rows = stmt
            .query_map(params![project_id], |row| {
                let document: String = row.get(2)?;
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    document,
                    row.get::<_, String>(3)?,
                ))
            })
            .context("Failed to query board state")?;

        match rows.next() {
            Some(Ok((id, project_id, document, created_at))) => {
                let document = serde_json::from_str(&document)
                    .context("Stored board document is not valid JSON")?;
                Ok(Some(BoardState {
                    id,
                    project_id,
                    document,
                    created_at,
                }))
            }
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    }
}
