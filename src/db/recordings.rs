//! Recording metadata persistence.
//!
//! A row exists only for successfully uploaded artifacts; local fallback
//! downloads never create one.

use anyhow::{Context, Result};
use rusqlite::params;
use serde::Serialize;

use super::Database;

/// The durable record of an uploaded recording.
#[derive(Debug, Clone, Serialize)]
pub struct PersistedRecording {
    pub id: String,
    pub project_id: String,
    pub name: String,
    pub remote_url: String,
    pub size_bytes: i64,
    pub duration_seconds: i64,
    pub created_at: String,
}

/// Fields for a new row; id and created_at are assigned on insert.
#[derive(Debug, Clone)]
pub struct NewRecording {
    pub project_id: String,
    pub name: String,
    pub remote_url: String,
    pub size_bytes: i64,
    pub duration_seconds: i64,
}

#[derive(Clone)]
pub struct RecordingStore {
    db: Database,
}

impl RecordingStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn insert(&self, new: NewRecording) -> Result<PersistedRecording> {
        let id = uuid::Uuid::new_v4().to_string();
        {
            let conn = self.db.conn()?;
            conn.execute(
                "INSERT INTO recordings (id, project_id, name, remote_url, size_bytes, duration_seconds)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    id,
                    new.project_id,
                    new.name,
                    new.remote_url,
                    new.size_bytes,
                    new.duration_seconds,
                ],
            )
            .context("Failed to insert recording")?;
        }

        self.get(&id)?
            .context("Inserted recording not found on read-back")
    }

    pub fn get(&self, id: &str) -> Result<Option<PersistedRecording>> {
        let conn = self.db.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, project_id, name, remote_url, size_bytes, duration_seconds, created_at
                 FROM recordings WHERE id = ?1",
            )
            .context("Failed to prepare recording query")?;

        let mut rows = stmt
            .query_map(params![id], row_to_recording)
            .context("Failed to query recording")?;

        match rows.next() {
            Some(Ok(record)) => Ok(Some(record)),
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    }

    /// List a project's recordings, newest first.
    pub fn list(&self, project_id: &str) -> Result<Vec<PersistedRecording>> {
        let conn = self.db.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, project_id, name, remote_url, size_bytes, duration_seconds, created_at
                 FROM recordings WHERE project_id = ?1
                 ORDER BY created_at DESC, id DESC",
            )
            .context("Failed to prepare recordings list query")?;

        let rows = stmt
            .query_map(params![project_id], row_to_recording)
            .context("Failed to list recordings")?;

        let mut recordings = Vec::new();
        for row in rows {
            recordings.push(row?);
        }
        Ok(recordings)
    }

    /// Delete by id. Returns whether a row existed.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let conn = self.db.conn()?;
        let deleted = conn
            .execute("DELETE FROM recordings WHERE id = ?1", params![id])
            .context("Failed to delete recording")?;
        Ok(deleted > 0)
    }
}

fn row_to_recording(row: &rusqlite::Row<'_>) -> rusqlite::Result<PersistedRecording> {
    Ok(PersistedRecording {
        id: row.get(0)?,
        project_id: row.get(1)?,
        name: row.get(2)?,
        remote_url: row.get(3)?,
        size_bytes: row.get(4)?,
        duration_seconds: row.get(5)?,
        created_at: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> RecordingStore {
        RecordingStore::new(Database::in_memory().unwrap())
    }

    fn sample(project_id: &str, name: &str) -> NewRecording {
        NewRecording {
            project_id: project_id.to_string(),
            name: name.to_string(),
            remote_url: format!("https://store.example.com/{project_id}/{name}.mkv"),
            size_bytes: 2500,
            duration_seconds: 12,
        }
    }

    #[test]
    fn test_insert_and_get() {
        let store = store();
        let inserted = store.insert(sample("project-1", "take-1")).unwrap();

        assert!(!inserted.id.is_empty());
        assert_eq!(inserted.project_id, "project-1");
        assert_eq!(inserted.size_bytes, 2500);
        assert!(!inserted.created_at.is_empty());

        let fetched = store.get(&inserted.id).unwrap().unwrap();
        assert_eq!(fetched.name, "take-1");
        assert_eq!(fetched.remote_url, inserted.remote_url);
    }

    #[test]
    fn test_get_missing_returns_none() {
        let store = store();
        assert!(store.get("nope").unwrap().is_none());
    }

    #[test]
    fn test_list_scoped_to_project() {
        let store = store();
        store.insert(sample("project-1", "a")).unwrap();
        store.insert(sample("project-1", "b")).unwrap();
        store.insert(sample("project-2", "c")).unwrap();

        let listed = store.list("project-1").unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().all(|r| r.project_id == "project-1"));

        assert!(store.list("project-3").unwrap().is_empty());
    }

    #[test]
    fn test_delete() {
        let store = store();
        let inserted = store.insert(sample("project-1", "a")).unwrap();

        assert!(store.delete(&inserted.id).unwrap());
        assert!(store.get(&inserted.id).unwrap().is_none());
        assert!(!store.delete(&inserted.id).unwrap());
    }
}
