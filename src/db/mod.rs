//! Metadata store. Raw SQL with rusqlite, no ORM.

pub mod boards;
pub mod recordings;

pub use boards::{BoardState, BoardStateStore};
pub use recordings::{NewRecording, PersistedRecording, RecordingStore};

use anyhow::{anyhow, Context, Result};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Shared handle to the sqlite database. One connection behind a mutex is
/// plenty for a single-user local service.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (and migrate) the database at the default data-dir location.
    pub fn open_default() -> Result<Self> {
        let db_path = crate::global::db_file()?;

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create database directory")?;
        }

        Self::open(&db_path)
    }

    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open database connection")?;
        migrate(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        migrate(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub(crate) fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("database lock poisoned"))
    }
}

pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS recordings (
            id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL,
            name TEXT NOT NULL,
            remote_url TEXT NOT NULL,
            size_bytes INTEGER NOT NULL,
            duration_seconds INTEGER NOT NULL,
            created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )
    .context("Failed to create recordings table")?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_recordings_project
         ON recordings(project_id, created_at DESC)",
        [],
    )
    .context("Failed to create index on recordings")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS board_states (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            project_id TEXT NOT NULL,
            document TEXT NOT NULL,
            created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )
    .context("Failed to create board_states table")?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_board_states_project
         ON board_states(project_id, created_at DESC)",
        [],
    )
    .context("Failed to create index on board_states")?;

    Ok(())
}
