use rusqlite::Connection;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Database-layer errors.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("failed to acquire database lock")]
    Lock,
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// SQLite handle shared across the storage modules.
pub struct Database {
    pub(crate) conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the database in the user's data directory.
    pub fn new() -> Result<Self, DbError> {
        let path = Self::database_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.create_docs_tables()?;
        Ok(db)
    }

    /// Open an in-memory database. Used by tests and throwaway embeds.
    pub fn in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.create_docs_tables()?;
        Ok(db)
    }

    fn database_path() -> Result<PathBuf, DbError> {
        let base = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
        Ok(base.join("draftdesk").join("draftdesk.db"))
    }
}
