use super::{ListenerRegistry, RecordStore, StoreListener, SubscriptionId};
use crate::{
    error::{BlastError, Result},
    types::{ImageFile, ImageRecord, RecordId},
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

const RECORD_COLUMNS: &str = "id, source_name, source_type, source_data, \
     processed_name, processed_type, processed_data, created_at, processed_at";

/// SQLite-backed record store
///
/// Ids come from `AUTOINCREMENT`, so they grow monotonically and are never
/// reused, even after `clear`.
pub struct SqliteRecordStore {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
    listeners: ListenerRegistry,
}

impl std::fmt::Debug for SqliteRecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteRecordStore")
            .field("db_path", &self.db_path)
            .field("listeners", &self.listeners)
            .finish_non_exhaustive()
    }
}

impl SqliteRecordStore {
    /// Open or create the database at `path`, creating parent directories
    ///
    /// # Errors
    /// - `Io` when the parent directory cannot be created
    /// - `Store` when the database cannot be opened or migrated
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| BlastError::file_io_error("create database directory", parent, &e))?;
        }

        let conn = Connection::open(path)?;
        info!(path = %path.display(), "Opened record database");
        Self::with_connection(conn, Some(path.to_path_buf()))
    }

    /// A private database that disappears with the store
    ///
    /// # Errors
    /// - `Store` when SQLite cannot create the database
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, None)
    }

    fn with_connection(conn: Connection, db_path: Option<PathBuf>) -> Result<Self> {
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            db_path,
            listeners: ListenerRegistry::new(),
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS images (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                source_name     TEXT NOT NULL,
                source_type     TEXT NOT NULL,
                source_data     BLOB NOT NULL,
                processed_name  TEXT,
                processed_type  TEXT,
                processed_data  BLOB,
                created_at      TEXT NOT NULL,
                processed_at    TEXT
            )",
            [],
        )?;

        // Pending scans filter on the processed payload
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_images_pending
             ON images(id DESC) WHERE processed_data IS NULL",
            [],
        )?;

        debug!("Record schema initialized");
        Ok(())
    }

    /// Database file, or `None` for in-memory stores
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn connection(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| BlastError::store("Database connection lock poisoned"))
    }

    fn query_records(conn: &Connection, filter: &str) -> Result<Vec<ImageRecord>> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM images {filter} ORDER BY id DESC");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], record_from_row)?;

        let mut records = Vec::new();
        for record in rows {
            records.push(record?);
        }
        Ok(records)
    }

    /// Notify subscribers with a fresh list, taken after the write lock is released
    fn notify_listeners(&self) {
        if self.listeners.is_empty() {
            return;
        }
        match self.list_most_recent_first() {
            Ok(records) => self.listeners.notify(&records),
            Err(e) => tracing::warn!(error = %e, "Failed to load records for subscribers"),
        }
    }
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<ImageRecord> {
    let processed_name: Option<String> = row.get(4)?;
    let processed_type: Option<String> = row.get(5)?;
    let processed_data: Option<Vec<u8>> = row.get(6)?;

    let processed = match (processed_name, processed_type, processed_data) {
        (Some(name), Some(mime_type), Some(data)) => Some(ImageFile::new(name, mime_type, data)),
        _ => None,
    };

    Ok(ImageRecord {
        id: row.get(0)?,
        source: ImageFile::new(
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, Vec<u8>>(3)?,
        ),
        processed,
        created_at: row.get::<_, DateTime<Utc>>(7)?,
        processed_at: row.get::<_, Option<DateTime<Utc>>>(8)?,
    })
}

impl RecordStore for SqliteRecordStore {
    fn insert(&self, source: ImageFile) -> Result<RecordId> {
        let id = {
            let conn = self.connection()?;
            conn.execute(
                "INSERT INTO images (source_name, source_type, source_data, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![source.name, source.mime_type, source.data, Utc::now()],
            )?;
            conn.last_insert_rowid()
        };
        debug!(id, name = %source.name, "Inserted pending record");
        self.notify_listeners();
        Ok(id)
    }

    fn get(&self, id: RecordId) -> Result<Option<ImageRecord>> {
        let conn = self.connection()?;
        let sql = format!("SELECT {RECORD_COLUMNS} FROM images WHERE id = ?1");
        Ok(conn
            .query_row(&sql, params![id], record_from_row)
            .optional()?)
    }

    fn pending_most_recent_first(&self) -> Result<Vec<ImageRecord>> {
        let conn = self.connection()?;
        Self::query_records(&conn, "WHERE processed_data IS NULL")
    }

    fn list_most_recent_first(&self) -> Result<Vec<ImageRecord>> {
        let conn = self.connection()?;
        Self::query_records(&conn, "")
    }

    fn set_processed(&self, id: RecordId, processed: ImageFile) -> Result<()> {
        {
            let conn = self.connection()?;
            let updated = conn.execute(
                "UPDATE images
                 SET processed_name = ?1, processed_type = ?2, processed_data = ?3, processed_at = ?4
                 WHERE id = ?5 AND processed_data IS NULL",
                params![
                    processed.name,
                    processed.mime_type,
                    processed.data,
                    Utc::now(),
                    id
                ],
            )?;

            if updated == 0 {
                let exists: bool = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM images WHERE id = ?1)",
                    params![id],
                    |row| row.get(0),
                )?;
                return Err(if exists {
                    BlastError::store(format!("Record {id} is already processed"))
                } else {
                    BlastError::store(format!("Record {id} does not exist"))
                });
            }
        }
        debug!(id, name = %processed.name, "Record processed");
        self.notify_listeners();
        Ok(())
    }

    fn delete(&self, id: RecordId) -> Result<bool> {
        let removed = {
            let conn = self.connection()?;
            conn.execute("DELETE FROM images WHERE id = ?1", params![id])?
        };
        if removed > 0 {
            debug!(id, "Deleted record");
            self.notify_listeners();
        }
        Ok(removed > 0)
    }

    fn clear(&self) -> Result<usize> {
        let removed = {
            let conn = self.connection()?;
            conn.execute("DELETE FROM images", [])?
        };
        info!(removed, "Cleared record store");
        self.notify_listeners();
        Ok(removed)
    }

    fn subscribe(&self, listener: StoreListener) -> SubscriptionId {
        self.listeners.add(listener)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.listeners.remove(id)
    }
}
