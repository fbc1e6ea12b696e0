//! SQLite adapter: local content-addressed blob store.
//!
//! Blobs are keyed by the hex SHA-256 of their bytes. `get` re-hashes what it
//! reads, so a modified row is reported as an integrity failure rather than
//! handed to the cipher.
//!
//! # Mutex Behavior
//!
//! The connection is protected by a `Mutex` that is never held across an
//! await point. Async `put`/`get` take it on the blocking pool. A poisoned
//! mutex is reported as a backend error.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};

use crate::domain::ContentId;
use crate::ports::{ContentStore, StoreError};

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

/// SQLite-backed content store.
pub struct SqliteContentStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteContentStore {
    /// Open (or create) a store at the given database path.
    ///
    /// # Errors
    /// Returns error if database cannot be opened or initialized.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing).
    ///
    /// # Errors
    /// Returns error if database cannot be created.
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.lock()?;

        conn.execute_batch(
            r"
            CREATE TABLE IF NOT EXISTS blobs (
                cid TEXT PRIMARY KEY,
                data BLOB NOT NULL,
                size INTEGER NOT NULL,
                created_at TEXT NOT NULL
            );
            ",
        )?;

        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        lock(&self.conn)
    }

    /// Content identifier for a byte string.
    #[must_use]
    pub fn content_id_for(bytes: &[u8]) -> String {
        hex::encode(Sha256::digest(bytes))
    }

    /// Number of stored blobs.
    ///
    /// # Errors
    /// Returns error if the query fails.
    pub fn count(&self) -> Result<usize, StoreError> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM blobs", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn put_blocking(conn: &Mutex<Connection>, bytes: &[u8]) -> Result<ContentId, StoreError> {
        let cid = Self::content_id_for(bytes);
        let conn = lock(conn)?;

        // Same bytes, same id: a repeated put is a no-op.
        conn.execute(
            r"
            INSERT OR IGNORE INTO blobs (cid, data, size, created_at)
            VALUES (?1, ?2, ?3, ?4)
            ",
            params![cid, bytes, bytes.len() as i64, chrono::Utc::now().to_rfc3339()],
        )?;

        tracing::debug!("Stored blob {} ({} bytes)", cid, bytes.len());
        ContentId::new(cid).map_err(StoreError::Backend)
    }

    fn get_blocking(conn: &Mutex<Connection>, id: &ContentId) -> Result<Vec<u8>, StoreError> {
        let conn = lock(conn)?;

        let data: Option<Vec<u8>> = conn
            .query_row(
                "SELECT data FROM blobs WHERE cid = ?1",
                params![id.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        let data = data.ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if Self::content_id_for(&data) != id.as_str() {
            return Err(StoreError::Integrity(id.to_string()));
        }
        Ok(data)
    }
}

fn lock(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>, StoreError> {
    conn.lock()
        .map_err(|_| StoreError::Backend("connection lock poisoned".to_string()))
}

impl ContentStore for SqliteContentStore {
    async fn put(&self, bytes: Vec<u8>) -> Result<ContentId, StoreError> {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || Self::put_blocking(&conn, &bytes))
            .await
            .map_err(|e| StoreError::Backend(format!("store task failed: {e}")))?
    }

    async fn get(&self, id: &ContentId) -> Result<Vec<u8>, StoreError> {
        let conn = Arc::clone(&self.conn);
        let id = id.clone();
        tokio::task::spawn_blocking(move || Self::get_blocking(&conn, &id))
            .await
            .map_err(|e| StoreError::Backend(format!("store task failed: {e}")))?
    }
}
