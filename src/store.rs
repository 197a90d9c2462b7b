//! Metadata store: users and image records in SQLite.
//!
//! The pipeline only needs four calls, captured by [`MetadataStore`]:
//! insert a record, find one owned record, count and page through an
//! owner's records. Every read is filtered by owner, so a record belonging
//! to someone else looks exactly like a missing one.
//!
//! [`SqliteStore`] is the production implementation. The schema mirrors a
//! small relational layout:
//!
//! ```text
//! users(id PK, username UNIQUE, created_at)
//!   └── images(id PK, user_id FK ON DELETE CASCADE, storage_path, file_name,
//!              file_type CHECK IN ('png','jpeg'), file_size, width, height,
//!              created_at, updated_at)
//! ```
//!
//! Timestamps are stored as whole seconds since the Unix epoch. The
//! connection sits behind a `Mutex` so one store can be shared by every
//! worker.

use crate::types::{FileType, ImageId, ImageRecord, NewImage, User};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Corrupt record {id}: {reason}")]
    CorruptRecord { id: i64, reason: String },
    #[error("Username already taken: {0}")]
    UsernameTaken(String),
    #[error("Store lock poisoned")]
    Poisoned,
}

/// Persistence operations the pipeline relies on.
///
/// `Sync` so ingestors and engines can share one store across workers.
pub trait MetadataStore: Sync {
    /// Insert a new record and return it with its assigned id and timestamps.
    fn insert_image(&self, image: &NewImage) -> Result<ImageRecord, StoreError>;

    /// Look up a record by id, only if `owner_id` owns it.
    fn find_owned_image(&self, owner_id: i64, id: ImageId)
    -> Result<Option<ImageRecord>, StoreError>;

    /// Number of records owned by `owner_id`.
    fn count_owned_images(&self, owner_id: i64) -> Result<u64, StoreError>;

    /// Owned records in ascending id order.
    fn list_owned_images(
        &self,
        owner_id: i64,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<ImageRecord>, StoreError>;
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    username    TEXT NOT NULL UNIQUE,
    created_at  INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS images (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id       INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    storage_path  TEXT NOT NULL,
    file_name     TEXT NOT NULL,
    file_type     TEXT NOT NULL CHECK (file_type IN ('png', 'jpeg')),
    file_size     INTEGER NOT NULL CHECK (file_size > 0),
    width         INTEGER NOT NULL CHECK (width > 0),
    height        INTEGER NOT NULL CHECK (height > 0),
    created_at    INTEGER NOT NULL,
    updated_at    INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_images_user_id ON images(user_id);
";

const IMAGE_COLUMNS: &str = "id, user_id, storage_path, file_name, file_type, file_size, \
                             width, height, created_at, updated_at";

/// SQLite-backed [`MetadataStore`].
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (creating if needed) the database file and ensure the schema.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        debug!(path = %path.display(), "opened metadata store");
        Self::with_connection(conn)
    }

    /// Private in-memory database, used by tests and dry runs.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        // Foreign keys are per-connection in SQLite
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Register a user. Usernames are unique.
    pub fn create_user(&self, username: &str) -> Result<User, StoreError> {
        let conn = self.lock()?;
        let now = now_seconds();
        let inserted = conn.execute(
            "INSERT INTO users (username, created_at) VALUES (?1, ?2)",
            params![username, now],
        );
        match inserted {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                return Err(StoreError::UsernameTaken(username.to_string()));
            }
            Err(e) => return Err(e.into()),
        }
        let id = conn.last_insert_rowid();
        Ok(User {
            id,
            username: username.to_string(),
            created_at: timestamp(id, now)?,
        })
    }

    pub fn find_user_by_name(&self, username: &str) -> Result<Option<User>, StoreError> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT id, username, created_at FROM users WHERE username = ?1",
                params![username],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                },
            )
            .optional()?;
        row.map(|(id, username, created_at)| {
            Ok(User {
                id,
                username,
                created_at: timestamp(id, created_at)?,
            })
        })
        .transpose()
    }

    /// Delete a user and, through the cascade, every record they own.
    ///
    /// Returns whether a user was removed. Files on disk are left alone.
    pub fn delete_user(&self, user_id: i64) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let removed = conn.execute("DELETE FROM users WHERE id = ?1", params![user_id])?;
        Ok(removed > 0)
    }
}

fn now_seconds() -> i64 {
    Utc::now().timestamp()
}

fn timestamp(id: i64, secs: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp(secs, 0).ok_or_else(|| StoreError::CorruptRecord {
        id,
        reason: format!("timestamp out of range: {secs}"),
    })
}

/// Columns exactly as SQLite hands them back, before domain checks.
struct RawImageRow {
    id: i64,
    user_id: i64,
    storage_path: String,
    file_name: String,
    file_type: String,
    file_size: i64,
    width: u32,
    height: u32,
    created_at: i64,
    updated_at: i64,
}

impl RawImageRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            storage_path: row.get(2)?,
            file_name: row.get(3)?,
            file_type: row.get(4)?,
            file_size: row.get(5)?,
            width: row.get(6)?,
            height: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }

    fn into_record(self) -> Result<ImageRecord, StoreError> {
        let file_type =
            FileType::parse(&self.file_type).ok_or_else(|| StoreError::CorruptRecord {
                id: self.id,
                reason: format!("unknown file type {:?}", self.file_type),
            })?;
        Ok(ImageRecord {
            id: ImageId::from_db(self.id),
            user_id: self.user_id,
            storage_path: self.storage_path,
            file_name: self.file_name,
            file_type,
            file_size: u64::try_from(self.file_size).map_err(|_| StoreError::CorruptRecord {
                id: self.id,
                reason: format!("negative file size {}", self.file_size),
            })?,
            width: self.width,
            height: self.height,
            created_at: timestamp(self.id, self.created_at)?,
            updated_at: timestamp(self.id, self.updated_at)?,
        })
    }
}

impl MetadataStore for SqliteStore {
    fn insert_image(&self, image: &NewImage) -> Result<ImageRecord, StoreError> {
        let file_size = i64::try_from(image.file_size).map_err(|_| StoreError::CorruptRecord {
            id: 0,
            reason: format!("file size {} out of range", image.file_size),
        })?;
        let conn = self.lock()?;
        let now = now_seconds();
        conn.execute(
            "INSERT INTO images (user_id, storage_path, file_name, file_type, file_size, \
             width, height, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
            params![
                image.user_id,
                image.storage_path,
                image.file_name,
                image.file_type.as_str(),
                file_size,
                image.width,
                image.height,
                now,
            ],
        )?;
        let id = conn.last_insert_rowid();
        let created_at = timestamp(id, now)?;
        Ok(ImageRecord {
            id: ImageId::from_db(id),
            user_id: image.user_id,
            storage_path: image.storage_path.clone(),
            file_name: image.file_name.clone(),
            file_type: image.file_type,
            file_size: image.file_size,
            width: image.width,
            height: image.height,
            created_at,
            updated_at: created_at,
        })
    }

    fn find_owned_image(
        &self,
        owner_id: i64,
        id: ImageId,
    ) -> Result<Option<ImageRecord>, StoreError> {
        let conn = self.lock()?;
        let sql = format!("SELECT {IMAGE_COLUMNS} FROM images WHERE id = ?1 AND user_id = ?2");
        let raw = conn
            .query_row(&sql, params![id.get(), owner_id], RawImageRow::from_row)
            .optional()?;
        raw.map(RawImageRow::into_record).transpose()
    }

    fn count_owned_images(&self, owner_id: i64) -> Result<u64, StoreError> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM images WHERE user_id = ?1",
            params![owner_id],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }

    fn list_owned_images(
        &self,
        owner_id: i64,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<ImageRecord>, StoreError> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {IMAGE_COLUMNS} FROM images WHERE user_id = ?1 \
             ORDER BY id ASC LIMIT ?2 OFFSET ?3"
        );
        // SQLite takes signed 64-bit LIMIT/OFFSET
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let offset = i64::try_from(offset).unwrap_or(i64::MAX);
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![owner_id, limit, offset], RawImageRow::from_row)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?.into_record()?);
        }
        Ok(records)
    }
}
