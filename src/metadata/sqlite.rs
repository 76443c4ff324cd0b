//! SQLite-backed metadata store.
//!
//! Uses `rusqlite` with the `bundled` feature so no system SQLite
//! library is required.  All async trait methods are thin wrappers
//! around synchronous rusqlite calls executed under a `Mutex`; the
//! store is constructed once at startup and shared by every request.

use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

use chrono::{SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::store::{FileRecord, FileUpdate, MetadataStore, UserRecord, UserUpdate};

/// Current schema version. Bumped when migrations are added.
const SCHEMA_VERSION: i64 = 1;

/// Metadata store backed by a single SQLite database file.
pub struct SqliteMetadataStore {
    /// The database connection, guarded by a mutex for Send + Sync.
    conn: Mutex<Connection>,
}

impl SqliteMetadataStore {
    /// Open (or create) the database at `path` and initialize the schema.
    ///
    /// Passing `":memory:"` creates an in-memory database (useful for tests).
    pub fn new(path: &str) -> anyhow::Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.apply_pragmas()?;
        store.init_db()?;
        Ok(store)
    }

    /// Apply recommended SQLite pragmas for performance and safety.
    fn apply_pragmas(&self) -> anyhow::Result<()> {
        let conn = self.conn.lock().expect("mutex poisoned");
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA busy_timeout = 5000;
            ",
        )?;
        Ok(())
    }

    /// Create the required tables and indexes if they do not already exist.
    /// Idempotent -- safe to call on every startup.
    fn init_db(&self) -> anyhow::Result<()> {
        let conn = self.conn.lock().expect("mutex poisoned");
        conn.execute_batch(
            "
            -- Schema version tracking
            CREATE TABLE IF NOT EXISTS schema_version (
                version    INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );

            -- Accounts
            CREATE TABLE IF NOT EXISTS users (
                user_id            TEXT PRIMARY KEY,
                email              TEXT NOT NULL UNIQUE,
                full_name          TEXT NOT NULL DEFAULT '',
                password_hash      TEXT NOT NULL,
                verified           INTEGER NOT NULL DEFAULT 0,
                ops_user           INTEGER NOT NULL DEFAULT 0,
                verification_token TEXT,
                created_at         TEXT NOT NULL,
                updated_at         TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_users_verification_token
                ON users(verification_token);

            -- Uploaded files
            CREATE TABLE IF NOT EXISTS files (
                file_id      TEXT PRIMARY KEY,
                filename     TEXT NOT NULL,
                content_type TEXT NOT NULL DEFAULT 'application/octet-stream',
                size         INTEGER NOT NULL,
                storage_key  TEXT NOT NULL,
                owner_id     TEXT NOT NULL,
                access_token TEXT,
                created_at   TEXT NOT NULL,
                updated_at   TEXT NOT NULL,

                FOREIGN KEY (owner_id) REFERENCES users(user_id)
            );

            CREATE INDEX IF NOT EXISTS idx_files_owner
                ON files(owner_id);
            CREATE INDEX IF NOT EXISTS idx_files_created_at
                ON files(created_at DESC);
            -- Partial unique index: at most one file per outstanding token.
            CREATE UNIQUE INDEX IF NOT EXISTS idx_files_access_token
                ON files(access_token) WHERE access_token IS NOT NULL;
            ",
        )?;

        // Record schema version if not already present.
        let existing: Option<i64> = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |row| {
                row.get(0)
            })
            .optional()?
            .flatten();

        if existing.is_none() || existing.unwrap() < SCHEMA_VERSION {
            let now = now_rfc3339();
            conn.execute(
                "INSERT OR REPLACE INTO schema_version (version, applied_at) VALUES (?1, ?2)",
                params![SCHEMA_VERSION, now],
            )?;
        }

        Ok(())
    }
}

/// Get current time as an RFC 3339 string with millisecond precision.
fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Read a TEXT column as a [`Uuid`].
fn row_uuid(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let s: String = row.get(idx)?;
    Uuid::parse_str(&s).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// Map a row of the canonical user column order to a [`UserRecord`].
fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRecord> {
    let verified: i32 = row.get(4)?;
    let ops_user: i32 = row.get(5)?;
    Ok(UserRecord {
        user_id: row_uuid(row, 0)?,
        email: row.get(1)?,
        full_name: row.get(2)?,
        password_hash: row.get(3)?,
        verified: verified != 0,
        ops_user: ops_user != 0,
        verification_token: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

/// Map a row of the canonical file column order to a [`FileRecord`].
fn file_from_row(row: &Row<'_>) -> rusqlite::Result<FileRecord> {
    let size: i64 = row.get(3)?;
    Ok(FileRecord {
        file_id: row_uuid(row, 0)?,
        filename: row.get(1)?,
        content_type: row.get(2)?,
        size: size as u64,
        storage_key: row.get(4)?,
        owner_id: row_uuid(row, 5)?,
        access_token: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

const USER_COLUMNS: &str = "user_id, email, full_name, password_hash, verified, ops_user, \
     verification_token, created_at, updated_at";

const FILE_COLUMNS: &str =
    "file_id, filename, content_type, size, storage_key, owner_id, access_token, \
     created_at, updated_at";

// ── MetadataStore implementation ───────────────────────────────────

impl MetadataStore for SqliteMetadataStore {
    // ── Users ───────────────────────────────────────────────────────

    fn create_user(
        &self,
        record: UserRecord,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        Box::pin(async move {
            let conn = self.conn.lock().expect("mutex poisoned");
            conn.execute(
                "INSERT INTO users
                    (user_id, email, full_name, password_hash, verified, ops_user,
                     verification_token, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    record.user_id.to_string(),
                    record.email,
                    record.full_name,
                    record.password_hash,
                    record.verified as i32,
                    record.ops_user as i32,
                    record.verification_token,
                    record.created_at,
                    record.updated_at,
                ],
            )?;
            Ok(())
        })
    }

    fn get_user_by_email(
        &self,
        email: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<UserRecord>>> + Send + '_>> {
        let email = email.to_string();
        Box::pin(async move {
            let conn = self.conn.lock().expect("mutex poisoned");
            let result = conn
                .query_row(
                    &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
                    params![email],
                    user_from_row,
                )
                .optional()?;
            Ok(result)
        })
    }

    fn get_user_by_id(
        &self,
        user_id: Uuid,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<UserRecord>>> + Send + '_>> {
        Box::pin(async move {
            let conn = self.conn.lock().expect("mutex poisoned");
            let result = conn
                .query_row(
                    &format!("SELECT {USER_COLUMNS} FROM users WHERE user_id = ?1"),
                    params![user_id.to_string()],
                    user_from_row,
                )
                .optional()?;
            Ok(result)
        })
    }

    fn verify_user(
        &self,
        verification_token: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<bool>> + Send + '_>> {
        let token = verification_token.to_string();
        Box::pin(async move {
            let conn = self.conn.lock().expect("mutex poisoned");
            // Single atomic UPDATE keyed on the token: the second of two
            // racing redemptions matches zero rows.
            let changed = conn.execute(
                "UPDATE users
                 SET verified = 1, verification_token = NULL, updated_at = ?2
                 WHERE verification_token = ?1",
                params![token, now_rfc3339()],
            )?;
            Ok(changed > 0)
        })
    }

    fn update_user(
        &self,
        user_id: Uuid,
        update: UserUpdate,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<UserRecord>>> + Send + '_>> {
        Box::pin(async move {
            let conn = self.conn.lock().expect("mutex poisoned");
            conn.execute(
                "UPDATE users
                 SET full_name     = COALESCE(?2, full_name),
                     password_hash = COALESCE(?3, password_hash),
                     updated_at    = ?4
                 WHERE user_id = ?1",
                params![
                    user_id.to_string(),
                    update.full_name,
                    update.password_hash,
                    now_rfc3339(),
                ],
            )?;
            let result = conn
                .query_row(
                    &format!("SELECT {USER_COLUMNS} FROM users WHERE user_id = ?1"),
                    params![user_id.to_string()],
                    user_from_row,
                )
                .optional()?;
            Ok(result)
        })
    }

    fn make_ops_user(
        &self,
        email: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<UserRecord>>> + Send + '_>> {
        let email = email.to_string();
        Box::pin(async move {
            let conn = self.conn.lock().expect("mutex poisoned");
            conn.execute(
                "UPDATE users SET ops_user = 1, updated_at = ?2 WHERE email = ?1",
                params![email, now_rfc3339()],
            )?;
            let result = conn
                .query_row(
                    &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
                    params![email],
                    user_from_row,
                )
                .optional()?;
            Ok(result)
        })
    }

    // ── Files ───────────────────────────────────────────────────────

    fn create_file(
        &self,
        record: FileRecord,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        Box::pin(async move {
            let conn = self.conn.lock().expect("mutex poisoned");
            conn.execute(
                "INSERT INTO files
                    (file_id, filename, content_type, size, storage_key, owner_id,
                     access_token, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    record.file_id.to_string(),
                    record.filename,
                    record.content_type,
                    record.size as i64,
                    record.storage_key,
                    record.owner_id.to_string(),
                    record.access_token,
                    record.created_at,
                    record.updated_at,
                ],
            )?;
            Ok(())
        })
    }

    fn get_file_by_id(
        &self,
        file_id: Uuid,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<FileRecord>>> + Send + '_>> {
        Box::pin(async move {
            let conn = self.conn.lock().expect("mutex poisoned");
            let result = conn
                .query_row(
                    &format!("SELECT {FILE_COLUMNS} FROM files WHERE file_id = ?1"),
                    params![file_id.to_string()],
                    file_from_row,
                )
                .optional()?;
            Ok(result)
        })
    }

    fn get_file_by_access_token(
        &self,
        access_token: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<FileRecord>>> + Send + '_>> {
        let access_token = access_token.to_string();
        Box::pin(async move {
            let conn = self.conn.lock().expect("mutex poisoned");
            let result = conn
                .query_row(
                    &format!("SELECT {FILE_COLUMNS} FROM files WHERE access_token = ?1"),
                    params![access_token],
                    file_from_row,
                )
                .optional()?;
            Ok(result)
        })
    }

    fn list_files_by_owner(
        &self,
        owner_id: Uuid,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<FileRecord>>> + Send + '_>> {
        Box::pin(async move {
            let conn = self.conn.lock().expect("mutex poisoned");
            let mut stmt = conn.prepare(&format!(
                "SELECT {FILE_COLUMNS} FROM files
                 WHERE owner_id = ?1
                 ORDER BY created_at DESC, rowid DESC"
            ))?;
            let rows = stmt.query_map(params![owner_id.to_string()], file_from_row)?;
            let mut files = Vec::new();
            for row in rows {
                files.push(row?);
            }
            Ok(files)
        })
    }

    fn update_file(
        &self,
        file_id: Uuid,
        update: FileUpdate,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<FileRecord>>> + Send + '_>> {
        Box::pin(async move {
            let conn = self.conn.lock().expect("mutex poisoned");
            conn.execute(
                "UPDATE files
                 SET access_token = COALESCE(?2, access_token),
                     updated_at   = ?3
                 WHERE file_id = ?1",
                params![file_id.to_string(), update.access_token, now_rfc3339()],
            )?;
            let result = conn
                .query_row(
                    &format!("SELECT {FILE_COLUMNS} FROM files WHERE file_id = ?1"),
                    params![file_id.to_string()],
                    file_from_row,
                )
                .optional()?;
            Ok(result)
        })
    }

    fn delete_file(
        &self,
        file_id: Uuid,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<FileRecord>>> + Send + '_>> {
        Box::pin(async move {
            let conn = self.conn.lock().expect("mutex poisoned");
            let existing = conn
                .query_row(
                    &format!("SELECT {FILE_COLUMNS} FROM files WHERE file_id = ?1"),
                    params![file_id.to_string()],
                    file_from_row,
                )
                .optional()?;
            if existing.is_some() {
                conn.execute(
                    "DELETE FROM files WHERE file_id = ?1",
                    params![file_id.to_string()],
                )?;
            }
            Ok(existing)
        })
    }
}

// -- Tests --------------------------------------------------------------------
