//! SQLite-backed record store.

use std::fs;
use std::path::Path;
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension};

use super::entry::{is_valid_digest, parts_to_system_time, system_time_to_parts, CacheRecord};
use super::store::{CacheError, CacheResult, RecordStore};

/// Current on-disk schema version, stored in `PRAGMA user_version`.
pub const SCHEMA_VERSION: i64 = 1;

const CREATE_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS fingerprints (
        path        TEXT PRIMARY KEY NOT NULL,
        size        INTEGER NOT NULL,
        mtime_secs  INTEGER NOT NULL,
        mtime_nanos INTEGER NOT NULL,
        digest      TEXT NOT NULL
    );
";

/// Persistent record store using a single SQLite connection.
///
/// The connection is not shared between threads; [`super::FingerprintCache`]
/// owns the store behind a mutex.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
}

/// A row as read from the table, before validation.
struct RawRow {
    path: String,
    size: i64,
    mtime_secs: i64,
    mtime_nanos: i64,
    digest: String,
}

impl RawRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            path: row.get(0)?,
            size: row.get(1)?,
            mtime_secs: row.get(2)?,
            mtime_nanos: row.get(3)?,
            digest: row.get(4)?,
        })
    }

    fn into_record(self) -> CacheResult<CacheRecord> {
        let size = u64::try_from(self.size)
            .map_err(|_| CacheError::corrupt(&self.path, format!("negative size {}", self.size)))?;
        let nanos = u32::try_from(self.mtime_nanos).map_err(|_| {
            CacheError::corrupt(&self.path, format!("invalid nanos {}", self.mtime_nanos))
        })?;
        let mtime = parts_to_system_time(self.mtime_secs, nanos).ok_or_else(|| {
            CacheError::corrupt(
                &self.path,
                format!("invalid mtime {}.{}", self.mtime_secs, self.mtime_nanos),
            )
        })?;
        if !is_valid_digest(&self.digest) {
            return Err(CacheError::corrupt(&self.path, "malformed digest"));
        }
        Ok(CacheRecord::new(self.path.into(), size, mtime, self.digest))
    }
}

/// Whether a rusqlite error means the row itself is malformed.
fn is_decode_error(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::InvalidColumnType(..)
            | rusqlite::Error::FromSqlConversionFailure(..)
            | rusqlite::Error::IntegralValueOutOfRange(..)
    )
}

impl SqliteStore {
    /// Open or create a store at the given path.
    ///
    /// # Errors
    ///
    /// Fails if the parent directory cannot be created, the file is not an
    /// SQLite database, or the schema cannot be initialized.
    pub fn open(path: &Path) -> CacheResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| {
                    CacheError::io(format!("cannot create {}: {}", parent.display(), e))
                })?;
            }
        }

        let conn = Connection::open(path)?;
        log::debug!("Opened fingerprint database at {}", path.display());
        Self::init(conn, true)
    }

    /// Open a private in-memory database.
    ///
    /// # Errors
    ///
    /// Fails if SQLite cannot allocate the database.
    pub fn open_in_memory() -> CacheResult<Self> {
        Self::init(Connection::open_in_memory()?, false)
    }

    fn init(conn: Connection, wal: bool) -> CacheResult<Self> {
        conn.busy_timeout(Duration::from_secs(5))?;

        // First real statement: fails here if the file is not a database.
        let version: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
        if version > SCHEMA_VERSION {
            return Err(CacheError::io(format!(
                "unsupported cache schema version {version} (expected {SCHEMA_VERSION})"
            )));
        }

        if wal {
            let mode: String =
                conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
            log::trace!("Fingerprint database journal mode: {}", mode);
        }

        conn.execute_batch(CREATE_SCHEMA)?;
        if version < SCHEMA_VERSION {
            conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        }

        Ok(Self { conn })
    }
}

impl RecordStore for SqliteStore {
    fn get(&mut self, key: &str) -> CacheResult<Option<CacheRecord>> {
        let raw = self
            .conn
            .query_row(
                "SELECT path, size, mtime_secs, mtime_nanos, digest FROM fingerprints WHERE path = ?1",
                params![key],
                RawRow::from_row,
            )
            .optional();

        match raw {
            Ok(Some(raw)) => raw.into_record().map(Some),
            Ok(None) => Ok(None),
            Err(e) if is_decode_error(&e) => Err(CacheError::corrupt(key, e.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    fn put(&mut self, key: &str, record: &CacheRecord) -> CacheResult<()> {
        let size = i64::try_from(record.size)
            .map_err(|_| CacheError::corrupt(key, "size exceeds storage range"))?;
        let (secs, nanos) = system_time_to_parts(record.mtime);

        self.conn.execute(
            "INSERT INTO fingerprints (path, size, mtime_secs, mtime_nanos, digest)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(path) DO UPDATE SET
                size = excluded.size,
                mtime_secs = excluded.mtime_secs,
                mtime_nanos = excluded.mtime_nanos,
                digest = excluded.digest",
            params![key, size, secs, i64::from(nanos), record.digest],
        )?;
        Ok(())
    }

    fn delete(&mut self, key: &str) -> CacheResult<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM fingerprints WHERE path = ?1", params![key])?;
        Ok(removed > 0)
    }

    fn scan_all(&mut self, visit: &mut dyn FnMut(CacheRecord) -> bool) -> CacheResult<()> {
        let mut stmt = self.conn.prepare(
            "SELECT path, size, mtime_secs, mtime_nanos, digest FROM fingerprints ORDER BY path",
        )?;
        let mut rows = stmt.query([])?;

        while let Some(row) = rows.next()? {
            let record = match RawRow::from_row(row) {
                Ok(raw) => raw.into_record(),
                Err(e) if is_decode_error(&e) => Err(CacheError::corrupt("<row>", e.to_string())),
                Err(e) => return Err(e.into()),
            };

            match record {
                Ok(record) => {
                    if !visit(record) {
                        break;
                    }
                }
                Err(e) => log::warn!("Skipping unreadable cache row: {}", e),
            }
        }
        Ok(())
    }

    fn purge_corrupt(&mut self) -> CacheResult<usize> {
        let mut corrupt: Vec<i64> = Vec::new();
        {
            let mut stmt = self.conn.prepare(
                "SELECT path, size, mtime_secs, mtime_nanos, digest, rowid FROM fingerprints",
            )?;
            let mut rows = stmt.query([])?;
            while let Some(row) = rows.next()? {
                let valid = match RawRow::from_row(row) {
                    Ok(raw) => raw.into_record().is_ok(),
                    Err(e) if is_decode_error(&e) => false,
                    Err(e) => return Err(e.into()),
                };
                if !valid {
                    corrupt.push(row.get(5)?);
                }
            }
        }

        let mut removed = 0;
        for rowid in corrupt {
            removed += self
                .conn
                .execute("DELETE FROM fingerprints WHERE rowid = ?1", params![rowid])?;
        }
        Ok(removed)
    }

    fn clear(&mut self) -> CacheResult<()> {
        self.conn.execute("DELETE FROM fingerprints", [])?;
        Ok(())
    }

    fn count(&mut self) -> CacheResult<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM fingerprints", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}
