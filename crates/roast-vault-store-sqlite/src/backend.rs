use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

const LATEST_SCHEMA_VERSION: i64 = 1;

const CREATE_SCHEMA_MIGRATIONS_SQL: &str = r"
CREATE TABLE IF NOT EXISTS schema_migrations (
  version INTEGER PRIMARY KEY,
  applied_at TEXT NOT NULL
);
";

const MIGRATION_001_SQL: &str = r"
CREATE TABLE IF NOT EXISTS kv_entries (
  key TEXT PRIMARY KEY,
  value BLOB NOT NULL,
  updated_at TEXT NOT NULL
);
";

/// Durable byte-blob storage addressed by key.
pub trait KeyValueBackend: Send + Sync {
    /// # Errors
    /// Returns an error when the underlying storage cannot be read.
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// # Errors
    /// Returns an error when the value cannot be written.
    fn write(&self, key: &str, value: &[u8]) -> Result<()>;

    /// # Errors
    /// Returns an error when the key cannot be removed.
    fn remove(&self, key: &str) -> Result<()>;

    /// Write several entries so that either all or none become durable.
    ///
    /// # Errors
    /// Returns an error when any entry cannot be written.
    fn write_batch(&self, entries: &[(&str, Vec<u8>)]) -> Result<()> {
        for (key, value) in entries {
            self.write(key, value)?;
        }
        Ok(())
    }

    /// # Errors
    /// Returns an error when the health probe itself cannot run.
    fn quick_check(&self) -> Result<bool> {
        Ok(true)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchemaStatus {
    pub current_version: i64,
    pub target_version: i64,
    pub pending_versions: Vec<i64>,
}

pub struct SqliteBackend {
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    /// Open a SQLite key-value file and configure required runtime pragmas.
    ///
    /// # Errors
    /// Returns an error when the database cannot be opened or pragmas cannot be applied.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open sqlite database at {}", path.display()))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;",
        )
        .context("failed to configure sqlite pragmas")?;

        Ok(Self { conn: Mutex::new(conn) })
    }

    /// # Errors
    /// Returns an error when schema metadata cannot be read or initialized.
    pub fn schema_status(&self) -> Result<SchemaStatus> {
        let conn = self.conn.lock();
        conn.execute_batch(CREATE_SCHEMA_MIGRATIONS_SQL)
            .context("failed to apply schema_migrations table")?;
        let current_version = current_schema_version(&conn)?;
        let pending_versions = if current_version < LATEST_SCHEMA_VERSION {
            ((current_version + 1)..=LATEST_SCHEMA_VERSION).collect()
        } else {
            Vec::new()
        };
        Ok(SchemaStatus { current_version, target_version: LATEST_SCHEMA_VERSION, pending_versions })
    }

    /// Apply all forward migrations up to the latest supported schema version.
    ///
    /// # Errors
    /// Returns an error when a migration fails or the file is from a newer build.
    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute_batch(CREATE_SCHEMA_MIGRATIONS_SQL)
            .context("failed to apply schema_migrations table")?;

        let version = current_schema_version(&conn)?;
        if version > LATEST_SCHEMA_VERSION {
            return Err(anyhow!(
                "unsupported schema version {version}; expected at most {LATEST_SCHEMA_VERSION}"
            ));
        }

        if version < 1 {
            conn.execute_batch(MIGRATION_001_SQL).context("failed to apply migration 1")?;
            record_schema_version(&conn, 1)?;
        }

        Ok(())
    }

    /// Keys currently stored, in sorted order.
    ///
    /// # Errors
    /// Returns an error when the key listing query fails.
    pub fn keys(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT key FROM kv_entries ORDER BY key")
            .context("failed to prepare key listing")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut keys = Vec::new();
        for row in rows {
            keys.push(row?);
        }
        Ok(keys)
    }
}

impl KeyValueBackend for SqliteBackend {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let conn = self.conn.lock();
        conn.query_row("SELECT value FROM kv_entries WHERE key = ?1", params![key], |row| {
            row.get::<_, Vec<u8>>(0)
        })
        .optional()
        .with_context(|| format!("failed to read key {key}"))
    }

    fn write(&self, key: &str, value: &[u8]) -> Result<()> {
        self.write_batch(&[(key, value.to_vec())])
    }

    fn remove(&self, key: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM kv_entries WHERE key = ?1", params![key])
            .with_context(|| format!("failed to delete key {key}"))?;
        Ok(())
    }

    fn write_batch(&self, entries: &[(&str, Vec<u8>)]) -> Result<()> {
        let now = now_rfc3339()?;
        let mut conn = self.conn.lock();
        let tx = conn.transaction().context("failed to begin write transaction")?;
        for (key, value) in entries {
            tx.execute(
                "INSERT INTO kv_entries(key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![key, value, now],
            )
            .with_context(|| format!("failed to write key {key}"))?;
        }
        tx.commit().context("failed to commit write transaction")
    }

    fn quick_check(&self) -> Result<bool> {
        let conn = self.conn.lock();
        let message: String = conn
            .query_row("PRAGMA quick_check", [], |row| row.get::<_, String>(0))
            .context("failed to run PRAGMA quick_check")?;
        Ok(message == "ok")
    }
}

/// Process-local backend for tests and ephemeral stores.
#[derive(Default)]
pub struct MemoryBackend {
    entries: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl KeyValueBackend for MemoryBackend {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn write(&self, key: &str, value: &[u8]) -> Result<()> {
        self.entries.lock().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

fn current_schema_version(conn: &Connection) -> Result<i64> {
    conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_migrations", [], |row| {
        row.get::<_, i64>(0)
    })
    .context("failed to read current schema version")
}

fn record_schema_version(conn: &Connection, version: i64) -> Result<()> {
    let now = now_rfc3339()?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_migrations(version, applied_at) VALUES (?1, ?2)",
        params![version, now],
    )
    .with_context(|| format!("failed to record migration version {version}"))?;
    Ok(())
}

fn now_rfc3339() -> Result<String> {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .context("failed to format RFC3339 timestamp")
}

#[cfg(test)]
mod tests {
    use super::*;

    // Test IDs: TKV-001
    #[test]
    fn sqlite_backend_round_trips_and_overwrites() -> Result<()> {
        let backend = SqliteBackend::open(Path::new(":memory:"))?;
        backend.migrate()?;

        assert_eq!(backend.read("missing")?, None);
        backend.write("a", b"one")?;
        backend.write("a", b"two")?;
        backend.write_batch(&[("b", b"three".to_vec()), ("c", b"four".to_vec())])?;
        assert_eq!(backend.read("a")?, Some(b"two".to_vec()));
        assert_eq!(backend.keys()?, vec!["a", "b", "c"]);

        backend.remove("b")?;
        assert_eq!(backend.read("b")?, None);
        assert!(backend.quick_check()?);
        Ok(())
    }

    // Test IDs: TKV-002
    #[test]
    fn migrate_is_idempotent_and_reports_status() -> Result<()> {
        let backend = SqliteBackend::open(Path::new(":memory:"))?;
        let before = backend.schema_status()?;
        assert_eq!(before.pending_versions, vec![1]);

        backend.migrate()?;
        backend.migrate()?;
        let after = backend.schema_status()?;
        assert_eq!(after.current_version, LATEST_SCHEMA_VERSION);
        assert!(after.pending_versions.is_empty());
        Ok(())
    }

    // Test IDs: TKV-003
    #[test]
    fn values_survive_reopen() -> Result<()> {
        let dir = unique_temp_dir()?;
        let path = dir.join("kv.sqlite3");
        {
            let backend = SqliteBackend::open(&path)?;
            backend.migrate()?;
            backend.write("streak_data", br#"{"currentStreak":2}"#)?;
        }
        let reopened = SqliteBackend::open(&path)?;
        reopened.migrate()?;
        assert_eq!(reopened.read("streak_data")?, Some(br#"{"currentStreak":2}"#.to_vec()));
        drop(reopened);
        std::fs::remove_dir_all(&dir)
            .with_context(|| format!("failed to cleanup temp dir {}", dir.display()))?;
        Ok(())
    }

    fn unique_temp_dir() -> Result<std::path::PathBuf> {
        let dir = std::env::temp_dir().join(format!("roastvault-kv-{}", ulid::Ulid::new()));
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create temp dir {}", dir.display()))?;
        Ok(dir)
    }
}
