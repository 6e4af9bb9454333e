//! SQLite storage backend

use super::traits::{KvBackend, OpenBackend, StorageError, StorageResult};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

/// SQLite-backed key-value store
///
/// A single `kv` table holding JSON text per key. Thread-safe via an
/// internal mutex on the connection. Quota checks and the write happen in
/// one transaction, so a rejected write never disturbs stored data.
pub struct SqliteBackend {
    conn: Mutex<Connection>,
    capacity: u64,
}

impl SqliteBackend {
    fn init_schema(conn: &Connection) -> StorageResult<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            -- Enable WAL mode for concurrent reads during writes
            PRAGMA journal_mode = WAL;
            "#,
        )?;
        Ok(())
    }

    fn used_bytes(conn: &Connection) -> StorageResult<u64> {
        let used: i64 = conn.query_row(
            "SELECT COALESCE(SUM(length(CAST(key AS BLOB)) + length(CAST(value AS BLOB))), 0) FROM kv",
            [],
            |row| row.get(0),
        )?;
        Ok(used as u64)
    }

    /// GLOB pattern matching keys that start with `prefix` (case-sensitive)
    fn prefix_pattern(prefix: &str) -> String {
        let mut pattern = String::with_capacity(prefix.len() + 1);
        for c in prefix.chars() {
            match c {
                '*' | '?' | '[' => {
                    pattern.push('[');
                    pattern.push(c);
                    pattern.push(']');
                }
                _ => pattern.push(c),
            }
        }
        pattern.push('*');
        pattern
    }
}

impl OpenBackend for SqliteBackend {
    fn open(path: impl AsRef<Path>, capacity: u64) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            capacity,
        })
    }

    fn open_in_memory(capacity: u64) -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            capacity,
        })
    }
}

impl KvBackend for SqliteBackend {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let conn = self.conn.lock().unwrap();
        let value = conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let used = Self::used_bytes(&tx)?;
        let existing: i64 = tx
            .query_row(
                "SELECT length(CAST(key AS BLOB)) + length(CAST(value AS BLOB)) FROM kv WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?
            .unwrap_or(0);
        let needed = (key.len() + value.len()) as u64;
        let available = self.capacity.saturating_sub(used.saturating_sub(existing as u64));
        if needed > available {
            // dropping `tx` rolls back
            return Err(StorageError::QuotaExceeded { needed, available });
        }

        tx.execute(
            r#"
            INSERT INTO kv (key, value) VALUES (?1, ?2)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
            params![key, value],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<bool> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(rows > 0)
    }

    fn keys_with_prefix(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT key FROM kv WHERE key GLOB ?1 ORDER BY key")?;
        let pattern = Self::prefix_pattern(prefix);
        let keys = stmt
            .query_map(params![pattern], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(keys)
    }

    fn remove_prefix(&self, prefix: &str) -> StorageResult<usize> {
        let conn = self.conn.lock().unwrap();
        let pattern = Self::prefix_pattern(prefix);
        let rows = conn.execute("DELETE FROM kv WHERE key GLOB ?1", params![pattern])?;
        Ok(rows)
    }

    fn bytes_in_use(&self) -> StorageResult<u64> {
        let conn = self.conn.lock().unwrap();
        Self::used_bytes(&conn)
    }

    fn capacity(&self) -> u64 {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::DEFAULT_CAPACITY_BYTES;

    fn create_test_backend() -> SqliteBackend {
        SqliteBackend::open_in_memory(DEFAULT_CAPACITY_BYTES).unwrap()
    }

    #[test]
    fn upsert_and_read() {
        let backend = create_test_backend();
        backend.set("annotations:https://a/", "[1]").unwrap();
        backend.set("annotations:https://a/", "[1,2]").unwrap();
        assert_eq!(backend.get("annotations:https://a/").unwrap().as_deref(), Some("[1,2]"));
        assert_eq!(backend.get("missing").unwrap(), None);
    }

    #[test]
    fn prefix_queries_escape_wildcards() {
        let backend = create_test_backend();
        backend.set("a?b:1", "x").unwrap();
        backend.set("axb:1", "x").unwrap();
        backend.set("A?b:1", "x").unwrap();
        assert_eq!(backend.keys_with_prefix("a?b:").unwrap(), vec!["a?b:1".to_string()]);
        assert_eq!(backend.remove_prefix("a?b:").unwrap(), 1);
        assert_eq!(
            backend.keys_with_prefix("").unwrap(),
            vec!["A?b:1".to_string(), "axb:1".to_string()]
        );
    }

    #[test]
    fn quota_rejection_leaves_data_intact() {
        let backend = SqliteBackend::open_in_memory(64).unwrap();
        backend.set("drawings:u", "first").unwrap();
        let err = backend.set("drawings:u", &"y".repeat(100)).unwrap_err();
        assert!(matches!(err, StorageError::QuotaExceeded { .. }));
        assert_eq!(backend.get("drawings:u").unwrap().as_deref(), Some("first"));
        assert_eq!(backend.bytes_in_use().unwrap(), ("drawings:u".len() + 5) as u64);
    }

    #[test]
    fn bytes_count_utf8_not_chars() {
        let backend = create_test_backend();
        backend.set("k", "é").unwrap();
        assert_eq!(backend.bytes_in_use().unwrap(), 3);
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("pagenote.db");
        {
            let backend = SqliteBackend::open(&path, DEFAULT_CAPACITY_BYTES).unwrap();
            backend.set("k", "v").unwrap();
        }
        let backend = SqliteBackend::open(&path, DEFAULT_CAPACITY_BYTES).unwrap();
        assert_eq!(backend.get("k").unwrap().as_deref(), Some("v"));
    }
}
