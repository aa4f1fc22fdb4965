//! Minimal storage capability and its SQLite implementation.
//!
//! All SQL text and parameter binding is owned by the callers ([`crate::buffer`]
//! and [`crate::TableFs`]); the store only runs statements. Row streaming is a
//! visitor callback so the cursor's lifetime is the `query` call itself:
//! stopping early or erroring always closes it.

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::types::{ToSqlOutput, Value, ValueRef};
use rusqlite::{Connection, ToSql};

use crate::error::StoreError;

/// Owned SQL parameter / result value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl SqlValue {
    /// Text value from anything string-like.
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    /// Blob value from a byte vector.
    pub fn blob(b: impl Into<Vec<u8>>) -> Self {
        Self::Blob(b.into())
    }

    /// Integer value.
    pub fn int(i: i64) -> Self {
        Self::Integer(i)
    }

    /// Decode as a boolean (stored as an integer).
    pub fn as_bool(&self) -> Result<bool, StoreError> {
        match self {
            Self::Integer(i) => Ok(*i != 0),
            other => Err(StoreError::Decode(format!("expected bool, got {other:?}"))),
        }
    }

    /// Decode as an integer.
    pub fn as_i64(&self) -> Result<i64, StoreError> {
        match self {
            Self::Integer(i) => Ok(*i),
            other => Err(StoreError::Decode(format!("expected integer, got {other:?}"))),
        }
    }

    /// Decode as text.
    pub fn as_str(&self) -> Result<&str, StoreError> {
        match self {
            Self::Text(s) => Ok(s),
            other => Err(StoreError::Decode(format!("expected text, got {other:?}"))),
        }
    }

    /// Decode as a byte payload. NULL decodes as empty, matching the
    /// nullable `contents` column on directory rows.
    pub fn as_blob(&self) -> Result<&[u8], StoreError> {
        match self {
            Self::Blob(b) => Ok(b),
            Self::Null => Ok(&[]),
            other => Err(StoreError::Decode(format!("expected blob, got {other:?}"))),
        }
    }
}

impl From<ValueRef<'_>> for SqlValue {
    fn from(v: ValueRef<'_>) -> Self {
        match v {
            ValueRef::Null => Self::Null,
            ValueRef::Integer(i) => Self::Integer(i),
            ValueRef::Real(f) => Self::Real(f),
            ValueRef::Text(t) => Self::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => Self::Blob(b.to_vec()),
        }
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Self::Null => ToSqlOutput::Owned(Value::Null),
            Self::Integer(i) => ToSqlOutput::Owned(Value::Integer(*i)),
            Self::Real(f) => ToSqlOutput::Owned(Value::Real(*f)),
            Self::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Self::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
        })
    }
}

/// Row visitor. Return `Ok(true)` to keep scanning, `Ok(false)` to stop
/// early; either way the underlying cursor is closed when `query` returns.
pub type RowVisitor<'a> = &'a mut dyn FnMut(&[SqlValue]) -> Result<bool, StoreError>;

/// Minimal query/execute capability against the backing table.
pub trait Store: Send + Sync {
    /// Run a statement and stream its rows through `on_row`.
    fn query(&self, sql: &str, params: &[SqlValue], on_row: RowVisitor<'_>)
        -> Result<(), StoreError>;

    /// Run a mutating statement; returns the number of affected rows.
    fn exec(&self, sql: &str, params: &[SqlValue]) -> Result<usize, StoreError>;
}

/// SQLite-backed [`Store`].
///
/// The connection is guarded by a mutex; statements are serialized, which
/// matches the single-logical-owner contract of the filesystem layer.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Create the backing table if it does not exist.
    ///
    /// The unique key on `(container, path, part)` is what makes directory
    /// marker rows an idempotent upsert.
    pub fn init_schema(&self, table: &str) -> Result<(), StoreError> {
        let schema = format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                container TEXT NOT NULL,
                path TEXT NOT NULL,
                part INTEGER NOT NULL,
                dir TEXT NOT NULL,
                name TEXT NOT NULL,
                is_dir INTEGER NOT NULL,
                contents BLOB,
                PRIMARY KEY (container, path, part)
            );
            CREATE INDEX IF NOT EXISTS idx_{table}_dir ON {table} (container, dir);"
        );
        self.conn.lock().execute_batch(&schema)?;
        Ok(())
    }
}

impl Store for SqliteStore {
    fn query(
        &self,
        sql: &str,
        params: &[SqlValue],
        on_row: RowVisitor<'_>,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql)?;
        let columns = stmt.column_count();
        let mut rows = stmt.query(rusqlite::params_from_iter(params))?;
        while let Some(row) = rows.next()? {
            let mut decoded = Vec::with_capacity(columns);
            for i in 0..columns {
                decoded.push(SqlValue::from(row.get_ref(i)?));
            }
            if !on_row(&decoded)? {
                break;
            }
        }
        Ok(())
    }

    fn exec(&self, sql: &str, params: &[SqlValue]) -> Result<usize, StoreError> {
        let conn = self.conn.lock();
        let affected = conn.execute(sql, rusqlite::params_from_iter(params))?;
        Ok(affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SqliteStore {
        let store = SqliteStore::in_memory().unwrap();
        store.init_schema("files").unwrap();
        store
    }

    #[test]
    fn exec_and_query_roundtrip() {
        let store = store();
        let inserted = store
            .exec(
                "INSERT INTO files (container, path, part, dir, name, is_dir, contents)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)",
                &[
                    SqlValue::text("c1"),
                    SqlValue::text("a/b"),
                    SqlValue::int(0),
                    SqlValue::text("a"),
                    SqlValue::text("b"),
                    SqlValue::blob(b"hello".to_vec()),
                ],
            )
            .unwrap();
        assert_eq!(inserted, 1);

        let mut seen = Vec::new();
        store
            .query(
                "SELECT path, contents FROM files WHERE container = ?1",
                &[SqlValue::text("c1")],
                &mut |row| {
                    seen.push((row[0].as_str()?.to_string(), row[1].as_blob()?.to_vec()));
                    Ok(true)
                },
            )
            .unwrap();
        assert_eq!(seen, vec![("a/b".to_string(), b"hello".to_vec())]);
    }

    #[test]
    fn visitor_stops_scan_early() {
        let store = store();
        for i in 0..5 {
            store
                .exec(
                    "INSERT INTO files (container, path, part, dir, name, is_dir)
                     VALUES (?1, ?2, ?3, '', ?2, 1)",
                    &[
                        SqlValue::text("c1"),
                        SqlValue::text(format!("d{i}")),
                        SqlValue::int(i),
                    ],
                )
                .unwrap();
        }

        let mut count = 0;
        store
            .query(
                "SELECT path FROM files WHERE container = ?1 ORDER BY path",
                &[SqlValue::text("c1")],
                &mut |_row| {
                    count += 1;
                    Ok(count < 2)
                },
            )
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn upsert_on_conflict_is_idempotent() {
        let store = store();
        for _ in 0..2 {
            store
                .exec(
                    "INSERT INTO files (container, path, part, dir, name, is_dir)
                     VALUES (?1, 'a', 0, '', 'a', 1)
                     ON CONFLICT (container, path, part) DO NOTHING",
                    &[SqlValue::text("c1")],
                )
                .unwrap();
        }

        let mut rows = 0;
        store
            .query("SELECT 1 FROM files", &[], &mut |_row| {
                rows += 1;
                Ok(true)
            })
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn null_contents_decode_as_empty() {
        assert_eq!(SqlValue::Null.as_blob().unwrap(), b"");
        assert!(SqlValue::text("x").as_blob().is_err());
        assert!(SqlValue::Integer(1).as_bool().unwrap());
    }
}
