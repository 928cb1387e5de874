//! rusqlite-backed implementation of the storage driver contract.

use std::path::Path;

use rusqlite::types::{ToSqlOutput, Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection, ErrorCode, OptionalExtension, ToSql};

use crate::driver::{ColumnInfo, StorageDriver};
use crate::error::{OrmError, Result};
use crate::value::Value;

/// Storage driver over a single SQLite connection.
///
/// The connection is owned by the driver and closed when the driver is
/// dropped, on every exit path. One driver means one session; callers
/// needing concurrency put their own pooling in front.
pub struct SqliteDriver {
    conn: Connection,
}

impl SqliteDriver {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(map_sqlite_err)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(map_sqlite_err)?;
        Ok(Self { conn })
    }
}

impl StorageDriver for SqliteDriver {
    fn table_exists(&self, table: &str) -> Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [table],
                |row| row.get(0),
            )
            .optional()
            .map_err(map_sqlite_err)?;
        Ok(found.is_some())
    }

    fn table_columns(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        // PRAGMA takes no bound parameters; table names only reach this
        // point after the registry's identifier vet.
        let mut stmt = self
            .conn
            .prepare(&format!("PRAGMA table_info({table})"))
            .map_err(map_sqlite_err)?;
        let columns = stmt
            .query_map([], |row| {
                Ok(ColumnInfo {
                    name: row.get(1)?,
                    declared_type: row.get(2)?,
                    not_null: row.get::<_, i64>(3)? != 0,
                    primary_key: row.get::<_, i64>(5)? != 0,
                })
            })
            .map_err(map_sqlite_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(map_sqlite_err)?;
        Ok(columns)
    }

    fn execute(&self, sql: &str, params: &[Value]) -> Result<usize> {
        self.conn
            .execute(sql, params_from_iter(params.iter()))
            .map_err(map_sqlite_err)
    }

    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Vec<Value>>> {
        let mut stmt = self.conn.prepare(sql).map_err(map_sqlite_err)?;
        let column_count = stmt.column_count();
        let mut rows = stmt
            .query(params_from_iter(params.iter()))
            .map_err(map_sqlite_err)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(map_sqlite_err)? {
            let mut cells = Vec::with_capacity(column_count);
            for i in 0..column_count {
                let raw: SqlValue = row.get(i).map_err(map_sqlite_err)?;
                cells.push(from_sql_value(raw)?);
            }
            out.push(cells);
        }
        Ok(out)
    }

    /// Rowid of the most recent successful INSERT on this connection.
    /// Only meaningful when called directly after an insert; zero is a
    /// legitimate, explicitly written rowid and is reported as such.
    fn generated_key(&self) -> Result<Option<i64>> {
        Ok(Some(self.conn.last_insert_rowid()))
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(SqlValue::Null),
            Value::Integer(i) => ToSqlOutput::Owned(SqlValue::Integer(*i)),
            Value::Real(f) => ToSqlOutput::Owned(SqlValue::Real(*f)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            // Booleans ride on 0/1, datetimes on ISO-8601 text.
            Value::Boolean(b) => ToSqlOutput::Owned(SqlValue::Integer(i64::from(*b))),
            Value::DateTime(dt) => ToSqlOutput::Owned(SqlValue::Text(
                dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string(),
            )),
        })
    }
}

fn from_sql_value(raw: SqlValue) -> Result<Value> {
    match raw {
        SqlValue::Null => Ok(Value::Null),
        SqlValue::Integer(i) => Ok(Value::Integer(i)),
        SqlValue::Real(f) => Ok(Value::Real(f)),
        SqlValue::Text(s) => Ok(Value::Text(s)),
        SqlValue::Blob(_) => Err(OrmError::StorageUnavailable(
            "BLOB columns have no mapped storage type".to_string(),
        )),
    }
}

fn map_sqlite_err(err: rusqlite::Error) -> OrmError {
    if let rusqlite::Error::SqliteFailure(e, _) = &err {
        if e.code == ErrorCode::ConstraintViolation {
            return OrmError::ConstraintViolation(err.to_string());
        }
    }
    OrmError::StorageUnavailable(err.to_string())
}
