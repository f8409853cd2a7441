//! Backing store connection
//!
//! Thin capability surface over one SQLite connection: typed queries,
//! parameterized writes, atomic statement batches and a spatial-index
//! support flag.

use std::fs::{self, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use rusqlite::{params_from_iter, Connection};

use crate::errors::{GpkgError, GpkgResult};
use crate::value::Value;

use super::cursor::{CursorGuard, PageSpec, PagedCursor, RowCursor, RowSet};

/// Byte offset of the application id in the SQLite file header
pub const HEADER_APPLICATION_ID_OFFSET: u64 = 68;

/// One statement of an atomic batch
#[derive(Debug, Clone, PartialEq)]
pub struct SqlStatement {
    pub sql: String,
    pub params: Vec<Value>,
}

impl SqlStatement {
    /// A statement without parameters
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// A statement with positional parameters
    pub fn with_params(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

/// An open SQLite connection
pub struct Store {
    conn: Connection,
    path: Option<PathBuf>,
}

impl Store {
    /// Opens or creates the database file at `path`
    pub fn open(path: &Path) -> GpkgResult<Self> {
        let conn = Connection::open(path)?;
        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
        })
    }

    /// Opens a transient in-memory database
    pub fn open_in_memory() -> GpkgResult<Self> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
            path: None,
        })
    }

    /// File path, `None` for in-memory stores
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Underlying connection
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Runs a query and materializes every row
    pub fn query(&self, sql: &str, params: &[Value]) -> GpkgResult<RowSet> {
        let mut stmt = self.conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let width = columns.len();

        let mut rows = stmt.query(params_from_iter(params.iter()))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                values.push(Value::from_sql_ref(row.get_ref(i)?)?);
            }
            out.push(values);
        }
        Ok(RowSet::new(columns, out))
    }

    /// Runs a query and wraps the result in a cursor that closes on drop
    pub fn open_cursor(&self, sql: &str, params: &[Value]) -> GpkgResult<CursorGuard<RowCursor>> {
        Ok(CursorGuard::new(self.query(sql, params)?.into_cursor()))
    }

    /// Opens a keyset-paginated cursor
    pub fn open_paged(&self, spec: PageSpec) -> GpkgResult<CursorGuard<PagedCursor<'_>>> {
        Ok(CursorGuard::new(PagedCursor::new(self, spec)?))
    }

    /// First column of the first row as an integer
    pub fn query_i64(&self, sql: &str, params: &[Value]) -> GpkgResult<Option<i64>> {
        let set = self.query(sql, params)?;
        Ok(set.rows().first().and_then(|r| r.first()).and_then(Value::as_i64))
    }

    /// Executes one statement, returns affected rows
    pub fn execute(&self, sql: &str, params: &[Value]) -> GpkgResult<usize> {
        Ok(self.conn.execute(sql, params_from_iter(params.iter()))?)
    }

    /// Executes one insert, returns the new rowid
    pub fn insert(&self, sql: &str, params: &[Value]) -> GpkgResult<i64> {
        self.conn.execute(sql, params_from_iter(params.iter()))?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Executes all statements in one transaction; any failure rolls back
    /// the whole batch.
    pub fn execute_atomic(&self, statements: &[SqlStatement]) -> GpkgResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        for statement in statements {
            tx.execute(&statement.sql, params_from_iter(statement.params.iter()))?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Runs `f` inside a transaction; an error from `f` rolls back.
    pub fn with_transaction<T>(&self, f: impl FnOnce(&Store) -> GpkgResult<T>) -> GpkgResult<T> {
        let tx = self.conn.unchecked_transaction()?;
        let result = f(self)?;
        tx.commit()?;
        Ok(result)
    }

    /// Whether the linked SQLite supports the R-tree module
    pub fn has_spatial_index_support(&self) -> bool {
        self.conn
            .query_row(
                "SELECT sqlite_compileoption_used('ENABLE_RTREE')",
                [],
                |row| row.get::<_, i64>(0),
            )
            .map(|v| v == 1)
            .unwrap_or(false)
    }

    /// Whether a table or view with this name exists
    pub fn table_exists(&self, name: &str) -> GpkgResult<bool> {
        let count = self.query_i64(
            "SELECT COUNT(*) FROM sqlite_master WHERE type IN ('table', 'view') AND name = ?",
            &[Value::from(name)],
        )?;
        Ok(count.unwrap_or(0) > 0)
    }

    /// True when the database has no schema objects at all
    pub fn is_blank(&self) -> GpkgResult<bool> {
        let count = self.query_i64("SELECT COUNT(*) FROM sqlite_master", &[])?;
        Ok(count.unwrap_or(0) == 0)
    }

    pub fn application_id(&self) -> GpkgResult<u32> {
        let id: i64 = self
            .conn
            .query_row("PRAGMA application_id", [], |row| row.get(0))?;
        Ok(id as u32)
    }

    pub fn set_application_id(&self, id: u32) -> GpkgResult<()> {
        self.conn
            .execute_batch(&format!("PRAGMA application_id = {}", id as i32))?;
        Ok(())
    }

    pub fn user_version(&self) -> GpkgResult<i32> {
        Ok(self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))?)
    }

    pub fn set_user_version(&self, version: i32) -> GpkgResult<()> {
        self.conn
            .execute_batch(&format!("PRAGMA user_version = {}", version))?;
        Ok(())
    }

    /// Runs `PRAGMA integrity_check`; returns the reported problems
    pub fn integrity_problems(&self) -> GpkgResult<Vec<String>> {
        let set = self.query("PRAGMA integrity_check", &[])?;
        Ok(set
            .rows()
            .iter()
            .filter_map(|r| r.first().and_then(Value::as_str))
            .filter(|msg| *msg != "ok")
            .map(str::to_string)
            .collect())
    }

    /// Runs `PRAGMA foreign_key_check`; returns the offending table names
    pub fn foreign_key_violations(&self) -> GpkgResult<Vec<String>> {
        let set = self.query("PRAGMA foreign_key_check", &[])?;
        Ok(set
            .rows()
            .iter()
            .filter_map(|r| r.first().and_then(Value::as_str))
            .map(str::to_string)
            .collect())
    }

    /// Closes the connection
    pub fn close(self) -> GpkgResult<()> {
        self.conn.close().map_err(|(_, e)| GpkgError::from(e))
    }
}

/// Writes `id` big-endian into the raw file header.
///
/// Used when the store does not persist the application id setting.
pub fn write_header_application_id(path: &Path, id: u32) -> GpkgResult<()> {
    let mut file = OpenOptions::new().write(true).open(path).map_err(|e| {
        GpkgError::io_error(format!("Failed to open header of {}", path.display()), e)
    })?;
    file.seek(SeekFrom::Start(HEADER_APPLICATION_ID_OFFSET))
        .and_then(|_| file.write_all(&id.to_be_bytes()))
        .and_then(|_| file.sync_all())
        .map_err(|e| {
            GpkgError::io_error(format!("Failed to write header of {}", path.display()), e)
        })
}

/// Reads the big-endian application id from the raw file header.
///
/// Returns `None` when the file is shorter than the header.
pub fn read_header_application_id(path: &Path) -> GpkgResult<Option<u32>> {
    let len = fs::metadata(path)
        .map_err(|e| GpkgError::io_error(format!("Failed to stat {}", path.display()), e))?
        .len();
    if len < HEADER_APPLICATION_ID_OFFSET + 4 {
        return Ok(None);
    }
    let mut file = fs::File::open(path)
        .map_err(|e| GpkgError::io_error(format!("Failed to open {}", path.display()), e))?;
    let mut buf = [0u8; 4];
    file.seek(SeekFrom::Start(HEADER_APPLICATION_ID_OFFSET))
        .and_then(|_| file.read_exact(&mut buf))
        .map_err(|e| GpkgError::io_error(format!("Failed to read header of {}", path.display()), e))?;
    Ok(Some(u32::from_be_bytes(buf)))
}
