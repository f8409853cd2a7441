//! Row sets and cursors
//!
//! Result sets are materialized into owned `Value`s so nothing borrows the
//! native SQLite statement. `PagedCursor` walks a table with keyset
//! pagination (`key > last ORDER BY key LIMIT n`) and holds nothing between
//! pages.

use std::ops::{Deref, DerefMut};

use crate::errors::{GpkgError, GpkgResult};
use crate::value::Value;

use super::connection::Store;

/// Forward-only access to rows
pub trait Cursor {
    /// Moves to the next row; `Ok(false)` when exhausted or closed
    fn advance(&mut self) -> GpkgResult<bool>;

    /// Value at column `index` of the current row
    fn get(&self, index: usize) -> Option<&Value>;

    /// Value of the named column of the current row
    fn get_by_name(&self, name: &str) -> Option<&Value>;

    /// Column names of the result
    fn columns(&self) -> &[String];

    /// Releases the cursor; later calls to `advance` return false
    fn close(&mut self);
}

/// Owned query result
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl RowSet {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Case-insensitive column lookup
    pub fn column_index(&self, name: &str) -> Option<usize> {
        column_index(&self.columns, name)
    }

    /// Value of `column` in row `row`
    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    /// Borrowed views of every row
    pub fn iter(&self) -> impl Iterator<Item = RowView<'_>> {
        self.rows.iter().map(move |values| RowView {
            columns: &self.columns,
            values,
        })
    }

    pub fn first(&self) -> Option<RowView<'_>> {
        self.iter().next()
    }

    pub fn into_rows(self) -> Vec<Vec<Value>> {
        self.rows
    }

    pub fn into_cursor(self) -> RowCursor {
        RowCursor {
            set: self,
            position: None,
            closed: false,
        }
    }
}

fn column_index(columns: &[String], name: &str) -> Option<usize> {
    columns.iter().position(|c| c.eq_ignore_ascii_case(name))
}

/// One row of a `RowSet`, addressable by column name
#[derive(Debug, Clone, Copy)]
pub struct RowView<'a> {
    columns: &'a [String],
    values: &'a [Value],
}

impl<'a> RowView<'a> {
    pub fn get(&self, name: &str) -> Option<&'a Value> {
        column_index(self.columns, name).and_then(|i| self.values.get(i))
    }

    pub fn values(&self) -> &'a [Value] {
        self.values
    }

    /// Non-null text; numbers are rendered
    pub fn text(&self, name: &str) -> Option<String> {
        match self.get(name)? {
            Value::Null => None,
            Value::Text(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    pub fn i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_i64)
    }

    pub fn f64(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(Value::as_f64)
    }
}

/// Cursor over a materialized `RowSet`
#[derive(Debug)]
pub struct RowCursor {
    set: RowSet,
    position: Option<usize>,
    closed: bool,
}

impl RowCursor {
    fn current(&self) -> Option<&Vec<Value>> {
        if self.closed {
            return None;
        }
        self.position.and_then(|p| self.set.rows.get(p))
    }
}

impl Cursor for RowCursor {
    fn advance(&mut self) -> GpkgResult<bool> {
        if self.closed {
            return Ok(false);
        }
        let next = self.position.map_or(0, |p| p + 1);
        self.position = Some(next);
        Ok(next < self.set.rows.len())
    }

    fn get(&self, index: usize) -> Option<&Value> {
        self.current().and_then(|r| r.get(index))
    }

    fn get_by_name(&self, name: &str) -> Option<&Value> {
        let idx = self.set.column_index(name)?;
        self.get(idx)
    }

    fn columns(&self) -> &[String] {
        &self.set.columns
    }

    fn close(&mut self) {
        self.closed = true;
        self.set.rows.clear();
    }
}

/// Closes the wrapped cursor on every exit path
pub struct CursorGuard<C: Cursor> {
    cursor: C,
}

impl<C: Cursor> CursorGuard<C> {
    pub fn new(cursor: C) -> Self {
        Self { cursor }
    }
}

impl<C: Cursor> Deref for CursorGuard<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.cursor
    }
}

impl<C: Cursor> DerefMut for CursorGuard<C> {
    fn deref_mut(&mut self) -> &mut C {
        &mut self.cursor
    }
}

impl<C: Cursor> Drop for CursorGuard<C> {
    fn drop(&mut self) {
        self.cursor.close();
    }
}

/// What a `PagedCursor` walks
#[derive(Debug, Clone)]
pub struct PageSpec {
    /// Table name (unquoted)
    pub table: String,
    /// Integer key column used for ordering and the `>` bound
    pub key: String,
    /// Select list, e.g. `*` or `"fid", "geom"`. Must yield the key column.
    pub columns: String,
    /// Optional extra predicate, ANDed with the key bound
    pub predicate: Option<String>,
    /// Parameters of `predicate`
    pub params: Vec<Value>,
    /// Rows per page
    pub page_size: usize,
    /// Stop after this many rows when the total is known up front
    pub expected_rows: Option<usize>,
}

impl PageSpec {
    pub fn new(table: impl Into<String>, key: impl Into<String>, page_size: usize) -> Self {
        Self {
            table: table.into(),
            key: key.into(),
            columns: "*".to_string(),
            predicate: None,
            params: Vec::new(),
            page_size,
            expected_rows: None,
        }
    }

    pub fn columns(mut self, columns: impl Into<String>) -> Self {
        self.columns = columns.into();
        self
    }

    pub fn predicate(mut self, predicate: impl Into<String>, params: Vec<Value>) -> Self {
        self.predicate = Some(predicate.into());
        self.params = params;
        self
    }

    pub fn expected_rows(mut self, rows: usize) -> Self {
        self.expected_rows = Some(rows);
        self
    }

    fn page_sql(&self) -> String {
        let key = quote_ident(&self.key);
        let filter = match &self.predicate {
            Some(p) => format!("({}) AND ", p),
            None => String::new(),
        };
        format!(
            "SELECT {} FROM {} WHERE {}{} > ? ORDER BY {} LIMIT ?",
            self.columns,
            quote_ident(&self.table),
            filter,
            key,
            key
        )
    }
}

/// Double-quotes an SQL identifier
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Keyset-paginated cursor
pub struct PagedCursor<'s> {
    store: &'s Store,
    spec: PageSpec,
    sql: String,
    page: RowSet,
    key_index: Option<usize>,
    position: Option<usize>,
    last_key: Option<i64>,
    visited: usize,
    pages: usize,
    exhausted: bool,
    closed: bool,
}

impl<'s> PagedCursor<'s> {
    pub fn new(store: &'s Store, spec: PageSpec) -> GpkgResult<Self> {
        if spec.page_size == 0 {
            return Err(GpkgError::validation("page size must be greater than 0"));
        }
        let sql = spec.page_sql();
        let mut cursor = Self {
            store,
            spec,
            sql,
            page: RowSet::default(),
            key_index: None,
            position: None,
            last_key: None,
            visited: 0,
            pages: 0,
            exhausted: false,
            closed: false,
        };
        cursor.fetch_page()?;
        Ok(cursor)
    }

    /// Number of non-empty pages fetched so far
    pub fn pages_fetched(&self) -> usize {
        self.pages
    }

    /// Key of the current row
    pub fn current_key(&self) -> Option<i64> {
        self.key_index.and_then(|i| self.get(i)).and_then(Value::as_i64)
    }

    fn fetch_page(&mut self) -> GpkgResult<()> {
        if self.exhausted {
            self.page = RowSet::default();
            return Ok(());
        }
        let mut params = self.spec.params.clone();
        params.push(Value::Integer(self.last_key.unwrap_or(i64::MIN)));
        params.push(Value::Integer(self.spec.page_size as i64));

        let page = self.store.query(&self.sql, &params)?;
        if self.key_index.is_none() {
            self.key_index = page.column_index(&self.spec.key);
        }
        let key_index = self.key_index.ok_or_else(|| {
            GpkgError::validation(format!(
                "paged select list for '{}' does not include key column '{}'",
                self.spec.table, self.spec.key
            ))
        })?;

        if page.len() < self.spec.page_size {
            self.exhausted = true;
        }
        if let Some(last) = page.rows().last() {
            self.pages += 1;
            self.last_key = last.get(key_index).and_then(Value::as_i64);
            if self.last_key.is_none() {
                return Err(GpkgError::decode(format!(
                    "non-integer key in column '{}' of '{}'",
                    self.spec.key, self.spec.table
                )));
            }
        }
        self.visited += page.len();
        if let Some(expected) = self.spec.expected_rows {
            if self.visited >= expected {
                self.exhausted = true;
            }
        }
        self.page = page;
        self.position = None;
        Ok(())
    }
}

impl Cursor for PagedCursor<'_> {
    fn advance(&mut self) -> GpkgResult<bool> {
        if self.closed {
            return Ok(false);
        }
        let next = self.position.map_or(0, |p| p + 1);
        if next < self.page.len() {
            self.position = Some(next);
            return Ok(true);
        }
        if self.exhausted {
            self.position = Some(self.page.len());
            return Ok(false);
        }
        self.fetch_page()?;
        if self.page.is_empty() {
            return Ok(false);
        }
        self.position = Some(0);
        Ok(true)
    }

    fn get(&self, index: usize) -> Option<&Value> {
        if self.closed {
            return None;
        }
        self.position
            .and_then(|p| self.page.rows().get(p))
            .and_then(|r| r.get(index))
    }

    fn get_by_name(&self, name: &str) -> Option<&Value> {
        let idx = self.page.column_index(name)?;
        self.get(idx)
    }

    fn columns(&self) -> &[String] {
        self.page.columns()
    }

    fn close(&mut self) {
        self.closed = true;
        self.page = RowSet::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_rows(n: i64) -> Store {
        let store = Store::open_in_memory().unwrap();
        store
            .execute("CREATE TABLE t (id INTEGER PRIMARY KEY, v TEXT)", &[])
            .unwrap();
        for i in 0..n {
            store
                .insert("INSERT INTO t (v) VALUES (?)", &[Value::Text(format!("r{}", i))])
                .unwrap();
        }
        store
    }

    fn walk(store: &Store, n: usize, page_size: usize) -> (Vec<i64>, usize) {
        let spec = PageSpec::new("t", "id", page_size).expected_rows(n);
        let mut cursor = store.open_paged(spec).unwrap();
        let mut keys = Vec::new();
        while cursor.advance().unwrap() {
            keys.push(cursor.current_key().unwrap());
        }
        (keys, cursor.pages_fetched())
    }

    #[test]
    fn test_pagination_visits_each_key_once() {
        for (n, page_size) in [(0usize, 3usize), (1, 3), (9, 3), (10, 3), (7, 10), (25, 1)] {
            let store = store_with_rows(n as i64);
            let (keys, pages) = walk(&store, n, page_size);

            assert_eq!(keys.len(), n);
            assert!(keys.windows(2).all(|w| w[0] < w[1]));
            assert_eq!(pages, (n + page_size - 1) / page_size, "n={} p={}", n, page_size);
        }
    }

    #[test]
    fn test_pagination_with_predicate() {
        let store = store_with_rows(10);
        let spec = PageSpec::new("t", "id", 2).predicate("id % 2 = ?", vec![Value::Integer(0)]);
        let mut cursor = store.open_paged(spec).unwrap();
        let mut keys = Vec::new();
        while cursor.advance().unwrap() {
            keys.push(cursor.current_key().unwrap());
        }
        assert_eq!(keys, vec![2, 4, 6, 8, 10]);
    }

    #[test]
    fn test_failed_page_fetch_is_returned() {
        let store = store_with_rows(4);
        let mut cursor = store.open_paged(PageSpec::new("t", "id", 2)).unwrap();
        assert!(cursor.advance().unwrap());
        assert!(cursor.advance().unwrap());

        store.execute("DROP TABLE t", &[]).unwrap();
        assert!(cursor.advance().is_err());
    }

    #[test]
    fn test_missing_key_column_rejected() {
        let store = store_with_rows(2);
        let spec = PageSpec::new("t", "id", 2).columns("\"v\"");
        assert!(store.open_paged(spec).is_err());
    }

    #[test]
    fn test_guard_closes_cursor() {
        let set = RowSet::new(vec!["a".into()], vec![vec![Value::Integer(1)]]);
        let mut guard = CursorGuard::new(set.into_cursor());
        assert!(guard.advance().unwrap());
        guard.close();
        assert!(!guard.advance().unwrap());
        assert_eq!(guard.get(0), None);
    }

    #[test]
    fn test_row_cursor_by_index() {
        let set = RowSet::new(
            vec!["A".into(), "b".into()],
            vec![vec![Value::Integer(1), Value::from("x")]],
        );
        let mut cursor = set.into_cursor();
        assert_eq!(cursor.get(0), None);
        assert!(cursor.advance().unwrap());
        assert_eq!(cursor.get(1), Some(&Value::from("x")));
        assert_eq!(cursor.get_by_name("a"), Some(&Value::Integer(1)));
    }
}
