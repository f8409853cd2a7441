//! Generic table handle
//!
//! A `Table` is a cheap view: the container reference plus the cached
//! descriptor. Every statement names columns from the descriptor and binds
//! values as parameters.

use std::rc::Rc;

use chrono::{DateTime, Utc};

use crate::catalog::{self, ExtensionEntry, MANDATED_TABLES};
use crate::container::Container;
use crate::errors::{GpkgError, GpkgResult};
use crate::store::{quote_ident, CursorGuard, PageSpec, PagedCursor, RowCursor, RowSet, SqlStatement};
use crate::value::Value;

use super::descriptor::{FieldDescriptor, TableDescriptor, TableKind, SYNTHETIC_PRIMARY_KEY};
use super::feature_type::negotiated_dimension;

/// Handle on one table of a container
#[derive(Clone)]
pub struct Table<'c> {
    container: &'c Container,
    descriptor: Rc<TableDescriptor>,
}

impl<'c> Table<'c> {
    pub(crate) fn new(container: &'c Container, descriptor: Rc<TableDescriptor>) -> Self {
        Self {
            container,
            descriptor,
        }
    }

    /// Creates a missing catalog table in the store.
    ///
    /// Only the mandated system tables can be created this way.
    pub fn create_system(container: &'c Container, name: &str) -> GpkgResult<Table<'c>> {
        let Some(position) = MANDATED_TABLES.iter().position(|t| *t == name) else {
            return Err(GpkgError::validation(format!("'{}' is not a system table", name)));
        };
        if !container.store().table_exists(name)? {
            container
                .store()
                .execute_atomic(&[SqlStatement::new(catalog::system_table_ddl(position))])?;
        }
        container.table(name)
    }

    pub fn container(&self) -> &'c Container {
        self.container
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn descriptor(&self) -> &TableDescriptor {
        &self.descriptor
    }

    pub fn kind(&self) -> &TableKind {
        &self.descriptor.kind
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.descriptor.fields
    }

    /// Declared primary key, falling back to `rowid`
    pub fn primary_key(&self) -> &str {
        self.descriptor.primary_key()
    }

    pub(crate) fn quoted_name(&self) -> String {
        quote_ident(self.name())
    }

    /// Number of rows matching `predicate` (all rows when `None`)
    pub fn row_count(&self, predicate: Option<&str>, params: &[Value]) -> GpkgResult<usize> {
        let sql = match predicate {
            Some(p) => format!("SELECT COUNT(*) FROM {} WHERE {}", self.quoted_name(), p),
            None => format!("SELECT COUNT(*) FROM {}", self.quoted_name()),
        };
        Ok(self.container.store().query_i64(&sql, params)?.unwrap_or(0) as usize)
    }

    /// `SELECT * FROM <table> <suffix>`, materialized
    pub fn query(&self, suffix: &str, params: &[Value]) -> GpkgResult<RowSet> {
        let sql = format!("SELECT * FROM {} {}", self.quoted_name(), suffix);
        self.container.store().query(&sql, params)
    }

    /// Like `query`, behind a cursor
    pub fn query_cursor(&self, suffix: &str, params: &[Value]) -> GpkgResult<CursorGuard<RowCursor>> {
        let sql = format!("SELECT * FROM {} {}", self.quoted_name(), suffix);
        self.container.store().open_cursor(&sql, params)
    }

    /// Keyset-paginated walk over the rows matching `predicate`
    pub fn query_page(
        &self,
        predicate: Option<&str>,
        params: Vec<Value>,
    ) -> GpkgResult<CursorGuard<PagedCursor<'c>>> {
        let spec = self.page_spec(predicate, params, "*");
        self.container.store().open_paged(spec)
    }

    pub(crate) fn page_spec(&self, predicate: Option<&str>, params: Vec<Value>, columns: &str) -> PageSpec {
        let key = self.primary_key();
        let columns = if self.descriptor.has_integer_primary_key() {
            columns.to_string()
        } else {
            format!("{} AS {}, {}", SYNTHETIC_PRIMARY_KEY, SYNTHETIC_PRIMARY_KEY, columns)
        };
        let mut spec = PageSpec::new(self.name(), key, self.container.config().page_size)
            .columns(columns);
        if let Some(p) = predicate {
            spec = spec.predicate(p, params);
        }
        spec
    }

    /// Resolves a column name and prepares its value for binding
    fn bind(&self, column: &str, value: Value) -> GpkgResult<(String, Value)> {
        let field = self.descriptor.field(column).ok_or_else(|| {
            GpkgError::validation(format!("Table '{}' has no column '{}'", self.name(), column))
        })?;
        let bound = match value {
            Value::Geometry(geometry) => {
                let TableKind::Feature(info) = &self.descriptor.kind else {
                    return Err(GpkgError::validation(format!(
                        "Table '{}' does not store geometries",
                        self.name()
                    )));
                };
                let entry = &info.geometry_column;
                let dimension = negotiated_dimension(entry.z, entry.m)?;
                Value::Blob(self.container.codec().encode(&geometry, dimension)?)
            }
            Value::Map(_) => {
                return Err(GpkgError::validation(format!(
                    "Column '{}' cannot store a map",
                    field.name
                )))
            }
            other => other,
        };
        Ok((field.name.clone(), bound))
    }

    pub(crate) fn insert_statement<S: AsRef<str>>(&self, values: &[(S, Value)]) -> GpkgResult<SqlStatement> {
        if values.is_empty() {
            return Ok(SqlStatement::new(format!(
                "INSERT INTO {} DEFAULT VALUES",
                self.quoted_name()
            )));
        }
        let mut columns = Vec::with_capacity(values.len());
        let mut params = Vec::with_capacity(values.len());
        for (column, value) in values {
            let (name, bound) = self.bind(column.as_ref(), value.clone())?;
            columns.push(quote_ident(&name));
            params.push(bound);
        }
        let placeholders = vec!["?"; columns.len()].join(", ");
        Ok(SqlStatement::with_params(
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                self.quoted_name(),
                columns.join(", "),
                placeholders
            ),
            params,
        ))
    }

    /// Inserts one row; returns its primary key
    pub fn insert<S: AsRef<str>>(&self, values: &[(S, Value)]) -> GpkgResult<i64> {
        let stmt = self.insert_statement(values)?;
        self.container.store().insert(&stmt.sql, &stmt.params)
    }

    /// Inserts all rows in one transaction; returns their primary keys
    pub fn insert_batch<S: AsRef<str>>(&self, rows: &[Vec<(S, Value)>]) -> GpkgResult<Vec<i64>> {
        let statements = rows
            .iter()
            .map(|row| self.insert_statement(row))
            .collect::<GpkgResult<Vec<_>>>()?;
        self.container.store().with_transaction(|store| {
            statements
                .iter()
                .map(|stmt| store.insert(&stmt.sql, &stmt.params))
                .collect()
        })
    }

    /// Updates the row with primary key `key`; returns affected rows
    pub fn update<S: AsRef<str>>(&self, key: i64, values: &[(S, Value)]) -> GpkgResult<usize> {
        if values.is_empty() {
            return Ok(0);
        }
        let mut assignments = Vec::with_capacity(values.len());
        let mut params = Vec::with_capacity(values.len() + 1);
        for (column, value) in values {
            let (name, bound) = self.bind(column.as_ref(), value.clone())?;
            assignments.push(format!("{} = ?", quote_ident(&name)));
            params.push(bound);
        }
        params.push(Value::Integer(key));
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ?",
            self.quoted_name(),
            assignments.join(", "),
            quote_ident(self.primary_key())
        );
        self.container.store().execute(&sql, &params)
    }

    /// Deletes the row with primary key `key`; returns affected rows
    pub fn delete(&self, key: i64) -> GpkgResult<usize> {
        let sql = format!(
            "DELETE FROM {} WHERE {} = ?",
            self.quoted_name(),
            quote_ident(self.primary_key())
        );
        self.container.store().execute(&sql, &[Value::Integer(key)])
    }

    /// Stamps the catalog last-modified time
    pub fn touch(&self) -> GpkgResult<DateTime<Utc>> {
        let at = catalog::touch(self.container.store(), self.name())?;
        self.container.invalidate(self.name());
        Ok(at)
    }

    /// Extensions registered for this table or the whole container
    pub fn extensions(&self) -> GpkgResult<Vec<ExtensionEntry>> {
        catalog::extensions(self.container.store(), self.name())
    }

    pub fn has_extension(&self, extension_name: &str) -> GpkgResult<bool> {
        Ok(self
            .extensions()?
            .iter()
            .any(|e| e.extension_name.eq_ignore_ascii_case(extension_name)))
    }
}

impl std::fmt::Debug for Table<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.descriptor.name)
            .field("kind", &self.descriptor.kind.name())
            .finish()
    }
}
