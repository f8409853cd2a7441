//! Feature records to rows

use std::collections::HashMap;

use crate::catalog::{self, DataColumnConstraint};
use crate::container::Container;
use crate::errors::{GpkgError, GpkgResult};
use crate::observability::{log_event, Event};
use crate::table::FeatureTable;
use crate::value::Value;

use super::constraints::violation;
use super::record::FeatureRecord;

/// Writes feature records into one feature table.
///
/// Constraints registered on the table's columns are loaded once per
/// writer. Strict containers reject violating values; lenient ones store
/// NULL instead and log the replacement.
pub struct FeatureWriter<'t, 'c> {
    table: &'t FeatureTable<'c>,
    constraints: HashMap<String, (String, Vec<DataColumnConstraint>)>,
}

impl<'t, 'c> FeatureWriter<'t, 'c> {
    pub fn new(table: &'t FeatureTable<'c>) -> GpkgResult<Self> {
        let store = table.container().store();
        let mut constraints = HashMap::new();
        for field in table.fields() {
            // Geometry and mime-typed content is never checked
            if field.is_geometry() || field.mime_type.is_some() {
                continue;
            }
            if let Some(name) = &field.constraint_name {
                let rows = catalog::constraints(store, name)?;
                constraints.insert(field.name.to_ascii_lowercase(), (name.clone(), rows));
            }
        }
        Ok(Self { table, constraints })
    }

    /// Inserts one record; returns its primary key
    pub fn insert(&self, record: &FeatureRecord) -> GpkgResult<i64> {
        let values = self.row_values(record)?;
        let key = self.table.insert(&values)?;
        self.table.touch()?;
        Ok(key)
    }

    /// Inserts all records in one transaction; returns their primary keys
    pub fn insert_batch(&self, records: &[FeatureRecord]) -> GpkgResult<Vec<i64>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let rows = records
            .iter()
            .map(|r| self.row_values(r))
            .collect::<GpkgResult<Vec<_>>>()?;
        let keys = self.table.insert_batch(&rows)?;
        self.table.touch()?;

        let count = keys.len().to_string();
        log_event(
            Event::BatchInserted,
            &[("rows", count.as_str()), ("table", self.table.name())],
        );
        Ok(keys)
    }

    /// Rewrites the row with primary key `key` from `record`
    pub fn update(&self, key: i64, record: &FeatureRecord) -> GpkgResult<usize> {
        let values = self.row_values(record)?;
        let updated = self.table.update(key, &values)?;
        if updated == 0 {
            return Err(GpkgError::not_found(
                "feature",
                &format!("{}.{}", self.table.name(), key),
            ));
        }
        self.table.touch()?;
        Ok(updated)
    }

    /// Column values for `record`, in declared order, primary key excluded
    fn row_values(&self, record: &FeatureRecord) -> GpkgResult<Vec<(String, Value)>> {
        if !record.type_name().eq_ignore_ascii_case(self.table.name()) {
            return Err(GpkgError::validation(format!(
                "Record of '{}' cannot be written to '{}'",
                record.type_name(),
                self.table.name()
            )));
        }

        let mut values = Vec::with_capacity(self.table.fields().len());
        for field in self.table.fields().iter().filter(|f| !f.primary_key) {
            let value = if field.feature_id {
                Value::from(record.id.as_str())
            } else if field.is_geometry() {
                record.geometry.clone().map(Value::from).unwrap_or(Value::Null)
            } else {
                record.attribute(&field.name).cloned().unwrap_or(Value::Null)
            };
            let value = self.check(&field.name, value)?;
            values.push((field.name.clone(), value));
        }
        Ok(values)
    }

    fn check(&self, column: &str, value: Value) -> GpkgResult<Value> {
        let Some((name, rows)) = self.constraints.get(&column.to_ascii_lowercase()) else {
            return Ok(value);
        };
        let Some(reason) = violation(self.table.container().store(), rows, &value)? else {
            return Ok(value);
        };
        if self.table.container().config().strict {
            return Err(GpkgError::constraint_violation(
                self.table.name(),
                column,
                name,
                reason,
            ));
        }
        log_event(
            Event::ConstraintValueReplaced,
            &[
                ("column", column),
                ("constraint", name.as_str()),
                ("reason", reason.as_str()),
                ("table", self.table.name()),
            ],
        );
        Ok(Value::Null)
    }
}

/// Inserts records of any feature types.
///
/// Records are grouped by table; each group is one transaction and each
/// table's timestamp is touched once. Returns the keys per table.
pub fn insert_all(
    container: &Container,
    records: &[FeatureRecord],
) -> GpkgResult<Vec<(String, Vec<i64>)>> {
    let mut groups: Vec<(String, Vec<FeatureRecord>)> = Vec::new();
    for record in records {
        match groups
            .iter_mut()
            .find(|(name, _)| name.eq_ignore_ascii_case(record.type_name()))
        {
            Some((_, group)) => group.push(record.clone()),
            None => groups.push((record.type_name().to_string(), vec![record.clone()])),
        }
    }

    let mut inserted = Vec::with_capacity(groups.len());
    for (name, group) in groups {
        let table = container.feature_table(&name)?;
        let keys = FeatureWriter::new(&table)?.insert_batch(&group)?;
        inserted.push((name, keys));
    }
    Ok(inserted)
}
