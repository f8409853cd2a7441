//! Rows to feature records

use std::rc::Rc;

use crate::errors::{GpkgError, GpkgResult};
use crate::store::{quote_ident, Cursor};
use crate::table::{FeatureTable, FeatureType, FieldType};
use crate::value::Value;

use super::record::FeatureRecord;

/// Keys per `IN (...)` lookup
pub const KEY_CHUNK_SIZE: usize = 500;

/// Reads feature records from one feature table
pub struct FeatureReader<'t, 'c> {
    table: &'t FeatureTable<'c>,
    feature_type: Rc<FeatureType>,
}

impl<'t, 'c> FeatureReader<'t, 'c> {
    pub fn new(table: &'t FeatureTable<'c>) -> Self {
        Self {
            table,
            feature_type: Rc::new(table.feature_type()),
        }
    }

    /// Feature type shared by every record this reader returns
    pub fn feature_type(&self) -> Rc<FeatureType> {
        Rc::clone(&self.feature_type)
    }

    /// Records matching `predicate`, in key order.
    ///
    /// Counts first, then walks the table page by page until every counted
    /// row was visited.
    pub fn read(&self, predicate: Option<&str>, params: Vec<Value>) -> GpkgResult<Vec<FeatureRecord>> {
        let total = self.table.row_count(predicate, &params)?;
        let mut records = Vec::with_capacity(total);
        if total == 0 {
            return Ok(records);
        }

        let spec = self.table.page_spec(predicate, params, "*").expected_rows(total);
        let mut cursor = self.table.container().store().open_paged(spec)?;
        while cursor.advance()? {
            let index = records.len();
            records.push(self.map_row(|name| cursor.get_by_name(name), index)?);
        }
        Ok(records)
    }

    pub fn read_all(&self) -> GpkgResult<Vec<FeatureRecord>> {
        self.read(None, Vec::new())
    }

    /// Records with the given primary keys, in key order
    pub fn read_keys(&self, keys: &[i64]) -> GpkgResult<Vec<FeatureRecord>> {
        let key = quote_ident(self.table.primary_key());
        let mut records = Vec::with_capacity(keys.len());
        for chunk in keys.chunks(KEY_CHUNK_SIZE) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let params: Vec<Value> = chunk.iter().map(|k| Value::Integer(*k)).collect();
            let set = self.table.query(
                &format!("WHERE {} IN ({}) ORDER BY {}", key, placeholders, key),
                &params,
            )?;
            for row in set.iter() {
                let index = records.len();
                records.push(self.map_row(|name| row.get(name), index)?);
            }
        }
        Ok(records)
    }

    /// Builds a record from one row; `row_index` is its ordinal in the read
    pub(crate) fn map_row<'v>(
        &self,
        lookup: impl Fn(&str) -> Option<&'v Value>,
        row_index: usize,
    ) -> GpkgResult<FeatureRecord> {
        let ft = &self.feature_type;

        let id = ft
            .feature_id_field()
            .and_then(|f| lookup(&f.name))
            .and_then(|v| match v {
                Value::Null => None,
                Value::Text(s) if s.eq_ignore_ascii_case("null") => None,
                Value::Text(s) => Some(s.clone()),
                other => Some(other.to_string()),
            })
            .unwrap_or_else(|| format!("{}.{}", ft.table_name, row_index));

        let geometry = match lookup(&ft.geometry_column) {
            Some(Value::Blob(bytes)) => Some(self.table.container().codec().decode(bytes)?),
            Some(Value::Null) | None => None,
            Some(other) => {
                return Err(GpkgError::decode(format!(
                    "Geometry column '{}' of '{}' holds a {}",
                    ft.geometry_column,
                    ft.table_name,
                    other.type_name()
                )))
            }
        };

        let mut attributes = Vec::new();
        for field in ft.attributes() {
            let raw = lookup(&field.name).cloned().unwrap_or(Value::Null);
            attributes.push((field.name.clone(), coerce(field.field_type, raw)));
        }

        Ok(FeatureRecord {
            id,
            key: lookup(ft.primary_key().map_or("fid", |f| f.name.as_str())).and_then(Value::as_i64),
            attributes,
            geometry,
            feature_type: Rc::clone(ft),
        })
    }
}

/// Stored value as the declared field type
fn coerce(field_type: FieldType, value: Value) -> Value {
    match (field_type, value) {
        (FieldType::Boolean, Value::Integer(i)) => Value::Boolean(i != 0),
        (FieldType::Real, Value::Integer(i)) => Value::Real(i as f64),
        (_, other) => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ContainerConfig;
    use crate::container::Container;
    use crate::geometry::GeometryValue;
    use crate::table::FieldDescriptor;

    fn populated(c: &Container, rows: usize) -> FeatureTable<'_> {
        let ft = FeatureType::new("poi", "POINT", 4326)
            .with_id_field("code")
            .with_field(FieldDescriptor::new("open", FieldType::Boolean))
            .with_field(FieldDescriptor::new("rating", FieldType::Real));
        let t = c.create_feature_table(&ft, None).unwrap();
        for i in 0..rows {
            let code = if i % 3 == 0 { Value::Null } else { Value::from(format!("P{}", i)) };
            t.insert(&[
                ("code", code),
                ("open", Value::Integer((i % 2) as i64)),
                ("rating", Value::Integer(i as i64)),
                ("geom", Value::from(GeometryValue::point(4326, i as f64, 0.0))),
            ])
            .unwrap();
        }
        t
    }

    #[test]
    fn test_read_pages_every_row() {
        let c = Container::in_memory(ContainerConfig::default().with_page_size(4)).unwrap();
        let t = populated(&c, 10);
        let records = FeatureReader::new(&t).read_all().unwrap();

        assert_eq!(records.len(), 10);
        assert_eq!(records[0].id, "poi.0");
        assert_eq!(records[1].id, "P1");
        assert_eq!(records[1].attribute("open"), Some(&Value::Boolean(true)));
        assert_eq!(records[2].attribute("rating"), Some(&Value::Real(2.0)));
        assert_eq!(records[9].geometry.as_ref().unwrap().envelope().unwrap().min_x, 9.0);
        let keys: Vec<i64> = records.iter().filter_map(|r| r.key).collect();
        assert!(keys.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_read_with_predicate() {
        let c = Container::in_memory(ContainerConfig::default().with_page_size(3)).unwrap();
        let t = populated(&c, 12);
        let records = FeatureReader::new(&t)
            .read(Some("rating >= ?"), vec![Value::Integer(6)])
            .unwrap();
        assert_eq!(records.len(), 6);
        assert_eq!(records[0].id, "poi.0");
        assert_eq!(records[1].id, "P7");
    }

    #[test]
    fn test_read_keys_in_order() {
        let c = Container::in_memory(ContainerConfig::default()).unwrap();
        let t = populated(&c, 5);
        let records = FeatureReader::new(&t).read_keys(&[4, 2]).unwrap();
        let keys: Vec<i64> = records.iter().filter_map(|r| r.key).collect();
        assert_eq!(keys, vec![2, 4]);
    }

    #[test]
    fn test_literal_null_id_is_synthesized() {
        let c = Container::in_memory(ContainerConfig::default()).unwrap();
        let t = populated(&c, 0);
        t.insert(&[("code", Value::from("null"))]).unwrap();
        let records = FeatureReader::new(&t).read_all().unwrap();
        assert_eq!(records[0].id, "poi.0");
        assert!(records[0].geometry.is_none());
    }
}
