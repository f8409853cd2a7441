//! Transient feature records

use std::rc::Rc;

use crate::geometry::GeometryValue;
use crate::table::FeatureType;
use crate::value::Value;

/// One feature: application id, attributes in declared order, geometry
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRecord {
    /// Application-level feature id
    pub id: String,
    /// Surrogate primary key, set when the record was read from a table
    pub key: Option<i64>,
    pub attributes: Vec<(String, Value)>,
    pub geometry: Option<GeometryValue>,
    pub feature_type: Rc<FeatureType>,
}

impl FeatureRecord {
    pub fn new(feature_type: Rc<FeatureType>, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            key: None,
            attributes: Vec::new(),
            geometry: None,
            feature_type,
        }
    }

    pub fn with_attribute(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.set_attribute(name, value);
        self
    }

    pub fn with_geometry(mut self, geometry: GeometryValue) -> Self {
        self.geometry = Some(geometry);
        self
    }

    /// Replaces the attribute if present, appends it otherwise
    pub fn set_attribute(&mut self, name: &str, value: impl Into<Value>) {
        let value = value.into();
        match self
            .attributes
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
        {
            Some((_, slot)) => *slot = value,
            None => self.attributes.push((name.to_string(), value)),
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    /// Table the record belongs to
    pub fn type_name(&self) -> &str {
        &self.feature_type.table_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_attribute_replaces_case_insensitively() {
        let ft = Rc::new(FeatureType::new("poi", "POINT", 4326));
        let mut r = FeatureRecord::new(ft, "a1").with_attribute("Name", "old");
        r.set_attribute("name", "new");
        assert_eq!(r.attributes.len(), 1);
        assert_eq!(r.attribute("NAME"), Some(&Value::from("new")));
        assert_eq!(r.type_name(), "poi");
    }
}
