//! Feature type descriptors

use crate::errors::{GpkgError, GpkgResult};

use super::descriptor::{FieldDescriptor, FieldType};

/// Z or M option of a geometry column
pub const PROHIBITED: u8 = 0;
pub const MANDATORY: u8 = 1;
pub const OPTIONAL: u8 = 2;

/// Ordered field list plus geometry and id columns of a feature table
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureType {
    pub table_name: String,
    pub identifier: Option<String>,
    pub description: Option<String>,
    /// All columns in DDL order, including key and geometry
    pub fields: Vec<FieldDescriptor>,
    pub geometry_column: String,
    pub geometry_type: String,
    pub srs_id: i32,
    pub z: u8,
    pub m: u8,
}

impl FeatureType {
    /// `fid` integer key and a `geom` column of `geometry_type`
    pub fn new(table_name: &str, geometry_type: &str, srs_id: i32) -> Self {
        Self {
            table_name: table_name.to_string(),
            identifier: None,
            description: None,
            fields: vec![
                FieldDescriptor::primary_key("fid"),
                FieldDescriptor::geometry("geom", geometry_type),
            ],
            geometry_column: "geom".to_string(),
            geometry_type: geometry_type.to_ascii_uppercase(),
            srs_id,
            z: PROHIBITED,
            m: PROHIBITED,
        }
    }

    pub fn with_field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    /// Adds a text column carrying the application feature id
    pub fn with_id_field(mut self, name: &str) -> Self {
        let mut field = FieldDescriptor::new(name, FieldType::Text);
        field.feature_id = true;
        self.fields.push(field);
        self
    }

    /// Renames the geometry column
    pub fn with_geometry_column(mut self, name: &str) -> Self {
        for field in self.fields.iter_mut().filter(|f| f.is_geometry()) {
            field.name = name.to_string();
        }
        self.geometry_column = name.to_string();
        self
    }

    pub fn with_z(mut self, z: u8) -> Self {
        self.z = z;
        self
    }

    pub fn with_m(mut self, m: u8) -> Self {
        self.m = m;
        self
    }

    pub fn with_identifier(mut self, identifier: &str) -> Self {
        self.identifier = Some(identifier.to_string());
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name.eq_ignore_ascii_case(name))
    }

    pub fn primary_key(&self) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.primary_key)
    }

    pub fn feature_id_field(&self) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.feature_id)
    }

    /// Attribute columns in declared order: neither key, geometry nor id
    pub fn attributes(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields
            .iter()
            .filter(|f| !f.primary_key && !f.is_geometry() && !f.feature_id)
    }

    /// Ordinates per vertex written for this type.
    ///
    /// 3 when Z or M is mandatory or optional; Z and M both mandatory is
    /// not supported.
    pub fn output_dimension(&self) -> GpkgResult<u8> {
        negotiated_dimension(self.z, self.m)
    }
}

/// Ordinates per vertex for a geometry column's Z/M options
pub fn negotiated_dimension(z: u8, m: u8) -> GpkgResult<u8> {
    if z > OPTIONAL || m > OPTIONAL {
        return Err(GpkgError::validation(format!(
            "Z/M options must be 0, 1 or 2, got z={} m={}",
            z, m
        )));
    }
    if z == MANDATORY && m == MANDATORY {
        return Err(GpkgError::unsupported_dimension(4));
    }
    if z != PROHIBITED || m != PROHIBITED {
        Ok(3)
    } else {
        Ok(2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimension_negotiation() {
        let base = FeatureType::new("t", "POINT", 4326);
        assert_eq!(base.output_dimension().unwrap(), 2);
        assert_eq!(base.clone().with_z(MANDATORY).output_dimension().unwrap(), 3);
        assert_eq!(base.clone().with_m(OPTIONAL).output_dimension().unwrap(), 3);
        assert_eq!(
            base.clone().with_z(OPTIONAL).with_m(MANDATORY).output_dimension().unwrap(),
            3
        );
        assert!(base.clone().with_z(MANDATORY).with_m(MANDATORY).output_dimension().is_err());
        assert!(base.with_z(3).output_dimension().is_err());
    }

    #[test]
    fn test_attribute_order_skips_special_columns() {
        let t = FeatureType::new("poi", "POINT", 4326)
            .with_id_field("code")
            .with_field(FieldDescriptor::new("name", FieldType::Text))
            .with_field(FieldDescriptor::new("rank", FieldType::Integer))
            .with_geometry_column("shape");

        let names: Vec<&str> = t.attributes().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["name", "rank"]);
        assert_eq!(t.feature_id_field().unwrap().name, "code");
        assert_eq!(t.field("SHAPE").unwrap().declared_type, "POINT");
        assert_eq!(t.primary_key().unwrap().name, "fid");
    }
}
