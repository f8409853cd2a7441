//! Table and field descriptors loaded from the catalog

use chrono::{DateTime, Utc};

use crate::bbox::BoundingBox;
use crate::catalog::GeometryColumnEntry;
use crate::errors::{GpkgError, GpkgResult};
use crate::geometry::{is_known_geometry_type, Envelope};
use crate::tiles::TilePyramid;

/// Name used for the primary key when a table declares none
pub const SYNTHETIC_PRIMARY_KEY: &str = "rowid";

/// Storage type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Integer,
    Real,
    Text,
    Boolean,
    Blob,
    Date,
    DateTime,
    Geometry,
}

impl FieldType {
    /// Maps a declared SQL type; unmapped types are a decode error.
    ///
    /// Length suffixes (`TEXT(32)`) are ignored.
    pub fn from_declared(declared: &str) -> GpkgResult<FieldType> {
        let upper = declared.trim().to_ascii_uppercase();
        let base = upper.split('(').next().unwrap_or("").trim();
        let field_type = match base {
            "INTEGER" | "INT" | "TINYINT" | "SMALLINT" | "MEDIUMINT" | "BIGINT" => FieldType::Integer,
            "REAL" | "DOUBLE" | "FLOAT" | "NUMERIC" => FieldType::Real,
            "TEXT" | "VARCHAR" | "CHAR" | "CLOB" => FieldType::Text,
            "BOOLEAN" => FieldType::Boolean,
            "BLOB" => FieldType::Blob,
            "DATE" => FieldType::Date,
            "DATETIME" => FieldType::DateTime,
            other if is_known_geometry_type(other) => FieldType::Geometry,
            _ => {
                return Err(GpkgError::decode(format!(
                    "Unmapped storage type '{}'",
                    declared
                )))
            }
        };
        Ok(field_type)
    }

    /// Declared type used in generated DDL
    pub fn sql_type(&self) -> &'static str {
        match self {
            FieldType::Integer => "INTEGER",
            FieldType::Real => "DOUBLE",
            FieldType::Text => "TEXT",
            FieldType::Boolean => "BOOLEAN",
            FieldType::Blob => "BLOB",
            FieldType::Date => "DATE",
            FieldType::DateTime => "DATETIME",
            FieldType::Geometry => "GEOMETRY",
        }
    }
}

/// One column of a table
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    pub name: String,
    pub field_type: FieldType,
    /// Declared type as written in the DDL
    pub declared_type: String,
    pub not_null: bool,
    /// Default value SQL, verbatim
    pub default: Option<String>,
    pub primary_key: bool,
    pub display_name: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub mime_type: Option<String>,
    pub constraint_name: Option<String>,
    /// Column supplies the application-level feature id
    pub feature_id: bool,
}

impl FieldDescriptor {
    pub fn new(name: &str, field_type: FieldType) -> Self {
        Self {
            name: name.to_string(),
            field_type,
            declared_type: field_type.sql_type().to_string(),
            not_null: false,
            default: None,
            primary_key: false,
            display_name: None,
            title: None,
            description: None,
            mime_type: None,
            constraint_name: None,
            feature_id: false,
        }
    }

    /// Surrogate integer key
    pub fn primary_key(name: &str) -> Self {
        Self {
            primary_key: true,
            not_null: true,
            ..Self::new(name, FieldType::Integer)
        }
    }

    /// Geometry column declared with its geometry type name
    pub fn geometry(name: &str, geometry_type: &str) -> Self {
        Self {
            declared_type: geometry_type.to_ascii_uppercase(),
            ..Self::new(name, FieldType::Geometry)
        }
    }

    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    pub fn with_default(mut self, sql: &str) -> Self {
        self.default = Some(sql.to_string());
        self
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn with_display_name(mut self, name: &str) -> Self {
        self.display_name = Some(name.to_string());
        self
    }

    pub fn with_mime_type(mut self, mime_type: &str) -> Self {
        self.mime_type = Some(mime_type.to_string());
        self
    }

    pub fn with_constraint(mut self, constraint_name: &str) -> Self {
        self.constraint_name = Some(constraint_name.to_string());
        self
    }

    pub fn is_geometry(&self) -> bool {
        self.field_type == FieldType::Geometry
    }

    /// Column definition for CREATE TABLE
    pub(crate) fn column_sql(&self) -> String {
        let mut sql = format!(
            "{} {}",
            crate::store::quote_ident(&self.name),
            self.declared_type
        );
        if self.primary_key {
            sql.push_str(" PRIMARY KEY AUTOINCREMENT");
        }
        if self.not_null {
            sql.push_str(" NOT NULL");
        }
        if let Some(default) = &self.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(default);
        }
        sql
    }
}

/// Feature-specific catalog payload
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureInfo {
    pub geometry_column: GeometryColumnEntry,
    /// R-tree table and extension row are both present
    pub spatial_index: bool,
}

/// Closed set of table kinds
#[derive(Debug, Clone, PartialEq)]
pub enum TableKind {
    Feature(FeatureInfo),
    Tile(TilePyramid),
    /// Catalog tables, and registered tables without a spatial payload
    System,
}

impl TableKind {
    pub fn name(&self) -> &'static str {
        match self {
            TableKind::Feature(_) => "feature",
            TableKind::Tile(_) => "tile",
            TableKind::System => "system",
        }
    }
}

/// Everything the catalog knows about one table
#[derive(Debug, Clone, PartialEq)]
pub struct TableDescriptor {
    pub name: String,
    pub kind: TableKind,
    pub identifier: Option<String>,
    pub description: Option<String>,
    /// Declared bounds from the contents row
    pub bounds: Option<Envelope>,
    pub srs_id: Option<i32>,
    /// Organization of `srs_id`
    pub organization: String,
    pub last_change: Option<DateTime<Utc>>,
    pub fields: Vec<FieldDescriptor>,
}

impl TableDescriptor {
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name.eq_ignore_ascii_case(name))
    }

    /// Single INTEGER primary key column, or `rowid`.
    ///
    /// Composite and non-integer keys cannot drive keyset paging or
    /// `delete(i64)`, so those tables are addressed by `rowid` too.
    pub fn primary_key(&self) -> &str {
        let mut keys = self.fields.iter().filter(|f| f.primary_key);
        match (keys.next(), keys.next()) {
            (Some(key), None) if key.field_type == FieldType::Integer => key.name.as_str(),
            _ => SYNTHETIC_PRIMARY_KEY,
        }
    }

    /// Whether rows are keyed by a declared column rather than `rowid`
    pub fn has_integer_primary_key(&self) -> bool {
        self.primary_key() != SYNTHETIC_PRIMARY_KEY
    }

    pub fn feature_id_column(&self) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.feature_id)
            .map(|f| f.name.as_str())
    }

    /// Declared bounds as a box, when set and non-empty
    pub fn declared_bounds(&self) -> Option<BoundingBox> {
        let srs_id = self.srs_id?;
        self.bounds
            .map(|e| BoundingBox::from_envelope(&e, srs_id, &self.organization))
            .filter(|b| !b.is_empty())
    }
}
