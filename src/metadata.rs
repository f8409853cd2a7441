//! Metadata documents and their references
//!
//! Documents are stored verbatim; nothing here parses them.

use chrono::{DateTime, Utc};

use crate::catalog::{format_timestamp, parse_timestamp};
use crate::container::Container;
use crate::errors::{GpkgError, GpkgResult};
use crate::store::RowView;
use crate::value::Value;

/// Accepted `md_scope` values
pub const METADATA_SCOPES: [&str; 20] = [
    "undefined",
    "fieldSession",
    "collectionSession",
    "series",
    "dataset",
    "featureType",
    "feature",
    "attributeType",
    "attribute",
    "tile",
    "model",
    "catalog",
    "schema",
    "taxonomy",
    "software",
    "service",
    "collectionHardware",
    "nonGeographicDataset",
    "dimensionGroup",
    "style",
];

/// A row of `gpkg_metadata`
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataEntry {
    /// Assigned by the store on insert
    pub id: Option<i64>,
    pub scope: String,
    pub standard_uri: String,
    pub mime_type: String,
    /// Document text, verbatim
    pub document: String,
}

impl MetadataEntry {
    /// Dataset-scoped XML document
    pub fn new(standard_uri: &str, document: &str) -> Self {
        Self {
            id: None,
            scope: "dataset".to_string(),
            standard_uri: standard_uri.to_string(),
            mime_type: "text/xml".to_string(),
            document: document.to_string(),
        }
    }

    pub fn with_scope(mut self, scope: &str) -> Self {
        self.scope = scope.to_string();
        self
    }

    pub fn with_mime_type(mut self, mime_type: &str) -> Self {
        self.mime_type = mime_type.to_string();
        self
    }

    fn from_row(row: &RowView<'_>) -> GpkgResult<Self> {
        let text = |c: &str| {
            row.text(c)
                .ok_or_else(|| GpkgError::decode(format!("gpkg_metadata row has no {}", c)))
        };
        Ok(Self {
            id: row.i64("id"),
            scope: text("md_scope")?,
            standard_uri: text("md_standard_uri")?,
            mime_type: text("mime_type")?,
            document: row.text("metadata").unwrap_or_default(),
        })
    }
}

/// What a metadata reference points at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceScope {
    Geopackage,
    Table,
    Column,
    Row,
    RowCol,
}

impl ReferenceScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceScope::Geopackage => "geopackage",
            ReferenceScope::Table => "table",
            ReferenceScope::Column => "column",
            ReferenceScope::Row => "row",
            ReferenceScope::RowCol => "row/col",
        }
    }

    pub fn parse(s: &str) -> Option<ReferenceScope> {
        match s {
            "geopackage" => Some(ReferenceScope::Geopackage),
            "table" => Some(ReferenceScope::Table),
            "column" => Some(ReferenceScope::Column),
            "row" => Some(ReferenceScope::Row),
            "row/col" => Some(ReferenceScope::RowCol),
            _ => None,
        }
    }
}

/// A row of `gpkg_metadata_reference`
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataReference {
    pub scope: ReferenceScope,
    pub table_name: Option<String>,
    pub column_name: Option<String>,
    pub row_id: Option<i64>,
    pub timestamp: DateTime<Utc>,
    /// Metadata row this reference belongs to; set on insert
    pub metadata_id: Option<i64>,
    pub parent_id: Option<i64>,
}

impl MetadataReference {
    /// Reference to the whole container
    pub fn geopackage() -> Self {
        Self {
            scope: ReferenceScope::Geopackage,
            table_name: None,
            column_name: None,
            row_id: None,
            timestamp: Utc::now(),
            metadata_id: None,
            parent_id: None,
        }
    }

    pub fn table(table: &str) -> Self {
        Self {
            scope: ReferenceScope::Table,
            table_name: Some(table.to_string()),
            ..Self::geopackage()
        }
    }

    pub fn column(table: &str, column: &str) -> Self {
        Self {
            scope: ReferenceScope::Column,
            column_name: Some(column.to_string()),
            ..Self::table(table)
        }
    }

    pub fn row(table: &str, row_id: i64) -> Self {
        Self {
            scope: ReferenceScope::Row,
            row_id: Some(row_id),
            ..Self::table(table)
        }
    }

    pub fn row_column(table: &str, column: &str, row_id: i64) -> Self {
        Self {
            scope: ReferenceScope::RowCol,
            row_id: Some(row_id),
            ..Self::column(table, column)
        }
    }

    pub fn with_parent(mut self, parent_id: i64) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    fn validate(&self) -> GpkgResult<()> {
        let needs_table = self.scope != ReferenceScope::Geopackage;
        let needs_column = matches!(self.scope, ReferenceScope::Column | ReferenceScope::RowCol);
        let needs_row = matches!(self.scope, ReferenceScope::Row | ReferenceScope::RowCol);
        if self.table_name.is_some() != needs_table
            || self.column_name.is_some() != needs_column
            || self.row_id.is_some() != needs_row
        {
            return Err(GpkgError::validation(format!(
                "Metadata reference with scope '{}' has the wrong target fields",
                self.scope.as_str()
            )));
        }
        Ok(())
    }

    fn from_row(row: &RowView<'_>) -> GpkgResult<Self> {
        let scope = row
            .text("reference_scope")
            .as_deref()
            .and_then(ReferenceScope::parse)
            .ok_or_else(|| GpkgError::decode("Invalid reference_scope in gpkg_metadata_reference"))?;
        Ok(Self {
            scope,
            table_name: row.text("table_name"),
            column_name: row.text("column_name"),
            row_id: row.i64("row_id_value"),
            timestamp: row
                .text("timestamp")
                .as_deref()
                .and_then(parse_timestamp)
                .ok_or_else(|| GpkgError::decode("Invalid timestamp in gpkg_metadata_reference"))?,
            metadata_id: row.i64("md_file_id"),
            parent_id: row.i64("md_parent_id"),
        })
    }
}

impl Container {
    /// Stores a document and its references in one transaction; returns the
    /// new metadata id
    pub fn add_metadata(
        &self,
        entry: &MetadataEntry,
        references: &[MetadataReference],
    ) -> GpkgResult<i64> {
        if !METADATA_SCOPES.contains(&entry.scope.as_str()) {
            return Err(GpkgError::validation(format!(
                "Unknown metadata scope '{}'",
                entry.scope
            )));
        }
        for reference in references {
            reference.validate()?;
        }

        self.store().with_transaction(|store| {
            let id = store.insert(
                "INSERT INTO gpkg_metadata (md_scope, md_standard_uri, mime_type, metadata)
                 VALUES (?, ?, ?, ?)",
                &[
                    Value::from(entry.scope.as_str()),
                    Value::from(entry.standard_uri.as_str()),
                    Value::from(entry.mime_type.as_str()),
                    Value::from(entry.document.as_str()),
                ],
            )?;
            for r in references {
                store.execute(
                    "INSERT INTO gpkg_metadata_reference
                        (reference_scope, table_name, column_name, row_id_value,
                         timestamp, md_file_id, md_parent_id)
                     VALUES (?, ?, ?, ?, ?, ?, ?)",
                    &[
                        Value::from(r.scope.as_str()),
                        Value::from(r.table_name.clone()),
                        Value::from(r.column_name.clone()),
                        Value::from(r.row_id),
                        Value::from(format_timestamp(r.timestamp)),
                        Value::Integer(id),
                        Value::from(r.parent_id),
                    ],
                )?;
            }
            Ok(id)
        })
    }

    pub fn metadata(&self, id: i64) -> GpkgResult<Option<MetadataEntry>> {
        let set = self
            .store()
            .query("SELECT * FROM gpkg_metadata WHERE id = ?", &[Value::Integer(id)])?;
        set.first().map(|row| MetadataEntry::from_row(&row)).transpose()
    }

    pub fn metadata_references(&self, id: i64) -> GpkgResult<Vec<MetadataReference>> {
        let set = self.store().query(
            "SELECT * FROM gpkg_metadata_reference WHERE md_file_id = ? ORDER BY rowid",
            &[Value::Integer(id)],
        )?;
        set.iter().map(|row| MetadataReference::from_row(&row)).collect()
    }

    /// Documents referenced from `table`, its columns or its rows
    pub fn metadata_for_table(&self, table: &str) -> GpkgResult<Vec<MetadataEntry>> {
        let set = self.store().query(
            "SELECT * FROM gpkg_metadata WHERE id IN (
                SELECT md_file_id FROM gpkg_metadata_reference WHERE table_name = ?
             ) ORDER BY id",
            &[Value::from(table)],
        )?;
        set.iter().map(|row| MetadataEntry::from_row(&row)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ContainerConfig;
    use crate::table::FeatureType;

    const ISO: &str = "http://www.isotc211.org/2005/gmd";

    fn container() -> Container {
        let c = Container::in_memory(ContainerConfig::default()).unwrap();
        c.create_feature_table(&FeatureType::new("poi", "POINT", 4326), None)
            .unwrap();
        c
    }

    #[test]
    fn test_add_and_read_back() {
        let c = container();
        let doc = "<MD_Metadata>poi</MD_Metadata>";
        let id = c
            .add_metadata(
                &MetadataEntry::new(ISO, doc).with_scope("featureType"),
                &[MetadataReference::table("poi"), MetadataReference::column("poi", "geom")],
            )
            .unwrap();

        let entry = c.metadata(id).unwrap().unwrap();
        assert_eq!(entry.document, doc);
        assert_eq!(entry.scope, "featureType");

        let refs = c.metadata_references(id).unwrap();
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[1].scope, ReferenceScope::Column);
        assert_eq!(refs[1].metadata_id, Some(id));

        assert_eq!(c.metadata_for_table("poi").unwrap().len(), 1);
        assert!(c.metadata_for_table("other").unwrap().is_empty());
    }

    #[test]
    fn test_bad_reference_rolls_back() {
        let c = container();
        // Column does not exist, so the standard trigger aborts the insert
        let result = c.add_metadata(
            &MetadataEntry::new(ISO, "<x/>"),
            &[MetadataReference::column("poi", "no_such_column")],
        );
        assert!(result.is_err());
        assert_eq!(
            c.store().query_i64("SELECT COUNT(*) FROM gpkg_metadata", &[]).unwrap(),
            Some(0)
        );
    }

    #[test]
    fn test_validation_before_write() {
        let c = container();
        let bad_scope = MetadataEntry::new(ISO, "").with_scope("everything");
        assert!(c.add_metadata(&bad_scope, &[]).is_err());

        let mut inconsistent = MetadataReference::geopackage();
        inconsistent.row_id = Some(3);
        assert!(c
            .add_metadata(&MetadataEntry::new(ISO, ""), &[inconsistent])
            .is_err());
    }
}
