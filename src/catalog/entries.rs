//! Typed catalog rows
//!
//! Each struct names the columns it reads; `from_row` rejects rows missing
//! a NOT NULL column instead of defaulting it.

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::errors::{GpkgError, GpkgResult};
use crate::geometry::Envelope;
use crate::store::RowView;

fn required_text(row: &RowView<'_>, table: &str, column: &str) -> GpkgResult<String> {
    row.text(column)
        .ok_or_else(|| GpkgError::decode(format!("{}.{} is NULL", table, column)))
}

fn required_i64(row: &RowView<'_>, table: &str, column: &str) -> GpkgResult<i64> {
    row.i64(column)
        .ok_or_else(|| GpkgError::decode(format!("{}.{} is not an integer", table, column)))
}

fn required_f64(row: &RowView<'_>, table: &str, column: &str) -> GpkgResult<f64> {
    row.f64(column)
        .ok_or_else(|| GpkgError::decode(format!("{}.{} is not a number", table, column)))
}

/// Timestamp format used by every catalog `DATETIME` column
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Parses catalog timestamps, tolerating the SQLite `datetime()` form
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

/// A row of `gpkg_spatial_ref_sys`
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialRefEntry {
    pub srs_name: String,
    pub srs_id: i32,
    pub organization: String,
    pub organization_coordsys_id: i32,
    pub definition: String,
    pub description: Option<String>,
}

impl SpatialRefEntry {
    pub(crate) fn from_row(row: &RowView<'_>) -> GpkgResult<Self> {
        const T: &str = "gpkg_spatial_ref_sys";
        Ok(Self {
            srs_name: required_text(row, T, "srs_name")?,
            srs_id: required_i64(row, T, "srs_id")? as i32,
            organization: required_text(row, T, "organization")?,
            organization_coordsys_id: required_i64(row, T, "organization_coordsys_id")? as i32,
            definition: required_text(row, T, "definition")?,
            description: row.text("description"),
        })
    }
}

/// `gpkg_contents.data_type` values this engine writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Features,
    Tiles,
    Attributes,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Features => "features",
            DataType::Tiles => "tiles",
            DataType::Attributes => "attributes",
        }
    }

    pub fn parse(s: &str) -> Option<DataType> {
        match s.to_ascii_lowercase().as_str() {
            "features" => Some(DataType::Features),
            "tiles" => Some(DataType::Tiles),
            "attributes" => Some(DataType::Attributes),
            _ => None,
        }
    }
}

/// A row of `gpkg_contents`
#[derive(Debug, Clone, PartialEq)]
pub struct ContentsEntry {
    pub table_name: String,
    /// Raw data type; extensions may register their own values
    pub data_type: String,
    pub identifier: Option<String>,
    pub description: Option<String>,
    pub last_change: Option<DateTime<Utc>>,
    /// Declared bounds; `None` when any ordinate is NULL
    pub bounds: Option<Envelope>,
    pub srs_id: Option<i32>,
}

impl ContentsEntry {
    pub(crate) fn from_row(row: &RowView<'_>) -> GpkgResult<Self> {
        const T: &str = "gpkg_contents";
        let bounds = match (row.f64("min_x"), row.f64("max_x"), row.f64("min_y"), row.f64("max_y")) {
            (Some(min_x), Some(max_x), Some(min_y), Some(max_y)) => {
                Some(Envelope::new(min_x, max_x, min_y, max_y))
            }
            _ => None,
        };
        Ok(Self {
            table_name: required_text(row, T, "table_name")?,
            data_type: required_text(row, T, "data_type")?,
            identifier: row.text("identifier"),
            description: row.text("description"),
            last_change: row.text("last_change").as_deref().and_then(parse_timestamp),
            bounds,
            srs_id: row.i64("srs_id").map(|v| v as i32),
        })
    }

    pub fn kind(&self) -> Option<DataType> {
        DataType::parse(&self.data_type)
    }
}

/// A row of `gpkg_geometry_columns`
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryColumnEntry {
    pub table_name: String,
    pub column_name: String,
    pub geometry_type_name: String,
    pub srs_id: i32,
    /// 0 prohibited, 1 mandatory, 2 optional
    pub z: u8,
    pub m: u8,
}

impl GeometryColumnEntry {
    pub(crate) fn from_row(row: &RowView<'_>) -> GpkgResult<Self> {
        const T: &str = "gpkg_geometry_columns";
        Ok(Self {
            table_name: required_text(row, T, "table_name")?,
            column_name: required_text(row, T, "column_name")?,
            geometry_type_name: required_text(row, T, "geometry_type_name")?,
            srs_id: required_i64(row, T, "srs_id")? as i32,
            z: required_i64(row, T, "z")? as u8,
            m: required_i64(row, T, "m")? as u8,
        })
    }
}

/// A row of `gpkg_data_columns`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataColumnEntry {
    pub table_name: String,
    pub column_name: String,
    pub name: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub mime_type: Option<String>,
    pub constraint_name: Option<String>,
}

impl DataColumnEntry {
    pub(crate) fn from_row(row: &RowView<'_>) -> GpkgResult<Self> {
        const T: &str = "gpkg_data_columns";
        Ok(Self {
            table_name: required_text(row, T, "table_name")?,
            column_name: required_text(row, T, "column_name")?,
            name: row.text("name"),
            title: row.text("title"),
            description: row.text("description"),
            mime_type: row.text("mime_type"),
            constraint_name: row.text("constraint_name"),
        })
    }
}

/// Kind of a column value constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintType {
    /// Numeric interval
    Range,
    /// One of a set of registered values
    Enum,
    /// SQLite GLOB pattern
    Glob,
}

impl ConstraintType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConstraintType::Range => "range",
            ConstraintType::Enum => "enum",
            ConstraintType::Glob => "glob",
        }
    }

    pub fn parse(s: &str) -> Option<ConstraintType> {
        match s.to_ascii_lowercase().as_str() {
            "range" => Some(ConstraintType::Range),
            "enum" => Some(ConstraintType::Enum),
            "glob" => Some(ConstraintType::Glob),
            _ => None,
        }
    }
}

/// A row of `gpkg_data_column_constraints`.
///
/// Enum constraints are stored as one row per allowed value.
#[derive(Debug, Clone, PartialEq)]
pub struct DataColumnConstraint {
    pub constraint_name: String,
    pub constraint_type: ConstraintType,
    /// Enum value or glob pattern
    pub value: Option<String>,
    pub min: Option<f64>,
    pub min_is_inclusive: Option<bool>,
    pub max: Option<f64>,
    pub max_is_inclusive: Option<bool>,
    pub description: Option<String>,
}

impl DataColumnConstraint {
    /// Numeric interval; `None` bounds are open-ended
    pub fn range(
        name: &str,
        min: Option<(f64, bool)>,
        max: Option<(f64, bool)>,
    ) -> Self {
        Self {
            constraint_name: name.to_string(),
            constraint_type: ConstraintType::Range,
            value: None,
            min: min.map(|(v, _)| v),
            min_is_inclusive: min.map(|(_, inclusive)| inclusive),
            max: max.map(|(v, _)| v),
            max_is_inclusive: max.map(|(_, inclusive)| inclusive),
            description: None,
        }
    }

    /// One allowed value of an enum constraint
    pub fn enum_value(name: &str, value: &str) -> Self {
        Self {
            constraint_name: name.to_string(),
            constraint_type: ConstraintType::Enum,
            value: Some(value.to_string()),
            min: None,
            min_is_inclusive: None,
            max: None,
            max_is_inclusive: None,
            description: None,
        }
    }

    pub fn glob(name: &str, pattern: &str) -> Self {
        Self {
            constraint_type: ConstraintType::Glob,
            ..Self::enum_value(name, pattern)
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub(crate) fn from_row(row: &RowView<'_>) -> GpkgResult<Self> {
        const T: &str = "gpkg_data_column_constraints";
        let raw_type = required_text(row, T, "constraint_type")?;
        let constraint_type = ConstraintType::parse(&raw_type).ok_or_else(|| {
            GpkgError::decode(format!("Unknown constraint type '{}'", raw_type))
        })?;
        Ok(Self {
            constraint_name: required_text(row, T, "constraint_name")?,
            constraint_type,
            value: row.text("value"),
            min: row.f64("min"),
            min_is_inclusive: row.i64("min_is_inclusive").map(|v| v != 0),
            max: row.f64("max"),
            max_is_inclusive: row.i64("max_is_inclusive").map(|v| v != 0),
            description: row.text("description"),
        })
    }
}

/// A row of `gpkg_extensions`
#[derive(Debug, Clone, PartialEq)]
pub struct ExtensionEntry {
    pub table_name: Option<String>,
    pub column_name: Option<String>,
    pub extension_name: String,
    pub definition: String,
    pub scope: String,
}

impl ExtensionEntry {
    pub(crate) fn from_row(row: &RowView<'_>) -> GpkgResult<Self> {
        const T: &str = "gpkg_extensions";
        Ok(Self {
            table_name: row.text("table_name"),
            column_name: row.text("column_name"),
            extension_name: required_text(row, T, "extension_name")?,
            definition: required_text(row, T, "definition")?,
            scope: required_text(row, T, "scope")?,
        })
    }
}

/// A row of `gpkg_tile_matrix_set`
pub(crate) fn tile_matrix_set_from_row(row: &RowView<'_>) -> GpkgResult<crate::tiles::TileMatrixSet> {
    const T: &str = "gpkg_tile_matrix_set";
    Ok(crate::tiles::TileMatrixSet {
        table_name: required_text(row, T, "table_name")?,
        srs_id: required_i64(row, T, "srs_id")? as i32,
        bounds: Envelope::new(
            required_f64(row, T, "min_x")?,
            required_f64(row, T, "max_x")?,
            required_f64(row, T, "min_y")?,
            required_f64(row, T, "max_y")?,
        ),
    })
}

/// A row of `gpkg_tile_matrix`
pub(crate) fn tile_matrix_from_row(row: &RowView<'_>) -> GpkgResult<crate::tiles::TileMatrix> {
    const T: &str = "gpkg_tile_matrix";
    let unsigned = |column: &str| -> GpkgResult<u32> {
        let v = required_i64(row, T, column)?;
        u32::try_from(v)
            .map_err(|_| GpkgError::decode(format!("{}.{} out of range: {}", T, column, v)))
    };
    Ok(crate::tiles::TileMatrix {
        zoom_level: unsigned("zoom_level")?,
        matrix_width: unsigned("matrix_width")?,
        matrix_height: unsigned("matrix_height")?,
        tile_width: unsigned("tile_width")?,
        tile_height: unsigned("tile_height")?,
        pixel_x_size: required_f64(row, T, "pixel_x_size")?,
        pixel_y_size: required_f64(row, T, "pixel_y_size")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamp_round_trip() {
        let at = Utc.with_ymd_and_hms(2024, 5, 17, 8, 30, 0).unwrap();
        let text = format_timestamp(at);
        assert_eq!(text, "2024-05-17T08:30:00.000Z");
        assert_eq!(parse_timestamp(&text), Some(at));
        assert_eq!(parse_timestamp("2024-05-17 08:30:00"), Some(at));
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn test_constraint_builders() {
        let r = DataColumnConstraint::range("pct", Some((0.0, true)), Some((100.0, false)));
        assert_eq!(r.constraint_type, ConstraintType::Range);
        assert_eq!(r.max_is_inclusive, Some(false));

        let g = DataColumnConstraint::glob("code", "[A-Z][A-Z]");
        assert_eq!(g.constraint_type, ConstraintType::Glob);
        assert_eq!(g.value.as_deref(), Some("[A-Z][A-Z]"));
    }

    #[test]
    fn test_data_type_parse() {
        assert_eq!(DataType::parse("Features"), Some(DataType::Features));
        assert_eq!(DataType::parse("2d-gridded-coverage"), None);
        assert_eq!(ConstraintType::parse("GLOB"), Some(ConstraintType::Glob));
    }
}
