//! Catalog / schema manager
//!
//! Owns the fixed set of system tables, views and standard triggers, the
//! default spatial reference rows and the container format marker. Every
//! other module reads and writes catalog rows through the typed entries and
//! statement builders here.
//!
//! # Invariants
//!
//! - The schema is installed in one atomic batch
//! - Spatial reference rows are never modified once inserted
//! - A table is registered in `gpkg_contents` before any row that references it

mod entries;
mod schema;

pub use entries::{
    format_timestamp, parse_timestamp, ConstraintType, ContentsEntry, DataColumnConstraint,
    DataColumnEntry, DataType, ExtensionEntry, GeometryColumnEntry, SpatialRefEntry,
    TIMESTAMP_FORMAT,
};
pub use schema::{COMPANION_VIEWS, MANDATED_TABLES};

use chrono::{DateTime, Utc};

use crate::errors::{GpkgError, GpkgResult};
use crate::observability::{log_event, Event, ObservationScope};
use crate::store::{read_header_application_id, write_header_application_id, SqlStatement, Store};
use crate::tiles::{TileMatrix, TileMatrixSet, TilePyramid};
use crate::value::Value;

/// Extension name recorded for R-tree spatial indexes
pub const RTREE_EXTENSION: &str = "gpkg_rtree_index";
pub const RTREE_EXTENSION_DEFINITION: &str = "http://www.geopackage.org/spec120/#extension_rtree";
pub const RTREE_EXTENSION_SCOPE: &str = "write-only";

/// Installs every system table, view, trigger and default SRS row in one batch
pub fn install(store: &Store) -> GpkgResult<()> {
    let scope = ObservationScope::new("CATALOG_INSTALL");

    let mut statements: Vec<SqlStatement> = schema::TABLES
        .iter()
        .chain(schema::VIEWS.iter())
        .map(|sql| SqlStatement::new(*sql))
        .collect();
    statements.extend(schema::standard_triggers().into_iter().map(SqlStatement::new));
    for srs in &schema::DEFAULT_SRS {
        statements.push(spatial_ref_insert(&SpatialRefEntry {
            srs_name: srs.name.to_string(),
            srs_id: srs.srs_id,
            organization: srs.organization.to_string(),
            organization_coordsys_id: srs.organization_coordsys_id,
            definition: srs.definition.to_string(),
            description: Some(srs.description.to_string()),
        }));
    }

    match store.execute_atomic(&statements) {
        Ok(()) => {
            scope.complete();
            Ok(())
        }
        Err(e) => {
            scope.fail(e.message());
            Err(e)
        }
    }
}

/// Writes the format marker as a store setting, falling back to the raw
/// file header when the setting does not read back.
pub fn write_marker(store: &Store, application_id: u32, user_version: i32) -> GpkgResult<()> {
    store.set_application_id(application_id)?;
    store.set_user_version(user_version)?;
    if store.application_id()? == application_id {
        return Ok(());
    }
    if let Some(path) = store.path() {
        write_header_application_id(path, application_id)?;
        log_event(
            Event::MarkerWrittenToHeader,
            &[("path", path.display().to_string().as_str())],
        );
    }
    Ok(())
}

/// Whether the container carries `application_id` as setting or header
pub fn has_marker(store: &Store, application_id: u32) -> GpkgResult<bool> {
    if store.application_id()? == application_id {
        return Ok(true);
    }
    match store.path() {
        Some(path) => Ok(read_header_application_id(path)? == Some(application_id)),
        None => Ok(false),
    }
}

/// CREATE TABLE statement of the `index`-th mandated table
pub(crate) fn system_table_ddl(index: usize) -> &'static str {
    schema::TABLES[index]
}

/// Mandated system tables that do not exist
pub fn missing_tables(store: &Store) -> GpkgResult<Vec<&'static str>> {
    let mut missing = Vec::new();
    for table in MANDATED_TABLES {
        if !store.table_exists(table)? {
            missing.push(table);
        }
    }
    Ok(missing)
}

// Spatial references

pub fn spatial_ref(store: &Store, srs_id: i32) -> GpkgResult<Option<SpatialRefEntry>> {
    let set = store.query(
        "SELECT * FROM gpkg_spatial_ref_sys WHERE srs_id = ?",
        &[Value::from(srs_id)],
    )?;
    set.first().map(|row| SpatialRefEntry::from_row(&row)).transpose()
}

pub fn spatial_refs(store: &Store) -> GpkgResult<Vec<SpatialRefEntry>> {
    let set = store.query("SELECT * FROM gpkg_spatial_ref_sys ORDER BY srs_id", &[])?;
    set.iter().map(|row| SpatialRefEntry::from_row(&row)).collect()
}

pub(crate) fn spatial_ref_insert(entry: &SpatialRefEntry) -> SqlStatement {
    SqlStatement::with_params(
        "INSERT INTO gpkg_spatial_ref_sys
            (srs_name, srs_id, organization, organization_coordsys_id, definition, description)
         VALUES (?, ?, ?, ?, ?, ?)",
        vec![
            Value::from(entry.srs_name.as_str()),
            Value::from(entry.srs_id),
            Value::from(entry.organization.as_str()),
            Value::from(entry.organization_coordsys_id),
            Value::from(entry.definition.as_str()),
            Value::from(entry.description.clone()),
        ],
    )
}

/// Registers a spatial reference.
///
/// Re-registering an identical entry is a no-op; a different entry under an
/// existing id is rejected.
pub fn add_spatial_ref(store: &Store, entry: &SpatialRefEntry) -> GpkgResult<()> {
    if let Some(existing) = spatial_ref(store, entry.srs_id)? {
        if existing == *entry {
            return Ok(());
        }
        return Err(GpkgError::validation(format!(
            "Spatial reference {} is already registered as '{}'",
            entry.srs_id, existing.srs_name
        )));
    }
    let stmt = spatial_ref_insert(entry);
    store.execute(&stmt.sql, &stmt.params)?;
    Ok(())
}

// Contents

pub fn contents(store: &Store, table: &str) -> GpkgResult<Option<ContentsEntry>> {
    let set = store.query(
        "SELECT * FROM gpkg_contents WHERE table_name = ?",
        &[Value::from(table)],
    )?;
    set.first().map(|row| ContentsEntry::from_row(&row)).transpose()
}

/// Registered table names, optionally filtered by data type
pub fn table_names(store: &Store, kind: Option<DataType>) -> GpkgResult<Vec<String>> {
    let set = match kind {
        Some(kind) => store.query(
            "SELECT table_name FROM gpkg_contents WHERE data_type = ? ORDER BY table_name",
            &[Value::from(kind.as_str())],
        )?,
        None => store.query("SELECT table_name FROM gpkg_contents ORDER BY table_name", &[])?,
    };
    Ok(set.iter().filter_map(|row| row.text("table_name")).collect())
}

pub(crate) fn contents_insert(entry: &ContentsEntry) -> SqlStatement {
    let (min_x, min_y, max_x, max_y) = match entry.bounds {
        Some(b) => (
            Value::Real(b.min_x),
            Value::Real(b.min_y),
            Value::Real(b.max_x),
            Value::Real(b.max_y),
        ),
        None => (Value::Null, Value::Null, Value::Null, Value::Null),
    };
    let last_change = format_timestamp(entry.last_change.unwrap_or_else(Utc::now));
    SqlStatement::with_params(
        "INSERT INTO gpkg_contents
            (table_name, data_type, identifier, description, last_change,
             min_x, min_y, max_x, max_y, srs_id)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        vec![
            Value::from(entry.table_name.as_str()),
            Value::from(entry.data_type.as_str()),
            Value::from(entry.identifier.clone()),
            Value::from(entry.description.clone().unwrap_or_default()),
            Value::from(last_change),
            min_x,
            min_y,
            max_x,
            max_y,
            Value::from(entry.srs_id),
        ],
    )
}

pub(crate) fn touch_statement(table: &str, at: DateTime<Utc>) -> SqlStatement {
    SqlStatement::with_params(
        "UPDATE gpkg_contents SET last_change = ? WHERE table_name = ?",
        vec![Value::from(format_timestamp(at)), Value::from(table)],
    )
}

/// Sets the table's last-modified timestamp to now
pub fn touch(store: &Store, table: &str) -> GpkgResult<DateTime<Utc>> {
    let now = Utc::now();
    let stmt = touch_statement(table, now);
    if store.execute(&stmt.sql, &stmt.params)? == 0 {
        return Err(GpkgError::not_found("table", table));
    }
    Ok(now)
}

// Geometry columns

pub fn geometry_column(store: &Store, table: &str) -> GpkgResult<Option<GeometryColumnEntry>> {
    let set = store.query(
        "SELECT * FROM gpkg_geometry_columns WHERE table_name = ?",
        &[Value::from(table)],
    )?;
    set.first().map(|row| GeometryColumnEntry::from_row(&row)).transpose()
}

pub(crate) fn geometry_column_insert(entry: &GeometryColumnEntry) -> SqlStatement {
    SqlStatement::with_params(
        "INSERT INTO gpkg_geometry_columns
            (table_name, column_name, geometry_type_name, srs_id, z, m)
         VALUES (?, ?, ?, ?, ?, ?)",
        vec![
            Value::from(entry.table_name.as_str()),
            Value::from(entry.column_name.as_str()),
            Value::from(entry.geometry_type_name.as_str()),
            Value::from(entry.srs_id),
            Value::Integer(entry.z as i64),
            Value::Integer(entry.m as i64),
        ],
    )
}

// Data columns and constraints

pub fn data_columns(store: &Store, table: &str) -> GpkgResult<Vec<DataColumnEntry>> {
    let set = store.query(
        "SELECT * FROM gpkg_data_columns WHERE table_name = ?",
        &[Value::from(table)],
    )?;
    set.iter().map(|row| DataColumnEntry::from_row(&row)).collect()
}

pub(crate) fn data_column_insert(entry: &DataColumnEntry) -> SqlStatement {
    SqlStatement::with_params(
        "INSERT INTO gpkg_data_columns
            (table_name, column_name, name, title, description, mime_type, constraint_name)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
        vec![
            Value::from(entry.table_name.as_str()),
            Value::from(entry.column_name.as_str()),
            Value::from(entry.name.clone()),
            Value::from(entry.title.clone()),
            Value::from(entry.description.clone()),
            Value::from(entry.mime_type.clone()),
            Value::from(entry.constraint_name.clone()),
        ],
    )
}

/// Every row registered under `name`; enum constraints span several rows
pub fn constraints(store: &Store, name: &str) -> GpkgResult<Vec<DataColumnConstraint>> {
    let set = store.query(
        "SELECT * FROM gpkg_data_column_constraints WHERE constraint_name = ?",
        &[Value::from(name)],
    )?;
    set.iter().map(|row| DataColumnConstraint::from_row(&row)).collect()
}

pub fn add_constraint(store: &Store, constraint: &DataColumnConstraint) -> GpkgResult<()> {
    if constraint.constraint_type == ConstraintType::Range
        && constraint.min.is_none()
        && constraint.max.is_none()
    {
        return Err(GpkgError::validation(format!(
            "Range constraint '{}' needs a minimum or maximum",
            constraint.constraint_name
        )));
    }
    if constraint.constraint_type != ConstraintType::Range && constraint.value.is_none() {
        return Err(GpkgError::validation(format!(
            "{} constraint '{}' needs a value",
            constraint.constraint_type.as_str(),
            constraint.constraint_name
        )));
    }
    let flag = |v: Option<bool>| v.map(|b| Value::Integer(b as i64)).unwrap_or(Value::Null);
    store.execute(
        "INSERT INTO gpkg_data_column_constraints
            (constraint_name, constraint_type, value, min, min_is_inclusive,
             max, max_is_inclusive, description)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        &[
            Value::from(constraint.constraint_name.as_str()),
            Value::from(constraint.constraint_type.as_str()),
            Value::from(constraint.value.clone()),
            Value::from(constraint.min),
            flag(constraint.min_is_inclusive),
            Value::from(constraint.max),
            flag(constraint.max_is_inclusive),
            Value::from(constraint.description.clone()),
        ],
    )?;
    Ok(())
}

/// Attaches a registered constraint to a column
pub fn assign_constraint(store: &Store, table: &str, column: &str, name: &str) -> GpkgResult<()> {
    if constraints(store, name)?.is_empty() {
        return Err(GpkgError::not_found("constraint", name));
    }
    let updated = store.execute(
        "UPDATE gpkg_data_columns SET constraint_name = ? WHERE table_name = ? AND column_name = ?",
        &[Value::from(name), Value::from(table), Value::from(column)],
    )?;
    if updated == 0 {
        return Err(GpkgError::not_found("column", &format!("{}.{}", table, column)));
    }
    Ok(())
}

// Extensions

/// Extensions registered for `table`, plus container-wide ones
pub fn extensions(store: &Store, table: &str) -> GpkgResult<Vec<ExtensionEntry>> {
    let set = store.query(
        "SELECT * FROM gpkg_extensions WHERE table_name = ? OR table_name IS NULL",
        &[Value::from(table)],
    )?;
    set.iter().map(|row| ExtensionEntry::from_row(&row)).collect()
}

pub(crate) fn extension_insert(entry: &ExtensionEntry) -> SqlStatement {
    SqlStatement::with_params(
        "INSERT INTO gpkg_extensions
            (table_name, column_name, extension_name, definition, scope)
         VALUES (?, ?, ?, ?, ?)",
        vec![
            Value::from(entry.table_name.clone()),
            Value::from(entry.column_name.clone()),
            Value::from(entry.extension_name.as_str()),
            Value::from(entry.definition.as_str()),
            Value::from(entry.scope.as_str()),
        ],
    )
}

// Tile matrices

pub fn tile_pyramid(store: &Store, table: &str) -> GpkgResult<Option<TilePyramid>> {
    let set = store.query(
        "SELECT * FROM gpkg_tile_matrix_set WHERE table_name = ?",
        &[Value::from(table)],
    )?;
    let Some(row) = set.first() else {
        return Ok(None);
    };
    let matrix_set = entries::tile_matrix_set_from_row(&row)?;

    let rows = store.query(
        "SELECT * FROM gpkg_tile_matrix WHERE table_name = ? ORDER BY zoom_level",
        &[Value::from(table)],
    )?;
    let matrices = rows
        .iter()
        .map(|row| entries::tile_matrix_from_row(&row))
        .collect::<GpkgResult<Vec<_>>>()?;
    Ok(Some(TilePyramid::new(matrix_set, matrices)))
}

pub(crate) fn tile_matrix_set_insert(set: &TileMatrixSet) -> SqlStatement {
    SqlStatement::with_params(
        "INSERT INTO gpkg_tile_matrix_set (table_name, srs_id, min_x, min_y, max_x, max_y)
         VALUES (?, ?, ?, ?, ?, ?)",
        vec![
            Value::from(set.table_name.as_str()),
            Value::from(set.srs_id),
            Value::Real(set.bounds.min_x),
            Value::Real(set.bounds.min_y),
            Value::Real(set.bounds.max_x),
            Value::Real(set.bounds.max_y),
        ],
    )
}

pub(crate) fn tile_matrix_insert(table: &str, matrix: &TileMatrix) -> SqlStatement {
    SqlStatement::with_params(
        "INSERT INTO gpkg_tile_matrix
            (table_name, zoom_level, matrix_width, matrix_height, tile_width, tile_height,
             pixel_x_size, pixel_y_size)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        vec![
            Value::from(table),
            Value::from(matrix.zoom_level),
            Value::from(matrix.matrix_width),
            Value::from(matrix.matrix_height),
            Value::from(matrix.tile_width),
            Value::from(matrix.tile_height),
            Value::Real(matrix.pixel_x_size),
            Value::Real(matrix.pixel_y_size),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn installed() -> Store {
        let store = Store::open_in_memory().unwrap();
        install(&store).unwrap();
        store
    }

    #[test]
    fn test_install_creates_everything() {
        let store = installed();
        assert!(missing_tables(&store).unwrap().is_empty());
        for view in COMPANION_VIEWS {
            assert!(store.table_exists(view).unwrap(), "{}", view);
        }
        let ids: Vec<i32> = spatial_refs(&store).unwrap().iter().map(|s| s.srs_id).collect();
        assert_eq!(ids, vec![-1, 0, 3395, 3857, 4326]);
    }

    #[test]
    fn test_install_is_atomic() {
        let store = Store::open_in_memory().unwrap();
        store.execute("CREATE TABLE gpkg_extensions (x)", &[]).unwrap();
        assert!(install(&store).is_err());
        assert!(!store.table_exists("gpkg_spatial_ref_sys").unwrap());
    }

    #[test]
    fn test_add_spatial_ref_is_immutable() {
        let store = installed();
        let mut entry = spatial_ref(&store, 4326).unwrap().unwrap();
        add_spatial_ref(&store, &entry).unwrap();

        entry.srs_name = "renamed".into();
        let err = add_spatial_ref(&store, &entry).unwrap_err();
        assert_eq!(err.code().code(), "GPKG_VALIDATION_FAILED");
    }

    #[test]
    fn test_marker_in_memory() {
        let store = installed();
        write_marker(&store, 0x4750_4B47, 10200).unwrap();
        assert!(has_marker(&store, 0x4750_4B47).unwrap());
        assert_eq!(store.user_version().unwrap(), 10200);
    }

    #[test]
    fn test_tile_matrix_trigger_rejects_zero_width() {
        let store = installed();
        let bad = TileMatrix {
            zoom_level: 0,
            matrix_width: 0,
            matrix_height: 1,
            tile_width: 256,
            tile_height: 256,
            pixel_x_size: 1.0,
            pixel_y_size: 1.0,
        };
        let stmt = tile_matrix_insert("t", &bad);
        assert!(store.execute(&stmt.sql, &stmt.params).is_err());
    }

    #[test]
    fn test_constraint_registration() {
        let store = installed();
        add_constraint(&store, &DataColumnConstraint::enum_value("color", "red")).unwrap();
        add_constraint(&store, &DataColumnConstraint::enum_value("color", "blue")).unwrap();
        assert_eq!(constraints(&store, "color").unwrap().len(), 2);

        let empty_range = DataColumnConstraint::range("r", None, None);
        assert!(add_constraint(&store, &empty_range).is_err());
    }
}
