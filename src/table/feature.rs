//! Feature tables
//!
//! `create` registers the table, its geometry column, the feature-id index,
//! per-column metadata and (when available) the R-tree index in one atomic
//! batch. A second `create` for a registered table is a no-op.

use std::ops::Deref;
use std::sync::OnceLock;

use regex::Regex;

use crate::bbox::BoundingBox;
use crate::catalog::{
    self, ContentsEntry, DataColumnEntry, DataType, ExtensionEntry, GeometryColumnEntry,
    RTREE_EXTENSION, RTREE_EXTENSION_DEFINITION, RTREE_EXTENSION_SCOPE,
};
use crate::container::Container;
use crate::errors::{GpkgError, GpkgResult};
use crate::geometry::{is_known_geometry_type, read_envelope, Envelope};
use crate::observability::{log_event, Event, ObservationScope};
use crate::store::{quote_ident, Cursor, SqlStatement};
use crate::value::Value;

use super::descriptor::{FeatureInfo, FieldType, TableKind};
use super::feature_type::{negotiated_dimension, FeatureType};
use super::generic::Table;

/// Prefix of the unique index marking the feature-id column
pub const FEATURE_ID_INDEX_PREFIX: &str = "fid_";

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,127}$").expect("identifier pattern is valid")
    })
}

/// Rejects names that are not plain SQL identifiers
pub fn validate_identifier(kind: &str, name: &str) -> GpkgResult<()> {
    if !identifier_pattern().is_match(name) {
        return Err(GpkgError::validation(format!("Invalid {} name '{}'", kind, name)));
    }
    Ok(())
}

/// Name of the R-tree virtual table for a geometry column
pub fn rtree_table_name(table: &str, column: &str) -> String {
    format!("rtree_{}_{}", table, column)
}

/// Name of the unique index marking the feature-id column
pub fn feature_id_index_name(table: &str, column: &str) -> String {
    format!("{}{}_{}", FEATURE_ID_INDEX_PREFIX, table, column)
}

/// Handle on a feature table
#[derive(Debug, Clone)]
pub struct FeatureTable<'c> {
    table: Table<'c>,
    info: FeatureInfo,
}

impl<'c> Deref for FeatureTable<'c> {
    type Target = Table<'c>;

    fn deref(&self) -> &Table<'c> {
        &self.table
    }
}

impl<'c> FeatureTable<'c> {
    pub(crate) fn from_table(table: Table<'c>) -> GpkgResult<Self> {
        match table.kind().clone() {
            TableKind::Feature(info) => Ok(Self { table, info }),
            other => Err(GpkgError::validation(format!(
                "'{}' is a {} table, not a feature table",
                table.name(),
                other.name()
            ))),
        }
    }

    /// Registers a feature table for `feature_type`.
    ///
    /// Validates the geometry type, Z/M options, identifiers and spatial
    /// reference before emitting anything.
    pub fn create(
        container: &'c Container,
        feature_type: &FeatureType,
        bounds: Option<Envelope>,
    ) -> GpkgResult<FeatureTable<'c>> {
        let name = feature_type.table_name.as_str();
        validate_feature_type(feature_type)?;

        let store = container.store();
        if let Some(existing) = catalog::contents(store, name)? {
            if existing.kind() != Some(DataType::Features) {
                return Err(GpkgError::validation(format!(
                    "'{}' is already registered as {}",
                    name, existing.data_type
                )));
            }
            log_event(Event::TableAlreadyRegistered, &[("table", name)]);
            return container.feature_table(name);
        }
        if store.table_exists(name)? {
            return Err(GpkgError::validation(format!(
                "Table '{}' exists but is not registered in the catalog",
                name
            )));
        }
        if catalog::spatial_ref(store, feature_type.srs_id)?.is_none() {
            return Err(GpkgError::unknown_srs(feature_type.srs_id));
        }

        let spatial_index = container.supports_spatial_index();
        let statements = create_statements(feature_type, bounds, spatial_index);

        let scope = ObservationScope::with_fields("FEATURE_TABLE_CREATE", &[("table", name)]);
        if let Err(e) = store.execute_atomic(&statements) {
            scope.fail(e.message());
            return Err(e);
        }
        scope.complete();
        log_event(
            Event::TableCreated,
            &[
                ("kind", "feature"),
                ("spatial_index", if spatial_index { "true" } else { "false" }),
                ("table", name),
            ],
        );

        container.invalidate(name);
        container.feature_table(name)
    }

    pub fn geometry_column(&self) -> &GeometryColumnEntry {
        &self.info.geometry_column
    }

    /// R-tree table and extension row are both present
    pub fn has_spatial_index(&self) -> bool {
        self.info.spatial_index
    }

    pub fn rtree_name(&self) -> String {
        let g = self.geometry_column();
        rtree_table_name(&g.table_name, &g.column_name)
    }

    pub fn output_dimension(&self) -> GpkgResult<u8> {
        let g = self.geometry_column();
        negotiated_dimension(g.z, g.m)
    }

    /// Feature type rebuilt from the catalog
    pub fn feature_type(&self) -> FeatureType {
        let d = self.descriptor();
        let g = self.geometry_column();
        FeatureType {
            table_name: d.name.clone(),
            identifier: d.identifier.clone(),
            description: d.description.clone(),
            fields: d.fields.clone(),
            geometry_column: g.column_name.clone(),
            geometry_type: g.geometry_type_name.clone(),
            srs_id: g.srs_id,
            z: g.z,
            m: g.m,
        }
    }

    /// Declared bounds, else the bounds of the stored geometries.
    ///
    /// `None` for an empty table without declared bounds.
    pub fn extent(&self) -> GpkgResult<Option<BoundingBox>> {
        if let Some(declared) = self.descriptor().declared_bounds() {
            return Ok(Some(declared));
        }
        self.derived_extent()
    }

    /// Bounds computed from row data, ignoring the catalog
    pub fn derived_extent(&self) -> GpkgResult<Option<BoundingBox>> {
        let srs_id = self.geometry_column().srs_id;
        let organization = self.descriptor().organization.clone();

        let envelope = if self.has_spatial_index() {
            let sql = format!(
                "SELECT MIN(minx), MAX(maxx), MIN(miny), MAX(maxy) FROM {}",
                quote_ident(&self.rtree_name())
            );
            let set = self.container().store().query(&sql, &[])?;
            set.rows().first().and_then(|r| {
                match (r[0].as_f64(), r[1].as_f64(), r[2].as_f64(), r[3].as_f64()) {
                    (Some(a), Some(b), Some(c), Some(d)) => Some(Envelope::new(a, b, c, d)),
                    _ => None,
                }
            })
        } else {
            self.scan_extent()?
        };
        Ok(envelope.map(|e| BoundingBox::from_envelope(&e, srs_id, &organization)))
    }

    fn scan_extent(&self) -> GpkgResult<Option<Envelope>> {
        let geom = self.geometry_column().column_name.clone();
        let columns = format!("{}, {}", quote_ident(self.primary_key()), quote_ident(&geom));
        let spec = self.page_spec(None, Vec::new(), &columns);
        let mut cursor = self.container().store().open_paged(spec)?;

        let mut extent: Option<Envelope> = None;
        while cursor.advance()? {
            let Some(blob) = cursor.get_by_name(&geom).and_then(Value::as_blob) else {
                continue;
            };
            if let Some(e) = read_envelope(blob)? {
                extent = Some(match extent {
                    Some(mut acc) => {
                        acc.min_x = acc.min_x.min(e.min_x);
                        acc.max_x = acc.max_x.max(e.max_x);
                        acc.min_y = acc.min_y.min(e.min_y);
                        acc.max_y = acc.max_y.max(e.max_y);
                        acc
                    }
                    None => e,
                });
            }
        }
        Ok(extent)
    }
}

fn validate_feature_type(feature_type: &FeatureType) -> GpkgResult<()> {
    let name = feature_type.table_name.as_str();
    validate_identifier("table", name)?;
    if name.to_ascii_lowercase().starts_with("gpkg_") || name.to_ascii_lowercase().starts_with("rtree_") {
        return Err(GpkgError::validation(format!("Table name '{}' is reserved", name)));
    }
    if !is_known_geometry_type(&feature_type.geometry_type) {
        return Err(GpkgError::validation(format!(
            "Unknown geometry type '{}'",
            feature_type.geometry_type
        )));
    }
    feature_type.output_dimension()?;

    let mut seen = std::collections::HashSet::new();
    for field in &feature_type.fields {
        validate_identifier("column", &field.name)?;
        if !seen.insert(field.name.to_ascii_lowercase()) {
            return Err(GpkgError::validation(format!(
                "Duplicate column '{}' in '{}'",
                field.name, name
            )));
        }
    }

    let keys: Vec<_> = feature_type.fields.iter().filter(|f| f.primary_key).collect();
    if keys.len() != 1 || keys[0].field_type != FieldType::Integer {
        return Err(GpkgError::validation(format!(
            "'{}' needs exactly one integer primary key",
            name
        )));
    }
    let geometry_fields: Vec<_> = feature_type.fields.iter().filter(|f| f.is_geometry()).collect();
    if geometry_fields.len() != 1
        || !geometry_fields[0].name.eq_ignore_ascii_case(&feature_type.geometry_column)
    {
        return Err(GpkgError::validation(format!(
            "'{}' needs exactly one geometry column named '{}'",
            name, feature_type.geometry_column
        )));
    }
    if feature_type.fields.iter().filter(|f| f.feature_id).count() > 1 {
        return Err(GpkgError::validation(format!(
            "'{}' declares more than one feature-id column",
            name
        )));
    }
    Ok(())
}

fn create_statements(
    feature_type: &FeatureType,
    bounds: Option<Envelope>,
    spatial_index: bool,
) -> Vec<SqlStatement> {
    let table = feature_type.table_name.as_str();
    let quoted = quote_ident(table);
    let mut statements = Vec::new();

    let columns: Vec<String> = feature_type.fields.iter().map(|f| f.column_sql()).collect();
    statements.push(SqlStatement::new(format!(
        "CREATE TABLE {} ({})",
        quoted,
        columns.join(", ")
    )));

    statements.push(catalog::contents_insert(&ContentsEntry {
        table_name: table.to_string(),
        data_type: DataType::Features.as_str().to_string(),
        identifier: Some(feature_type.identifier.clone().unwrap_or_else(|| table.to_string())),
        description: feature_type.description.clone(),
        last_change: None,
        bounds,
        srs_id: Some(feature_type.srs_id),
    }));

    statements.push(catalog::geometry_column_insert(&GeometryColumnEntry {
        table_name: table.to_string(),
        column_name: feature_type.geometry_column.clone(),
        geometry_type_name: feature_type.geometry_type.to_ascii_uppercase(),
        srs_id: feature_type.srs_id,
        z: feature_type.z,
        m: feature_type.m,
    }));

    if let Some(id_field) = feature_type.feature_id_field() {
        statements.push(SqlStatement::new(format!(
            "CREATE UNIQUE INDEX {} ON {} ({})",
            quote_ident(&feature_id_index_name(table, &id_field.name)),
            quoted,
            quote_ident(&id_field.name)
        )));
    }

    for field in feature_type.fields.iter().filter(|f| !f.primary_key) {
        statements.push(catalog::data_column_insert(&DataColumnEntry {
            table_name: table.to_string(),
            column_name: field.name.clone(),
            name: Some(field.display_name.clone().unwrap_or_else(|| field.name.clone())),
            title: field.title.clone(),
            description: field.description.clone(),
            mime_type: field.mime_type.clone(),
            constraint_name: field.constraint_name.clone(),
        }));
    }

    if spatial_index {
        let key = feature_type
            .primary_key()
            .map(|f| f.name.as_str())
            .unwrap_or("fid");
        statements.extend(
            rtree_statements(table, &feature_type.geometry_column, key)
                .into_iter()
                .map(SqlStatement::new),
        );
        statements.push(catalog::extension_insert(&ExtensionEntry {
            table_name: Some(table.to_string()),
            column_name: Some(feature_type.geometry_column.clone()),
            extension_name: RTREE_EXTENSION.to_string(),
            definition: RTREE_EXTENSION_DEFINITION.to_string(),
            scope: RTREE_EXTENSION_SCOPE.to_string(),
        }));
    }
    statements
}

/// R-tree virtual table plus the six triggers keeping it in sync with
/// non-empty geometries
pub(crate) fn rtree_statements(table: &str, column: &str, key: &str) -> Vec<String> {
    let rtree = quote_ident(&rtree_table_name(table, column));
    let trigger = |suffix: &str| quote_ident(&format!("{}_{}", rtree_table_name(table, column), suffix));
    let t = quote_ident(table);
    let c = quote_ident(column);
    let i = quote_ident(key);
    let values = format!(
        "NEW.{i}, ST_MinX(NEW.{c}), ST_MaxX(NEW.{c}), ST_MinY(NEW.{c}), ST_MaxY(NEW.{c})",
        i = i,
        c = c
    );

    vec![
        format!("CREATE VIRTUAL TABLE {} USING rtree(id, minx, maxx, miny, maxy)", rtree),
        format!(
            "CREATE TRIGGER {trg} AFTER INSERT ON {t}
             WHEN (NEW.{c} NOT NULL AND NOT ST_IsEmpty(NEW.{c}))
             BEGIN
                 INSERT OR REPLACE INTO {r} VALUES ({v});
             END",
            trg = trigger("insert"),
            t = t,
            c = c,
            r = rtree,
            v = values
        ),
        format!(
            "CREATE TRIGGER {trg} AFTER UPDATE OF {c} ON {t}
             WHEN OLD.{i} = NEW.{i} AND (NEW.{c} NOTNULL AND NOT ST_IsEmpty(NEW.{c}))
             BEGIN
                 INSERT OR REPLACE INTO {r} VALUES ({v});
             END",
            trg = trigger("update1"),
            t = t,
            c = c,
            i = i,
            r = rtree,
            v = values
        ),
        format!(
            "CREATE TRIGGER {trg} AFTER UPDATE OF {c} ON {t}
             WHEN OLD.{i} = NEW.{i} AND (NEW.{c} ISNULL OR ST_IsEmpty(NEW.{c}))
             BEGIN
                 DELETE FROM {r} WHERE id = OLD.{i};
             END",
            trg = trigger("update2"),
            t = t,
            c = c,
            i = i,
            r = rtree
        ),
        format!(
            "CREATE TRIGGER {trg} AFTER UPDATE ON {t}
             WHEN OLD.{i} != NEW.{i} AND (NEW.{c} NOTNULL AND NOT ST_IsEmpty(NEW.{c}))
             BEGIN
                 DELETE FROM {r} WHERE id = OLD.{i};
                 INSERT OR REPLACE INTO {r} VALUES ({v});
             END",
            trg = trigger("update3"),
            t = t,
            c = c,
            i = i,
            r = rtree,
            v = values
        ),
        format!(
            "CREATE TRIGGER {trg} AFTER UPDATE ON {t}
             WHEN OLD.{i} != NEW.{i} AND (NEW.{c} ISNULL OR ST_IsEmpty(NEW.{c}))
             BEGIN
                 DELETE FROM {r} WHERE id IN (OLD.{i}, NEW.{i});
             END",
            trg = trigger("update4"),
            t = t,
            c = c,
            i = i,
            r = rtree
        ),
        format!(
            "CREATE TRIGGER {trg} AFTER DELETE ON {t}
             WHEN OLD.{c} NOT NULL
             BEGIN
                 DELETE FROM {r} WHERE id = OLD.{i};
             END",
            trg = trigger("delete"),
            t = t,
            c = c,
            i = i,
            r = rtree
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ContainerConfig;
    use crate::geometry::GeometryValue;
    use crate::table::{FieldDescriptor, FieldType};

    fn poi_type() -> FeatureType {
        FeatureType::new("poi", "POINT", 4326)
            .with_id_field("code")
            .with_field(FieldDescriptor::new("name", FieldType::Text).with_title("Name"))
    }

    #[test]
    fn test_identifier_validation() {
        assert!(validate_identifier("table", "poi_2024").is_ok());
        assert!(validate_identifier("table", "2poi").is_err());
        assert!(validate_identifier("table", "poi; DROP TABLE x").is_err());
        assert!(validate_identifier("table", "").is_err());
    }

    #[test]
    fn test_create_registers_everything() {
        let c = Container::in_memory(ContainerConfig::default()).unwrap();
        let t = FeatureTable::create(&c, &poi_type(), None).unwrap();
        let store = c.store();

        assert!(store.table_exists("poi").unwrap());
        assert!(store.table_exists("rtree_poi_geom").unwrap());
        assert_eq!(t.descriptor().feature_id_column(), Some("code"));
        assert!(t.has_spatial_index());
        assert!(t.has_extension(RTREE_EXTENSION).unwrap());
        assert_eq!(
            store
                .query_i64(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'trigger' AND name LIKE 'rtree_poi_geom_%'",
                    &[],
                )
                .unwrap(),
            Some(6)
        );
        let columns = catalog::data_columns(store, "poi").unwrap();
        assert_eq!(columns.len(), 3);
        assert_eq!(
            t.descriptor().field("name").and_then(|f| f.title.as_deref()),
            Some("Name")
        );
    }

    #[test]
    fn test_create_is_idempotent() {
        let c = Container::in_memory(ContainerConfig::default()).unwrap();
        FeatureTable::create(&c, &poi_type(), None).unwrap();
        FeatureTable::create(&c, &poi_type(), None).unwrap();
        assert_eq!(
            c.store()
                .query_i64("SELECT COUNT(*) FROM gpkg_contents WHERE table_name = 'poi'", &[])
                .unwrap(),
            Some(1)
        );
    }

    #[test]
    fn test_create_rejects_bad_input() {
        let c = Container::in_memory(ContainerConfig::default()).unwrap();
        let bad_type = FeatureType::new("t1", "CIRCLE", 4326);
        assert!(FeatureTable::create(&c, &bad_type, None).is_err());

        let bad_srs = FeatureType::new("t2", "POINT", 999_999);
        let err = FeatureTable::create(&c, &bad_srs, None).unwrap_err();
        assert_eq!(err.code().code(), "GPKG_VALIDATION_FAILED");

        let zm = FeatureType::new("t3", "POINT", 4326).with_z(1).with_m(1);
        assert!(FeatureTable::create(&c, &zm, None).is_err());

        let reserved = FeatureType::new("gpkg_things", "POINT", 4326);
        assert!(FeatureTable::create(&c, &reserved, None).is_err());

        // Nothing was registered by the failed calls
        assert!(catalog::table_names(c.store(), None).unwrap().is_empty());
    }

    #[test]
    fn test_rtree_triggers_track_rows() {
        let c = Container::in_memory(ContainerConfig::default()).unwrap();
        let t = FeatureTable::create(&c, &poi_type(), None).unwrap();
        let count = |c: &Container| {
            c.store()
                .query_i64("SELECT COUNT(*) FROM rtree_poi_geom", &[])
                .unwrap()
                .unwrap()
        };

        let a = t
            .insert(&[("geom", Value::from(GeometryValue::point(4326, 1.0, 2.0)))])
            .unwrap();
        assert_eq!(count(&c), 1);

        t.update(a, &[("geom", Value::Null)]).unwrap();
        assert_eq!(count(&c), 0);

        t.update(a, &[("geom", Value::from(GeometryValue::point(4326, 3.0, 4.0)))])
            .unwrap();
        assert_eq!(count(&c), 1);

        t.delete(a).unwrap();
        assert_eq!(count(&c), 0);
    }

    #[test]
    fn test_extent_prefers_declared_bounds() {
        let c = Container::in_memory(ContainerConfig::default()).unwrap();
        let declared = Envelope::new(-10.0, 10.0, -5.0, 5.0);
        let t = FeatureTable::create(&c, &poi_type(), Some(declared)).unwrap();
        t.insert(&[("geom", Value::from(GeometryValue::point(4326, 50.0, 50.0)))])
            .unwrap();

        let extent = t.extent().unwrap().unwrap();
        assert_eq!(extent.max_x, 10.0);
        let derived = t.derived_extent().unwrap().unwrap();
        assert!(derived.max_x >= 50.0);
    }

    #[test]
    fn test_scan_extent_without_index() {
        let c = Container::in_memory(ContainerConfig::default().without_spatial_index()).unwrap();
        let t = FeatureTable::create(&c, &poi_type(), None).unwrap();
        assert!(!t.has_spatial_index());
        assert!(t.extent().unwrap().is_none());

        for (x, y) in [(1.0, 2.0), (-3.0, 7.5), (4.0, -1.0)] {
            t.insert(&[("geom", Value::from(GeometryValue::point(4326, x, y)))])
                .unwrap();
        }
        let e = t.extent().unwrap().unwrap();
        assert_eq!((e.min_x, e.max_x, e.min_y, e.max_y), (-3.0, 4.0, -1.0, 7.5));
    }
}
