//! Container Lifecycle Tests
//!
//! Table registration, constraint handling and metadata across the public
//! surface.

use std::rc::Rc;

use gpkgdb::catalog::{DataColumnConstraint, DataType};
use gpkgdb::{
    BoundingBox, Container, ContainerConfig, FeatureReader, FeatureRecord, FeatureType,
    FeatureWriter, FieldDescriptor, FieldType, GeometryValue, GpkgErrorCode, MetadataEntry,
    MetadataReference, Value,
};

// =============================================================================
// Helper Functions
// =============================================================================

fn parks() -> FeatureType {
    FeatureType::new("parks", "POINT", 4326)
        .with_identifier("Parks")
        .with_field(FieldDescriptor::new("kind", FieldType::Text))
        .with_field(FieldDescriptor::new("area", FieldType::Real))
}

fn contents_rows(container: &Container, table: &str) -> Option<i64> {
    container
        .store()
        .query_i64(
            "SELECT COUNT(*) FROM gpkg_contents WHERE table_name = ?",
            &[Value::from(table)],
        )
        .unwrap()
}

fn with_kind_constraint(container: &Container) {
    container.create_feature_table(&parks(), None).unwrap();
    for kind in ["urban", "national"] {
        container
            .add_constraint(&DataColumnConstraint::enum_value("park_kinds", kind))
            .unwrap();
    }
    container.assign_constraint("parks", "kind", "park_kinds").unwrap();
}

fn park(ft: &Rc<FeatureType>, id: &str, kind: &str) -> FeatureRecord {
    FeatureRecord::new(Rc::clone(ft), id)
        .with_attribute("kind", kind)
        .with_attribute("area", 1.5)
        .with_geometry(GeometryValue::point(4326, 0.0, 0.0))
}

// =============================================================================
// Registration Tests
// =============================================================================

/// Creating the same tables twice registers them once.
#[test]
fn test_create_is_idempotent() {
    let container = Container::in_memory(ContainerConfig::default()).unwrap();
    container.create_feature_table(&parks(), None).unwrap();
    container.create_feature_table(&parks(), None).unwrap();

    let world = BoundingBox::new(-180.0, -90.0, 180.0, 90.0);
    container.create_tile_table("basemap", &world, 1, 256, 0.5, 0.5).unwrap();
    container.create_tile_table("basemap", &world, 1, 256, 0.5, 0.5).unwrap();

    assert_eq!(contents_rows(&container, "parks"), Some(1));
    assert_eq!(contents_rows(&container, "basemap"), Some(1));
    assert_eq!(container.table_names(Some(DataType::Features)).unwrap(), vec!["parks"]);
    assert_eq!(container.table_names(Some(DataType::Tiles)).unwrap(), vec!["basemap"]);
}

/// A name cannot be reused for the other kind of table.
#[test]
fn test_kind_conflict_rejected() {
    let container = Container::in_memory(ContainerConfig::default()).unwrap();
    container.create_feature_table(&parks(), None).unwrap();
    let world = BoundingBox::new(-180.0, -90.0, 180.0, 90.0);
    assert!(container.create_tile_table("parks", &world, 1, 256, 0.5, 0.5).is_err());
    assert!(container.tile_table("parks").is_err());
}

/// Describing a table reports its catalog registration.
#[test]
fn test_describe_registered_table() {
    let container = Container::in_memory(ContainerConfig::default()).unwrap();
    container.create_feature_table(&parks(), None).unwrap();

    let described = container.describe_table("parks").unwrap();
    let map = described.as_map().unwrap();
    assert_eq!(map.get("kind").and_then(Value::as_str), Some("feature"));
    assert_eq!(map.get("identifier").and_then(Value::as_str), Some("Parks"));
    assert_eq!(map.get("geometry_type").and_then(Value::as_str), Some("POINT"));
    assert_eq!(map.get("spatial_index"), Some(&Value::Boolean(true)));
    let fields = map.get("fields").and_then(Value::as_map).unwrap();
    assert!(fields.contains_key("kind"));
    assert!(fields.contains_key("area"));
}

/// Unknown tables surface as not-found.
#[test]
fn test_unknown_table_not_found() {
    let container = Container::in_memory(ContainerConfig::default()).unwrap();
    let err = container.feature_table("nowhere").unwrap_err();
    assert_eq!(err.code(), GpkgErrorCode::GpkgNotFound);
}

// =============================================================================
// Constraint Tests
// =============================================================================

/// Strict containers refuse values outside an enum constraint.
#[test]
fn test_strict_enum_constraint() {
    let container = Container::in_memory(ContainerConfig::strict()).unwrap();
    with_kind_constraint(&container);
    let table = container.feature_table("parks").unwrap();
    let ft = Rc::new(table.feature_type());
    let writer = FeatureWriter::new(&table).unwrap();

    writer.insert(&park(&ft, "p1", "urban")).unwrap();
    let err = writer.insert(&park(&ft, "p2", "theme")).unwrap_err();
    assert_eq!(err.code(), GpkgErrorCode::GpkgConstraintViolation);
    assert_eq!(FeatureReader::new(&table).read_all().unwrap().len(), 1);
}

/// Lenient containers store NULL in place of a violating value.
#[test]
fn test_lenient_enum_constraint() {
    let container = Container::in_memory(ContainerConfig::lenient()).unwrap();
    with_kind_constraint(&container);
    let table = container.feature_table("parks").unwrap();
    let ft = Rc::new(table.feature_type());
    FeatureWriter::new(&table)
        .unwrap()
        .insert(&park(&ft, "p2", "theme"))
        .unwrap();

    let records = FeatureReader::new(&table).read_all().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].attribute("kind"), Some(&Value::Null));
    assert_eq!(records[0].attribute("area"), Some(&Value::Real(1.5)));
}

// =============================================================================
// Metadata Tests
// =============================================================================

/// Metadata documents attach to a table and survive a reopen.
#[test]
fn test_metadata_round_trip_on_disk() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("meta.gpkg");
    let doc = "<gmd:MD_Metadata>parks</gmd:MD_Metadata>";
    let id = {
        let container = Container::open_or_create(&path, false, ContainerConfig::default()).unwrap();
        container.create_feature_table(&parks(), None).unwrap();
        let id = container
            .add_metadata(
                &MetadataEntry::new("http://www.isotc211.org/2005/gmd", doc),
                &[MetadataReference::geopackage(), MetadataReference::table("parks")],
            )
            .unwrap();
        container.close().unwrap();
        id
    };

    let container = Container::open_or_create(&path, false, ContainerConfig::default()).unwrap();
    assert_eq!(container.metadata(id).unwrap().unwrap().document, doc);
    assert_eq!(container.metadata_references(id).unwrap().len(), 2);
    assert_eq!(container.metadata_for_table("parks").unwrap().len(), 1);
}
