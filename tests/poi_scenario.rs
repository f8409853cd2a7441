//! Point-of-Interest Scenario Tests
//!
//! End-to-end: create an on-disk container, register a point table, write
//! features, query them back by bounding box, reopen the file.

use std::collections::HashSet;
use std::rc::Rc;

use gpkgdb::{
    BoundingBox, Container, ContainerConfig, FeatureReader, FeatureRecord, FeatureType,
    FeatureWriter, FieldDescriptor, FieldType, GeometryValue, QueryEngine, QueryResult, ScanStrategy, Value,
};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn poi_type() -> FeatureType {
    FeatureType::new("poi", "POINT", 4326).with_field(FieldDescriptor::new("name", FieldType::Text))
}

fn insert_abc(container: &Container) {
    let table = container.create_feature_table(&poi_type(), None).unwrap();
    let ft = Rc::new(table.feature_type());
    let writer = FeatureWriter::new(&table).unwrap();
    for (name, x, y) in [("a", 1.0, 1.0), ("b", 2.0, 2.0), ("c", 50.0, 50.0)] {
        let record = FeatureRecord::new(Rc::clone(&ft), name)
            .with_attribute("name", name)
            .with_geometry(GeometryValue::point(4326, x, y));
        writer.insert(&record).unwrap();
    }
}

fn names(records: &[FeatureRecord]) -> HashSet<String> {
    records
        .iter()
        .filter_map(|r| r.attribute("name").and_then(Value::as_str).map(str::to_string))
        .collect()
}

// =============================================================================
// Scenario Tests
// =============================================================================

/// A box around the first two points returns exactly "a" and "b".
#[test]
fn test_bbox_returns_first_two_points() {
    let dir = TempDir::new().unwrap();
    let container =
        Container::open_or_create(dir.path().join("poi.gpkg"), false, ContainerConfig::default())
            .unwrap();
    insert_abc(&container);

    let bbox = BoundingBox::new(0.0, 0.0, 3.0, 3.0);
    let result = QueryEngine::new(&container)
        .query_bbox("poi", &bbox, false, true)
        .unwrap();
    let QueryResult::Features(records) = result else {
        panic!("feature table returned tiles");
    };

    let expected: HashSet<String> = ["a", "b"].iter().map(|s| s.to_string()).collect();
    assert_eq!(names(&records), expected);
    for r in &records {
        assert!(r.geometry.is_some());
    }
}

/// The same query gives the same answer after reopening the file.
#[test]
fn test_reopen_and_query_again() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("poi.gpkg");
    {
        let container = Container::open_or_create(&path, false, ContainerConfig::default()).unwrap();
        insert_abc(&container);
        container.close().unwrap();
    }

    let container = Container::open_or_create(&path, false, ContainerConfig::default()).unwrap();
    assert!(container.is_valid(true).unwrap());

    let table = container.feature_table("poi").unwrap();
    assert!(table.has_spatial_index());
    assert_eq!(FeatureReader::new(&table).read_all().unwrap().len(), 3);

    let bbox = BoundingBox::new(0.0, 0.0, 3.0, 3.0);
    let records = QueryEngine::new(&container)
        .query_features(&table, &bbox, false, true)
        .unwrap();
    assert_eq!(records.len(), 2);
}

/// With extent testing on and no declared bounds, a box overlapping only
/// part of the stored data still reaches the features, on both scan paths.
#[test]
fn test_partial_overlap_with_derived_extent() {
    let container = Container::in_memory(ContainerConfig::default()).unwrap();
    insert_abc(&container);
    let table = container.feature_table("poi").unwrap();
    assert!(table.descriptor().declared_bounds().is_none());

    let bbox = BoundingBox::new(0.0, 0.0, 3.0, 3.0);
    for strategy in [ScanStrategy::SpatialIndex, ScanStrategy::LinearScan] {
        let records = QueryEngine::new(&container)
            .with_strategy(strategy)
            .query_features(&table, &bbox, false, true)
            .unwrap();
        let expected: HashSet<String> = ["a", "b"].iter().map(|s| s.to_string()).collect();
        assert_eq!(names(&records), expected, "{}", strategy.as_str());
    }

    // Disjoint from everything stored
    let far = BoundingBox::new(100.0, 100.0, 110.0, 110.0);
    for strategy in [ScanStrategy::SpatialIndex, ScanStrategy::LinearScan] {
        let records = QueryEngine::new(&container)
            .with_strategy(strategy)
            .query_features(&table, &far, true, true)
            .unwrap();
        assert!(records.is_empty());
    }
}

/// Writes stamp the contents timestamp.
#[test]
fn test_writes_touch_last_change() {
    let container = Container::in_memory(ContainerConfig::default()).unwrap();
    insert_abc(&container);
    let descriptor = container.descriptor("poi").unwrap();
    assert!(descriptor.last_change.is_some());
    assert_eq!(descriptor.organization, "EPSG");
}

/// Ids synthesized from table name and read position when no id column exists.
#[test]
fn test_synthesized_ids() {
    let container = Container::in_memory(ContainerConfig::default()).unwrap();
    insert_abc(&container);
    let table = container.feature_table("poi").unwrap();
    let ids: Vec<String> = FeatureReader::new(&table)
        .read_all()
        .unwrap()
        .into_iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(ids, vec!["poi.0", "poi.1", "poi.2"]);
}
