//! Geometry Codec Tests
//!
//! Round trips through the blob codec for every geometry kind, in both
//! byte orders and both dimensionalities, plus envelope containment.

use gpkgdb::config::{ByteOrder, ContainerConfig};
use gpkgdb::geometry::{decode, read_envelope, read_header, GeometryCodec};
use gpkgdb::{Coord, GeometryValue, Shape};

// =============================================================================
// Helper Functions
// =============================================================================

fn ring(x: f64, y: f64, size: f64) -> Vec<Coord> {
    vec![
        Coord::xy(x, y),
        Coord::xy(x + size, y),
        Coord::xy(x + size, y + size),
        Coord::xy(x, y + size),
        Coord::xy(x, y),
    ]
}

fn lift(coords: Vec<Coord>, z: f64) -> Vec<Coord> {
    coords
        .into_iter()
        .enumerate()
        .map(|(i, c)| Coord::xyz(c.x, c.y, z + i as f64))
        .collect()
}

fn all_shapes_2d() -> Vec<Shape> {
    vec![
        Shape::Point(Coord::xy(1.5, -2.25)),
        Shape::LineString(vec![Coord::xy(0.0, 0.0), Coord::xy(3.0, 4.0), Coord::xy(-1.0, 8.0)]),
        Shape::Polygon(vec![ring(0.0, 0.0, 10.0), ring(2.0, 2.0, 1.0)]),
        Shape::MultiPoint(vec![Coord::xy(1.0, 1.0), Coord::xy(-5.0, 7.0)]),
        Shape::MultiLineString(vec![
            vec![Coord::xy(0.0, 0.0), Coord::xy(1.0, 1.0)],
            vec![Coord::xy(5.0, 5.0), Coord::xy(6.0, 4.0)],
        ]),
        Shape::MultiPolygon(vec![vec![ring(0.0, 0.0, 1.0)], vec![ring(10.0, 10.0, 2.0)]]),
        Shape::GeometryCollection(vec![
            Shape::Point(Coord::xy(3.0, 3.0)),
            Shape::LineString(vec![Coord::xy(-3.0, 0.0), Coord::xy(0.0, -3.0)]),
        ]),
    ]
}

fn all_shapes_3d() -> Vec<Shape> {
    vec![
        Shape::Point(Coord::xyz(1.0, 2.0, 3.0)),
        Shape::LineString(lift(vec![Coord::xy(0.0, 0.0), Coord::xy(1.0, 2.0)], 10.0)),
        Shape::Polygon(vec![lift(ring(0.0, 0.0, 4.0), 1.0)]),
        Shape::MultiPoint(lift(vec![Coord::xy(1.0, 1.0), Coord::xy(2.0, 2.0)], -4.0)),
        Shape::MultiLineString(vec![lift(vec![Coord::xy(0.0, 0.0), Coord::xy(9.0, 9.0)], 0.5)]),
        Shape::MultiPolygon(vec![vec![lift(ring(5.0, 5.0, 1.0), 2.0)]]),
        Shape::GeometryCollection(vec![Shape::Point(Coord::xyz(7.0, 8.0, 9.0))]),
    ]
}

fn codec(byte_order: ByteOrder) -> GeometryCodec {
    GeometryCodec::new(&ContainerConfig {
        byte_order,
        ..ContainerConfig::default()
    })
}

// =============================================================================
// Round Trip Tests
// =============================================================================

/// Every 2D kind survives encode/decode in both byte orders.
#[test]
fn test_round_trip_2d_all_kinds() {
    for order in [ByteOrder::Little, ByteOrder::Big] {
        let codec = codec(order);
        for shape in all_shapes_2d() {
            let g = GeometryValue::new(4326, shape.clone());
            let bytes = codec.encode(&g, 2).unwrap();
            let back = decode(&bytes).unwrap();
            assert_eq!(back.shape, shape, "{:?} {:?}", order, shape.type_name());
            assert_eq!(back.srs_id, 4326);
            assert_eq!(back.dimension, 2);
        }
    }
}

/// Every 3D kind keeps its Z values.
#[test]
fn test_round_trip_3d_all_kinds() {
    for order in [ByteOrder::Little, ByteOrder::Big] {
        let codec = codec(order);
        for shape in all_shapes_3d() {
            let g = GeometryValue::new(3857, shape.clone());
            let bytes = codec.encode(&g, 3).unwrap();
            let back = decode(&bytes).unwrap();
            assert_eq!(back.shape, shape);
            assert_eq!(back.dimension, 3);
        }
    }
}

/// Header flags follow the configured byte order.
#[test]
fn test_header_flags() {
    let g = GeometryValue::point(4326, 1.0, 2.0);
    let little = read_header(&codec(ByteOrder::Little).encode(&g, 2).unwrap()).unwrap();
    let big = read_header(&codec(ByteOrder::Big).encode(&g, 2).unwrap()).unwrap();

    assert!(little.is_little_endian());
    assert!(!big.is_little_endian());
    assert_eq!(little.envelope_indicator(), 1);
    assert!(!little.is_empty());
}

// =============================================================================
// Envelope Tests
// =============================================================================

/// The stored envelope contains every vertex.
#[test]
fn test_envelope_contains_all_vertices() {
    let codec = codec(ByteOrder::Little);
    for shape in all_shapes_2d().into_iter().chain(all_shapes_3d()) {
        let bytes = codec.encode(&GeometryValue::new(4326, shape.clone()), 3).unwrap();
        let envelope = read_envelope(&bytes).unwrap().unwrap();
        shape.for_each_coord(&mut |c| assert!(envelope.contains_coord(c)));
    }
}

/// Empty geometries carry no envelope.
#[test]
fn test_empty_geometry_has_no_envelope() {
    let empty = GeometryValue::new(4326, Shape::LineString(Vec::new()));
    let bytes = codec(ByteOrder::Little).encode(&empty, 2).unwrap();

    let header = read_header(&bytes).unwrap();
    assert!(header.is_empty());
    assert!(read_envelope(&bytes).unwrap().is_none());
    assert!(decode(&bytes).unwrap().is_empty());
}
