//! Geometry value types
//!
//! Coordinates carry an optional Z so the same value can be written as a 2D
//! or 3D body. Measures (M) are not modelled.

use geo_traits::GeometryTrait;

use crate::errors::{GpkgError, GpkgResult};

use super::body::shape_from_geometry;

/// A single vertex
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coord {
    pub x: f64,
    pub y: f64,
    pub z: Option<f64>,
}

impl Coord {
    /// Create a 2D coordinate
    pub fn xy(x: f64, y: f64) -> Self {
        Self { x, y, z: None }
    }

    /// Create a 3D coordinate
    pub fn xyz(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z: Some(z) }
    }

    /// An empty point is encoded as NaN ordinates
    pub fn is_nan(&self) -> bool {
        self.x.is_nan() && self.y.is_nan()
    }
}

/// Axis-aligned bounding rectangle in geometry order (min_x, max_x, min_y, max_y)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Envelope {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl Envelope {
    pub fn new(min_x: f64, max_x: f64, min_y: f64, max_y: f64) -> Self {
        Self {
            min_x,
            max_x,
            min_y,
            max_y,
        }
    }

    /// Envelope of a single coordinate
    pub fn of_coord(c: &Coord) -> Self {
        Self::new(c.x, c.x, c.y, c.y)
    }

    /// Grows the envelope to cover the coordinate
    pub fn expand(&mut self, c: &Coord) {
        self.min_x = self.min_x.min(c.x);
        self.max_x = self.max_x.max(c.x);
        self.min_y = self.min_y.min(c.y);
        self.max_y = self.max_y.max(c.y);
    }

    /// Closed containment test
    pub fn contains_coord(&self, c: &Coord) -> bool {
        c.x >= self.min_x && c.x <= self.max_x && c.y >= self.min_y && c.y <= self.max_y
    }
}

/// Coordinate payload of a geometry
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Point(Coord),
    LineString(Vec<Coord>),
    Polygon(Vec<Vec<Coord>>),
    MultiPoint(Vec<Coord>),
    MultiLineString(Vec<Vec<Coord>>),
    MultiPolygon(Vec<Vec<Vec<Coord>>>),
    GeometryCollection(Vec<Shape>),
}

impl Shape {
    /// Geometry type name as registered in the catalog
    pub fn type_name(&self) -> &'static str {
        match self {
            Shape::Point(_) => "POINT",
            Shape::LineString(_) => "LINESTRING",
            Shape::Polygon(_) => "POLYGON",
            Shape::MultiPoint(_) => "MULTIPOINT",
            Shape::MultiLineString(_) => "MULTILINESTRING",
            Shape::MultiPolygon(_) => "MULTIPOLYGON",
            Shape::GeometryCollection(_) => "GEOMETRYCOLLECTION",
        }
    }

    /// Copies any `geo_traits` geometry (`geo_types`, a parsed WKB body)
    pub fn from_geometry<G: GeometryTrait<T = f64>>(geometry: &G) -> GpkgResult<Shape> {
        shape_from_geometry(geometry).map_err(|e| GpkgError::validation(e.to_string()))
    }

    /// True when the shape has no vertices
    pub fn is_empty(&self) -> bool {
        match self {
            Shape::Point(c) => c.is_nan(),
            Shape::LineString(coords) | Shape::MultiPoint(coords) => coords.is_empty(),
            Shape::Polygon(rings) | Shape::MultiLineString(rings) => {
                rings.iter().all(|r| r.is_empty())
            }
            Shape::MultiPolygon(polygons) => polygons.iter().flatten().all(|r| r.is_empty()),
            Shape::GeometryCollection(members) => members.iter().all(|m| m.is_empty()),
        }
    }

    /// Visits every vertex in storage order
    pub fn for_each_coord<F: FnMut(&Coord)>(&self, f: &mut F) {
        match self {
            Shape::Point(c) => {
                if !c.is_nan() {
                    f(c)
                }
            }
            Shape::LineString(coords) | Shape::MultiPoint(coords) => coords.iter().for_each(f),
            Shape::Polygon(rings) | Shape::MultiLineString(rings) => {
                rings.iter().flatten().for_each(f)
            }
            Shape::MultiPolygon(polygons) => polygons.iter().flatten().flatten().for_each(f),
            Shape::GeometryCollection(members) => {
                for member in members {
                    member.for_each_coord(f);
                }
            }
        }
    }

    /// Number of vertices
    pub fn vertex_count(&self) -> usize {
        let mut count = 0;
        self.for_each_coord(&mut |_: &Coord| count += 1);
        count
    }

    /// True when any vertex carries a Z ordinate
    pub fn has_z(&self) -> bool {
        let mut has_z = false;
        self.for_each_coord(&mut |c: &Coord| has_z |= c.z.is_some());
        has_z
    }

    /// Computes the xy envelope, `None` for empty shapes
    pub fn envelope(&self) -> Option<Envelope> {
        let mut envelope: Option<Envelope> = None;
        self.for_each_coord(&mut |c: &Coord| {
            envelope = Some(match envelope {
                Some(mut e) => {
                    e.expand(c);
                    e
                }
                None => Envelope::of_coord(c),
            });
        });
        envelope
    }
}

/// A geometry bound to a spatial reference
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryValue {
    /// Spatial reference id
    pub srs_id: i32,
    /// Coordinate dimension, 2 or 3
    pub dimension: u8,
    /// Envelope carried by a decoded header, if any
    pub envelope: Option<Envelope>,
    /// Vertices
    pub shape: Shape,
}

impl GeometryValue {
    /// Wraps a shape; the dimension follows the presence of Z values.
    pub fn new(srs_id: i32, shape: Shape) -> Self {
        let dimension = if shape.has_z() { 3 } else { 2 };
        Self {
            srs_id,
            dimension,
            envelope: None,
            shape,
        }
    }

    /// Wraps a `geo_traits` geometry such as a `geo_types::Geometry`
    pub fn from_geometry<G: GeometryTrait<T = f64>>(srs_id: i32, geometry: &G) -> GpkgResult<Self> {
        Ok(Self::new(srs_id, Shape::from_geometry(geometry)?))
    }

    /// A 2D point
    pub fn point(srs_id: i32, x: f64, y: f64) -> Self {
        Self::new(srs_id, Shape::Point(Coord::xy(x, y)))
    }

    /// A 3D point
    pub fn point_z(srs_id: i32, x: f64, y: f64, z: f64) -> Self {
        Self::new(srs_id, Shape::Point(Coord::xyz(x, y, z)))
    }

    pub fn srs_id(&self) -> i32 {
        self.srs_id
    }

    pub fn set_srs_id(&mut self, srs_id: i32) {
        self.srs_id = srs_id;
    }

    /// Stored envelope, or one computed from the vertices
    pub fn envelope(&self) -> Option<Envelope> {
        self.envelope.or_else(|| self.shape.envelope())
    }

    pub fn is_empty(&self) -> bool {
        self.shape.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Vec<Coord> {
        vec![
            Coord::xy(0.0, 0.0),
            Coord::xy(4.0, 0.0),
            Coord::xy(4.0, 3.0),
            Coord::xy(0.0, 3.0),
            Coord::xy(0.0, 0.0),
        ]
    }

    #[test]
    fn test_polygon_envelope() {
        let shape = Shape::Polygon(vec![square()]);
        let env = shape.envelope().unwrap();
        assert_eq!(env, Envelope::new(0.0, 4.0, 0.0, 3.0));
        assert_eq!(shape.vertex_count(), 5);
    }

    #[test]
    fn test_empty_shapes() {
        assert!(Shape::LineString(vec![]).is_empty());
        assert!(Shape::Point(Coord::xy(f64::NAN, f64::NAN)).is_empty());
        assert!(Shape::GeometryCollection(vec![]).is_empty());
        assert!(Shape::LineString(vec![]).envelope().is_none());
        assert!(!Shape::Point(Coord::xy(1.0, 2.0)).is_empty());
    }

    #[test]
    fn test_dimension_follows_z() {
        assert_eq!(GeometryValue::point(4326, 1.0, 2.0).dimension, 2);
        assert_eq!(GeometryValue::point_z(4326, 1.0, 2.0, 3.0).dimension, 3);
    }

    #[test]
    fn test_from_geo_types() {
        let line: geo_types::Geometry<f64> =
            geo_types::LineString::from(vec![(1.0, 2.0), (3.0, 4.0)]).into();
        let g = GeometryValue::from_geometry(4326, &line).unwrap();
        assert_eq!(g.dimension, 2);
        assert_eq!(
            g.shape,
            Shape::LineString(vec![Coord::xy(1.0, 2.0), Coord::xy(3.0, 4.0)])
        );
    }

    #[test]
    fn test_collection_envelope_covers_members() {
        let shape = Shape::GeometryCollection(vec![
            Shape::Point(Coord::xy(-5.0, 1.0)),
            Shape::LineString(vec![Coord::xy(2.0, 2.0), Coord::xy(3.0, 9.0)]),
        ]);
        let env = shape.envelope().unwrap();
        assert_eq!(env, Envelope::new(-5.0, 3.0, 1.0, 9.0));
    }
}
