//! WKB bodies through the `wkb` crate
//!
//! Writing walks a borrowed [`ShapeView`] that exposes a `Shape` through the
//! `geo_traits` accessors at a fixed dimensionality: Z is dropped for 2D
//! output and missing Z is written as 0.0 for 3D output. Reading hands the
//! body to `wkb::reader` and converts any `GeometryTrait` back into a
//! `Shape`, so `geo_types` values convert through the same path.
//!
//! XYM and XYZM bodies are rejected.

use geo_traits::{
    CoordTrait, Dimensions, GeometryCollectionTrait, GeometryTrait, GeometryType, LineStringTrait,
    MultiLineStringTrait, MultiPointTrait, MultiPolygonTrait, PointTrait, PolygonTrait,
    UnimplementedLine, UnimplementedRect, UnimplementedTriangle,
};
use thiserror::Error;
use wkb::reader::read_wkb;
use wkb::writer::{write_geometry, WriteOptions};
use wkb::Endianness;

use super::types::{Coord, Shape};

const WKB_BIG_ENDIAN: u8 = 0x00;
const WKB_LITTLE_ENDIAN: u8 = 0x01;
const EWKB_Z_FLAG: u32 = 0x8000_0000;
const EWKB_M_FLAG: u32 = 0x4000_0000;
const EWKB_SRID_FLAG: u32 = 0x2000_0000;

/// Collections nested deeper than this are refused
const MAX_NESTING: usize = 64;

/// Failures while reading or writing a WKB body
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BodyError {
    #[error("malformed WKB body: {0}")]
    Malformed(String),

    #[error("WKB body ends at byte {available}, element at byte {offset} runs past it")]
    Truncated { offset: usize, available: usize },

    #[error("measured coordinates are not supported ({0})")]
    Measured(String),

    #[error("geometry kind {0} has no WKB body")]
    Unsupported(&'static str),

    #[error("cannot write WKB body: {0}")]
    Write(String),
}

impl BodyError {
    /// Byte offset inside the body where reading failed
    pub fn offset(&self) -> Option<usize> {
        match self {
            BodyError::Truncated { offset, .. } => Some(*offset),
            _ => None,
        }
    }
}

fn dimensions(dimension: u8) -> Dimensions {
    if dimension == 3 {
        Dimensions::Xyz
    } else {
        Dimensions::Xy
    }
}

/// Appends the WKB encoding of `shape` with `dimension` ordinates per vertex
pub fn write_body(
    shape: &Shape,
    dimension: u8,
    little_endian: bool,
    out: &mut Vec<u8>,
) -> Result<(), BodyError> {
    let endianness = if little_endian {
        Endianness::LittleEndian
    } else {
        Endianness::BigEndian
    };
    let options = WriteOptions {
        endianness,
        ..Default::default()
    };
    let view = ShapeView::new(shape, dimensions(dimension));
    write_geometry(out, &view, &options).map_err(|e| BodyError::Write(e.to_string()))
}

/// Reads a WKB body; returns the shape and its dimension (2 or 3)
pub fn read_body(body: &[u8]) -> Result<(Shape, u8), BodyError> {
    measure(body, 0, 0)?;
    let wkb = read_wkb(body).map_err(|e| BodyError::Malformed(e.to_string()))?;
    let dimension = match GeometryTrait::dim(&wkb) {
        Dimensions::Xy => 2,
        Dimensions::Xyz => 3,
        Dimensions::Xym => return Err(BodyError::Measured("XYM".to_string())),
        Dimensions::Xyzm => return Err(BodyError::Measured("XYZM".to_string())),
        Dimensions::Unknown(n) => {
            return Err(BodyError::Malformed(format!("{} ordinates per vertex", n)))
        }
    };
    Ok((shape_from_geometry(&wkb)?, dimension))
}

/// Converts any `geo_traits` geometry into a `Shape`, keeping Z when present
pub fn shape_from_geometry<G: GeometryTrait<T = f64>>(geometry: &G) -> Result<Shape, BodyError> {
    let shape = match geometry.as_type() {
        GeometryType::Point(p) => Shape::Point(point_coord(p)),
        GeometryType::LineString(l) => Shape::LineString(path(l)),
        GeometryType::Polygon(p) => Shape::Polygon(rings(p)),
        GeometryType::MultiPoint(m) => {
            Shape::MultiPoint(m.points().map(|p| point_coord(&p)).collect())
        }
        GeometryType::MultiLineString(m) => {
            Shape::MultiLineString(m.line_strings().map(|l| path(&l)).collect())
        }
        GeometryType::MultiPolygon(m) => {
            Shape::MultiPolygon(m.polygons().map(|p| rings(&p)).collect())
        }
        GeometryType::GeometryCollection(c) => Shape::GeometryCollection(
            c.geometries()
                .map(|g| shape_from_geometry(&g))
                .collect::<Result<_, _>>()?,
        ),
        GeometryType::Rect(_) => return Err(BodyError::Unsupported("RECT")),
        GeometryType::Triangle(_) => return Err(BodyError::Unsupported("TRIANGLE")),
        GeometryType::Line(_) => return Err(BodyError::Unsupported("LINE")),
    };
    Ok(shape)
}

fn coord_of(c: &impl CoordTrait<T = f64>) -> Coord {
    match c.dim() {
        Dimensions::Xyz | Dimensions::Xyzm => Coord::xyz(c.x(), c.y(), c.nth_or_panic(2)),
        _ => Coord::xy(c.x(), c.y()),
    }
}

fn point_coord(p: &impl PointTrait<T = f64>) -> Coord {
    p.coord()
        .map_or(Coord::xy(f64::NAN, f64::NAN), |c| coord_of(&c))
}

fn path(l: &impl LineStringTrait<T = f64>) -> Vec<Coord> {
    l.coords().map(|c| coord_of(&c)).collect()
}

fn rings(p: &impl PolygonTrait<T = f64>) -> Vec<Vec<Coord>> {
    p.exterior()
        .into_iter()
        .chain(p.interiors())
        .map(|r| path(&r))
        .collect()
}

// ---------------------------------------------------------------------
// Bounds check
// ---------------------------------------------------------------------

fn u32_at(body: &[u8], offset: usize, little: bool) -> Result<u32, BodyError> {
    let bytes = body
        .get(offset..offset.saturating_add(4))
        .ok_or(BodyError::Truncated {
            offset,
            available: body.len(),
        })?;
    let buf = [bytes[0], bytes[1], bytes[2], bytes[3]];
    Ok(if little {
        u32::from_le_bytes(buf)
    } else {
        u32::from_be_bytes(buf)
    })
}

fn advance(body: &[u8], offset: usize, len: usize) -> Result<usize, BodyError> {
    let end = offset.saturating_add(len);
    if end > body.len() {
        return Err(BodyError::Truncated {
            offset,
            available: body.len(),
        });
    }
    Ok(end)
}

/// Byte length of the geometry at `offset`.
///
/// Every counted element must fit inside `body` before the reader touches
/// it; a count larger than the remaining bytes fails here instead of
/// surfacing later as a short read.
fn measure(body: &[u8], offset: usize, depth: usize) -> Result<usize, BodyError> {
    if depth > MAX_NESTING {
        return Err(BodyError::Malformed(
            "geometry collections nested too deeply".to_string(),
        ));
    }
    let little = match body.get(offset) {
        Some(&WKB_LITTLE_ENDIAN) => true,
        Some(&WKB_BIG_ENDIAN) => false,
        Some(other) => {
            return Err(BodyError::Malformed(format!(
                "unknown byte order marker {:#04x} at byte {}",
                other, offset
            )))
        }
        None => {
            return Err(BodyError::Truncated {
                offset,
                available: body.len(),
            })
        }
    };
    let raw = u32_at(body, offset + 1, little)?;
    let mut at = offset + 5;
    if raw & EWKB_SRID_FLAG != 0 {
        at = advance(body, at, 4)?;
    }
    let code = raw & !(EWKB_Z_FLAG | EWKB_M_FLAG | EWKB_SRID_FLAG);
    let flagged =
        usize::from(raw & EWKB_Z_FLAG != 0) + usize::from(raw & EWKB_M_FLAG != 0);
    let ordinates = match code / 1000 {
        0 => 2 + flagged,
        1 | 2 => 3,
        3 => 4,
        _ => {
            return Err(BodyError::Malformed(format!(
                "unknown geometry type {} at byte {}",
                raw,
                offset + 1
            )))
        }
    };
    let coord_len = ordinates * 8;

    match code % 1000 {
        1 => at = advance(body, at, coord_len)?,
        2 => {
            let n = u32_at(body, at, little)? as usize;
            at = advance(body, at + 4, n.saturating_mul(coord_len))?;
        }
        3 => {
            let rings = u32_at(body, at, little)?;
            at += 4;
            for _ in 0..rings {
                let n = u32_at(body, at, little)? as usize;
                at = advance(body, at + 4, n.saturating_mul(coord_len))?;
            }
        }
        4..=7 => {
            let members = u32_at(body, at, little)?;
            at += 4;
            for _ in 0..members {
                at += measure(body, at, depth + 1)?;
            }
        }
        _ => {
            return Err(BodyError::Malformed(format!(
                "unknown geometry type {} at byte {}",
                raw,
                offset + 1
            )))
        }
    }
    Ok(at - offset)
}

// ---------------------------------------------------------------------
// Write view
// ---------------------------------------------------------------------

/// Vertex at the output dimensionality
#[derive(Debug, Clone, Copy)]
struct CoordView {
    coord: Coord,
    dim: Dimensions,
}

impl CoordTrait for CoordView {
    type T = f64;

    fn dim(&self) -> Dimensions {
        self.dim
    }

    fn x(&self) -> f64 {
        self.coord.x
    }

    fn y(&self) -> f64 {
        self.coord.y
    }

    fn nth_or_panic(&self, n: usize) -> f64 {
        match n {
            0 => self.coord.x,
            1 => self.coord.y,
            2 if matches!(self.dim, Dimensions::Xyz) => self.coord.z.unwrap_or(0.0),
            _ => panic!("ordinate {} out of range for {:?}", n, self.dim),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct PointView<'s> {
    coord: &'s Coord,
    dim: Dimensions,
}

impl PointTrait for PointView<'_> {
    type CoordType<'a> = CoordView where Self: 'a;

    fn coord(&self) -> Option<Self::CoordType<'_>> {
        if self.coord.is_nan() {
            return None;
        }
        Some(CoordView {
            coord: *self.coord,
            dim: self.dim,
        })
    }
}

#[derive(Debug, Clone, Copy)]
struct PathView<'s> {
    coords: &'s [Coord],
    dim: Dimensions,
}

impl LineStringTrait for PathView<'_> {
    type CoordType<'a> = CoordView where Self: 'a;

    fn num_coords(&self) -> usize {
        self.coords.len()
    }

    unsafe fn coord_unchecked(&self, i: usize) -> Self::CoordType<'_> {
        CoordView {
            coord: self.coords[i],
            dim: self.dim,
        }
    }
}

/// Polygon rings, exterior first
#[derive(Debug, Clone, Copy)]
struct RingsView<'s> {
    rings: &'s [Vec<Coord>],
    dim: Dimensions,
}

impl<'s> PolygonTrait for RingsView<'s> {
    type RingType<'a> = PathView<'s> where Self: 'a;

    fn exterior(&self) -> Option<Self::RingType<'_>> {
        self.rings.first().map(|ring| PathView {
            coords: ring,
            dim: self.dim,
        })
    }

    fn num_interiors(&self) -> usize {
        self.rings.len().saturating_sub(1)
    }

    unsafe fn interior_unchecked(&self, i: usize) -> Self::RingType<'_> {
        PathView {
            coords: &self.rings[i + 1],
            dim: self.dim,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct PointsView<'s> {
    points: &'s [Coord],
    dim: Dimensions,
}

impl<'s> MultiPointTrait for PointsView<'s> {
    type InnerPointType<'a> = PointView<'s> where Self: 'a;

    fn num_points(&self) -> usize {
        self.points.len()
    }

    unsafe fn point_unchecked(&self, i: usize) -> Self::InnerPointType<'_> {
        PointView {
            coord: &self.points[i],
            dim: self.dim,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct PathsView<'s> {
    paths: &'s [Vec<Coord>],
    dim: Dimensions,
}

impl<'s> MultiLineStringTrait for PathsView<'s> {
    type InnerLineStringType<'a> = PathView<'s> where Self: 'a;

    fn num_line_strings(&self) -> usize {
        self.paths.len()
    }

    unsafe fn line_string_unchecked(&self, i: usize) -> Self::InnerLineStringType<'_> {
        PathView {
            coords: &self.paths[i],
            dim: self.dim,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct PolygonsView<'s> {
    polygons: &'s [Vec<Vec<Coord>>],
    dim: Dimensions,
}

impl<'s> MultiPolygonTrait for PolygonsView<'s> {
    type InnerPolygonType<'a> = RingsView<'s> where Self: 'a;

    fn num_polygons(&self) -> usize {
        self.polygons.len()
    }

    unsafe fn polygon_unchecked(&self, i: usize) -> Self::InnerPolygonType<'_> {
        RingsView {
            rings: &self.polygons[i],
            dim: self.dim,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct MembersView<'s> {
    members: &'s [Shape],
    dim: Dimensions,
}

impl<'s> GeometryCollectionTrait for MembersView<'s> {
    type GeometryType<'a> = ShapeView<'s> where Self: 'a;

    fn num_geometries(&self) -> usize {
        self.members.len()
    }

    unsafe fn geometry_unchecked(&self, i: usize) -> Self::GeometryType<'_> {
        ShapeView::new(&self.members[i], self.dim)
    }
}

/// `geo_traits` 0.3 makes `GeometryTrait` a supertrait of every geometry
/// trait; each view carries its dimension and casts to its own variant
macro_rules! impl_view_geometry {
    ($view:ident, $variant:ident) => {
        impl<'s> GeometryTrait for $view<'s> {
            type T = f64;
            type PointType<'a> = PointView<'s> where Self: 'a;
            type LineStringType<'a> = PathView<'s> where Self: 'a;
            type PolygonType<'a> = RingsView<'s> where Self: 'a;
            type MultiPointType<'a> = PointsView<'s> where Self: 'a;
            type MultiLineStringType<'a> = PathsView<'s> where Self: 'a;
            type MultiPolygonType<'a> = PolygonsView<'s> where Self: 'a;
            type GeometryCollectionType<'a> = MembersView<'s> where Self: 'a;
            type RectType<'a> = UnimplementedRect<f64> where Self: 'a;
            type TriangleType<'a> = UnimplementedTriangle<f64> where Self: 'a;
            type LineType<'a> = UnimplementedLine<f64> where Self: 'a;

            fn dim(&self) -> Dimensions {
                self.dim
            }

            fn as_type(
                &self,
            ) -> GeometryType<
                '_,
                Self::PointType<'_>,
                Self::LineStringType<'_>,
                Self::PolygonType<'_>,
                Self::MultiPointType<'_>,
                Self::MultiLineStringType<'_>,
                Self::MultiPolygonType<'_>,
                Self::GeometryCollectionType<'_>,
                Self::RectType<'_>,
                Self::TriangleType<'_>,
                Self::LineType<'_>,
            > {
                GeometryType::$variant(self)
            }
        }
    };
}

impl_view_geometry!(PointView, Point);
impl_view_geometry!(PathView, LineString);
impl_view_geometry!(RingsView, Polygon);
impl_view_geometry!(PointsView, MultiPoint);
impl_view_geometry!(PathsView, MultiLineString);
impl_view_geometry!(PolygonsView, MultiPolygon);
impl_view_geometry!(MembersView, GeometryCollection);

/// A `Shape` seen through `geo_traits` at one output dimensionality
#[derive(Debug, Clone, Copy)]
enum ShapeView<'s> {
    Point(PointView<'s>),
    LineString(PathView<'s>),
    Polygon(RingsView<'s>),
    MultiPoint(PointsView<'s>),
    MultiLineString(PathsView<'s>),
    MultiPolygon(PolygonsView<'s>),
    GeometryCollection(MembersView<'s>),
}

impl<'s> ShapeView<'s> {
    fn new(shape: &'s Shape, dim: Dimensions) -> Self {
        match shape {
            Shape::Point(coord) => ShapeView::Point(PointView { coord, dim }),
            Shape::LineString(coords) => ShapeView::LineString(PathView { coords, dim }),
            Shape::Polygon(rings) => ShapeView::Polygon(RingsView { rings, dim }),
            Shape::MultiPoint(points) => ShapeView::MultiPoint(PointsView { points, dim }),
            Shape::MultiLineString(paths) => ShapeView::MultiLineString(PathsView { paths, dim }),
            Shape::MultiPolygon(polygons) => {
                ShapeView::MultiPolygon(PolygonsView { polygons, dim })
            }
            Shape::GeometryCollection(members) => {
                ShapeView::GeometryCollection(MembersView { members, dim })
            }
        }
    }
}

impl<'s> GeometryTrait for ShapeView<'s> {
    type T = f64;
    type PointType<'a> = PointView<'s> where Self: 'a;
    type LineStringType<'a> = PathView<'s> where Self: 'a;
    type PolygonType<'a> = RingsView<'s> where Self: 'a;
    type MultiPointType<'a> = PointsView<'s> where Self: 'a;
    type MultiLineStringType<'a> = PathsView<'s> where Self: 'a;
    type MultiPolygonType<'a> = PolygonsView<'s> where Self: 'a;
    type GeometryCollectionType<'a> = MembersView<'s> where Self: 'a;
    type RectType<'a> = UnimplementedRect<f64> where Self: 'a;
    type TriangleType<'a> = UnimplementedTriangle<f64> where Self: 'a;
    type LineType<'a> = UnimplementedLine<f64> where Self: 'a;

    fn dim(&self) -> Dimensions {
        match self {
            ShapeView::Point(v) => v.dim,
            ShapeView::LineString(v) => v.dim,
            ShapeView::Polygon(v) => v.dim,
            ShapeView::MultiPoint(v) => v.dim,
            ShapeView::MultiLineString(v) => v.dim,
            ShapeView::MultiPolygon(v) => v.dim,
            ShapeView::GeometryCollection(v) => v.dim,
        }
    }

    fn as_type(
        &self,
    ) -> GeometryType<
        '_,
        Self::PointType<'_>,
        Self::LineStringType<'_>,
        Self::PolygonType<'_>,
        Self::MultiPointType<'_>,
        Self::MultiLineStringType<'_>,
        Self::MultiPolygonType<'_>,
        Self::GeometryCollectionType<'_>,
        Self::RectType<'_>,
        Self::TriangleType<'_>,
        Self::LineType<'_>,
    > {
        match self {
            ShapeView::Point(v) => GeometryType::Point(v),
            ShapeView::LineString(v) => GeometryType::LineString(v),
            ShapeView::Polygon(v) => GeometryType::Polygon(v),
            ShapeView::MultiPoint(v) => GeometryType::MultiPoint(v),
            ShapeView::MultiLineString(v) => GeometryType::MultiLineString(v),
            ShapeView::MultiPolygon(v) => GeometryType::MultiPolygon(v),
            ShapeView::GeometryCollection(v) => GeometryType::GeometryCollection(v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(shape: &Shape, dimension: u8, little_endian: bool) -> Vec<u8> {
        let mut out = Vec::new();
        write_body(shape, dimension, little_endian, &mut out).unwrap();
        out
    }

    #[test]
    fn test_point_layout_little_endian() {
        let body = encode(&Shape::Point(Coord::xy(1.0, 2.0)), 2, true);
        assert_eq!(body.len(), 21);
        assert_eq!(body[0], WKB_LITTLE_ENDIAN);
        assert_eq!(&body[1..5], &1u32.to_le_bytes());
        assert_eq!(&body[5..13], &1.0f64.to_le_bytes());
    }

    #[test]
    fn test_z_type_code_big_endian() {
        let body = encode(&Shape::Point(Coord::xyz(1.0, 2.0, 3.0)), 3, false);
        assert_eq!(body.len(), 29);
        assert_eq!(body[0], WKB_BIG_ENDIAN);
        assert_eq!(&body[1..5], &1001u32.to_be_bytes());
        assert_eq!(&body[21..29], &3.0f64.to_be_bytes());
    }

    #[test]
    fn test_missing_z_written_as_zero() {
        let line = Shape::LineString(vec![Coord::xy(1.0, 1.0), Coord::xyz(2.0, 2.0, 5.0)]);
        let (shape, dimension) = read_body(&encode(&line, 3, true)).unwrap();
        assert_eq!(dimension, 3);
        assert_eq!(
            shape,
            Shape::LineString(vec![Coord::xyz(1.0, 1.0, 0.0), Coord::xyz(2.0, 2.0, 5.0)])
        );
    }

    #[test]
    fn test_z_dropped_for_two_dimensions() {
        let point = Shape::Point(Coord::xyz(4.0, 5.0, 6.0));
        let (shape, dimension) = read_body(&encode(&point, 2, true)).unwrap();
        assert_eq!(dimension, 2);
        assert_eq!(shape, Shape::Point(Coord::xy(4.0, 5.0)));
    }

    #[test]
    fn test_multipolygon_reads_back() {
        let square = |x: f64| {
            vec![
                Coord::xy(x, 0.0),
                Coord::xy(x + 1.0, 0.0),
                Coord::xy(x + 1.0, 1.0),
                Coord::xy(x, 0.0),
            ]
        };
        let shape = Shape::MultiPolygon(vec![vec![square(0.0)], vec![square(5.0), square(5.2)]]);
        let (back, _) = read_body(&encode(&shape, 2, false)).unwrap();
        assert_eq!(back, shape);
    }

    #[test]
    fn test_truncated_body() {
        let body = encode(
            &Shape::LineString(vec![Coord::xy(0.0, 0.0), Coord::xy(1.0, 1.0)]),
            2,
            true,
        );
        for len in [0, 3, 8, body.len() - 1] {
            assert!(
                matches!(read_body(&body[..len]), Err(BodyError::Truncated { .. })),
                "len {}",
                len
            );
        }
    }

    #[test]
    fn test_huge_count_rejected() {
        // LineString claiming u32::MAX vertices in a 9 byte body
        let mut body = vec![WKB_LITTLE_ENDIAN];
        body.extend_from_slice(&2u32.to_le_bytes());
        body.extend_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(read_body(&body), Err(BodyError::Truncated { .. })));
    }

    #[test]
    fn test_measured_rejected() {
        let mut body = vec![WKB_LITTLE_ENDIAN];
        body.extend_from_slice(&2001u32.to_le_bytes());
        for v in [1.0f64, 2.0, 3.0] {
            body.extend_from_slice(&v.to_le_bytes());
        }
        assert!(matches!(read_body(&body), Err(BodyError::Measured(_))));
    }

    #[test]
    fn test_unknown_type_and_byte_order() {
        let mut body = vec![WKB_LITTLE_ENDIAN];
        body.extend_from_slice(&99u32.to_le_bytes());
        assert!(matches!(read_body(&body), Err(BodyError::Malformed(_))));

        let mut body = vec![0x02];
        body.extend_from_slice(&1u32.to_le_bytes());
        assert!(matches!(read_body(&body), Err(BodyError::Malformed(_))));
    }

    #[test]
    fn test_geo_types_polygon_converts() {
        let exterior = geo_types::LineString::from(vec![(0.0, 0.0), (4.0, 0.0), (4.0, 4.0), (0.0, 0.0)]);
        let polygon = geo_types::Geometry::Polygon(geo_types::Polygon::new(exterior, vec![]));
        let shape = shape_from_geometry(&polygon).unwrap();
        assert_eq!(
            shape,
            Shape::Polygon(vec![vec![
                Coord::xy(0.0, 0.0),
                Coord::xy(4.0, 0.0),
                Coord::xy(4.0, 4.0),
                Coord::xy(0.0, 0.0),
            ]])
        );
    }

    #[test]
    fn test_geo_types_rect_unsupported() {
        let rect = geo_types::Geometry::Rect(geo_types::Rect::new((0.0, 0.0), (1.0, 1.0)));
        assert_eq!(
            shape_from_geometry(&rect),
            Err(BodyError::Unsupported("RECT"))
        );
    }
}
