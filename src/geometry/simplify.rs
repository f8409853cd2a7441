//! Write-path simplification
//!
//! Delegates Douglas-Peucker to `geo::SimplifyIdx` and keeps the retained
//! vertices (including their Z) by index. Points are never simplified, paths
//! keep at least 2 vertices and rings at least 4.

use geo::SimplifyIdx;
use geo_types::LineString;

use super::types::{Coord, Shape};

const MIN_PATH_VERTICES: usize = 2;
const MIN_RING_VERTICES: usize = 4;

/// Returns a simplified copy of `shape`
pub fn simplify_shape(shape: &Shape, tolerance: f64) -> Shape {
    match shape {
        Shape::Point(_) | Shape::MultiPoint(_) => shape.clone(),
        Shape::LineString(coords) => {
            Shape::LineString(simplify_path(coords, tolerance, MIN_PATH_VERTICES))
        }
        Shape::Polygon(rings) => Shape::Polygon(simplify_rings(rings, tolerance)),
        Shape::MultiLineString(lines) => Shape::MultiLineString(
            lines
                .iter()
                .map(|l| simplify_path(l, tolerance, MIN_PATH_VERTICES))
                .collect(),
        ),
        Shape::MultiPolygon(polygons) => Shape::MultiPolygon(
            polygons
                .iter()
                .map(|p| simplify_rings(p, tolerance))
                .collect(),
        ),
        Shape::GeometryCollection(members) => Shape::GeometryCollection(
            members
                .iter()
                .map(|m| simplify_shape(m, tolerance))
                .collect(),
        ),
    }
}

fn simplify_rings(rings: &[Vec<Coord>], tolerance: f64) -> Vec<Vec<Coord>> {
    rings
        .iter()
        .map(|r| simplify_path(r, tolerance, MIN_RING_VERTICES))
        .collect()
}

fn simplify_path(coords: &[Coord], tolerance: f64, min_vertices: usize) -> Vec<Coord> {
    if coords.len() <= min_vertices {
        return coords.to_vec();
    }
    let line: LineString<f64> = coords
        .iter()
        .map(|c| geo_types::Coord { x: c.x, y: c.y })
        .collect();
    let kept = line.simplify_idx(&tolerance);
    if kept.len() < min_vertices {
        return coords.to_vec();
    }
    kept.into_iter().map(|i| coords[i]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collinear_vertices_removed_with_z() {
        let line = Shape::LineString(vec![
            Coord::xyz(0.0, 0.0, 1.0),
            Coord::xyz(1.0, 0.0, 2.0),
            Coord::xyz(2.0, 0.0, 3.0),
            Coord::xyz(3.0, 0.0, 4.0),
        ]);
        let simplified = simplify_shape(&line, 0.1);
        assert_eq!(
            simplified,
            Shape::LineString(vec![Coord::xyz(0.0, 0.0, 1.0), Coord::xyz(3.0, 0.0, 4.0)])
        );
    }

    #[test]
    fn test_ring_keeps_minimum() {
        let ring = vec![
            Coord::xy(0.0, 0.0),
            Coord::xy(1.0, 0.001),
            Coord::xy(2.0, 0.0),
            Coord::xy(1.0, -0.001),
            Coord::xy(0.0, 0.0),
        ];
        let simplified = simplify_shape(&Shape::Polygon(vec![ring]), 1.0);
        match simplified {
            Shape::Polygon(rings) => assert!(rings[0].len() >= MIN_RING_VERTICES),
            other => panic!("unexpected shape {:?}", other),
        }
    }

    #[test]
    fn test_points_untouched() {
        let shape = Shape::MultiPoint(vec![Coord::xy(0.0, 0.0), Coord::xy(0.0, 0.0)]);
        assert_eq!(simplify_shape(&shape, 10.0), shape);
    }
}
