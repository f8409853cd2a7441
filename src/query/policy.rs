//! Extent and per-feature match policies shared by every scan path

use crate::bbox::BoundingBox;
use crate::geometry::Envelope;

/// Whether a feature query can hit anything in a table with `extent`.
///
/// Accepts an intersection (when requested), a query inside the table
/// extent, or a table extent inside the query.
pub fn feature_extent_accepts(query: &BoundingBox, extent: &BoundingBox, include_intersect: bool) -> bool {
    (include_intersect && query.intersects(extent)) || extent.contains(query) || query.contains(extent)
}

/// Whether a feature query can hit a table whose extent was computed from
/// the stored geometries rather than declared in the catalog
pub fn derived_extent_accepts(query: &BoundingBox, derived: &BoundingBox) -> bool {
    query.intersects(derived) || query.contains(derived)
}

/// Whether a tile query touches the registered tile extent
pub fn tile_extent_accepts(query: &BoundingBox, extent: &BoundingBox) -> bool {
    query.intersects(extent) || query.contains(extent)
}

/// Whether a feature with envelope `e` belongs in the result
pub fn feature_matches(query: &BoundingBox, e: &Envelope, include_intersect: bool) -> bool {
    query.contains_envelope(e) || (include_intersect && query.intersects_envelope(e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> BoundingBox {
        BoundingBox::new(min_x, min_y, max_x, max_y)
    }

    #[test]
    fn test_feature_extent_policy() {
        let extent = b(0.0, 0.0, 10.0, 10.0);
        // query inside table
        assert!(feature_extent_accepts(&b(2.0, 2.0, 3.0, 3.0), &extent, false));
        // table inside query
        assert!(feature_extent_accepts(&b(-1.0, -1.0, 11.0, 11.0), &extent, false));
        // partial overlap needs include_intersect
        assert!(!feature_extent_accepts(&b(5.0, 5.0, 15.0, 15.0), &extent, false));
        assert!(feature_extent_accepts(&b(5.0, 5.0, 15.0, 15.0), &extent, true));
        // disjoint
        assert!(!feature_extent_accepts(&b(20.0, 20.0, 30.0, 30.0), &extent, true));
    }

    #[test]
    fn test_derived_extent_accepts_partial_overlap() {
        // Stored points at (1,1) and (50,50), query reaching only the first
        let derived = b(1.0, 1.0, 50.0, 50.0);
        let query = b(0.0, 0.0, 3.0, 3.0);
        assert!(!feature_extent_accepts(&query, &derived, false));
        assert!(derived_extent_accepts(&query, &derived));
        assert!(derived_extent_accepts(&b(-10.0, -10.0, 60.0, 60.0), &derived));
        assert!(!derived_extent_accepts(&b(60.0, 60.0, 70.0, 70.0), &derived));
    }

    #[test]
    fn test_feature_match_policy() {
        let q = b(0.0, 0.0, 10.0, 10.0);
        let inside = Envelope::new(1.0, 2.0, 1.0, 2.0);
        let straddling = Envelope::new(9.0, 12.0, 9.0, 12.0);
        let on_edge = Envelope::new(10.0, 10.0, 5.0, 5.0);

        assert!(feature_matches(&q, &inside, false));
        assert!(!feature_matches(&q, &straddling, false));
        assert!(feature_matches(&q, &straddling, true));
        assert!(feature_matches(&q, &on_edge, false));
    }

    #[test]
    fn test_tile_extent_policy() {
        let extent = b(-180.0, -90.0, 180.0, 90.0);
        assert!(tile_extent_accepts(&b(170.0, 80.0, 190.0, 100.0), &extent));
        assert!(!tile_extent_accepts(&b(200.0, 0.0, 210.0, 10.0), &extent));
    }
}
