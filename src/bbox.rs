//! Query and extent rectangles tagged with a spatial reference
//!
//! Spatial references are opaque: two boxes are comparable only when their
//! SRID and organization match.

use crate::geometry::Envelope;

/// Organization used when none is given
pub const DEFAULT_ORGANIZATION: &str = "EPSG";

/// Axis-aligned rectangle with a spatial reference
#[derive(Debug, Clone, PartialEq)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
    pub srs_id: i32,
    pub organization: String,
}

impl BoundingBox {
    /// Box in EPSG:4326
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self::with_srs(min_x, min_y, max_x, max_y, 4326, DEFAULT_ORGANIZATION)
    }

    pub fn with_srs(
        min_x: f64,
        min_y: f64,
        max_x: f64,
        max_y: f64,
        srs_id: i32,
        organization: &str,
    ) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
            srs_id,
            organization: organization.to_string(),
        }
    }

    /// A box that contains nothing and intersects nothing
    pub fn empty(srs_id: i32, organization: &str) -> Self {
        Self::with_srs(
            f64::INFINITY,
            f64::INFINITY,
            f64::NEG_INFINITY,
            f64::NEG_INFINITY,
            srs_id,
            organization,
        )
    }

    pub fn from_envelope(envelope: &Envelope, srs_id: i32, organization: &str) -> Self {
        Self::with_srs(
            envelope.min_x,
            envelope.min_y,
            envelope.max_x,
            envelope.max_y,
            srs_id,
            organization,
        )
    }

    pub fn to_envelope(&self) -> Envelope {
        Envelope::new(self.min_x, self.max_x, self.min_y, self.max_y)
    }

    /// True for inverted or NaN boxes
    pub fn is_empty(&self) -> bool {
        !(self.min_x <= self.max_x && self.min_y <= self.max_y)
    }

    /// Same SRID and organization (case-insensitive)
    pub fn same_reference(&self, srs_id: i32, organization: &str) -> bool {
        self.srs_id == srs_id && self.organization.eq_ignore_ascii_case(organization)
    }

    /// Closed intersection test; touching edges intersect
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.intersects_envelope(&other.to_envelope())
    }

    pub fn intersects_envelope(&self, e: &Envelope) -> bool {
        if self.is_empty() {
            return false;
        }
        self.min_x <= e.max_x && self.max_x >= e.min_x && self.min_y <= e.max_y && self.max_y >= e.min_y
    }

    /// `other` lies inside this box (closed)
    pub fn contains(&self, other: &BoundingBox) -> bool {
        !other.is_empty() && self.contains_envelope(&other.to_envelope())
    }

    pub fn contains_envelope(&self, e: &Envelope) -> bool {
        if self.is_empty() {
            return false;
        }
        e.min_x >= self.min_x && e.max_x <= self.max_x && e.min_y >= self.min_y && e.max_y <= self.max_y
    }

    /// This box lies inside `e` (closed)
    pub fn is_within_envelope(&self, e: &Envelope) -> bool {
        !self.is_empty()
            && self.min_x >= e.min_x
            && self.max_x <= e.max_x
            && self.min_y >= e.min_y
            && self.max_y <= e.max_y
    }
}
