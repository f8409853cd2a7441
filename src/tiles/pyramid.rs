//! Tile matrix geometry
//!
//! Column and row grow east and south from the top-left corner of the
//! matrix set bounds. Ground pixel size doubles for every zoom level below
//! the maximum.

use crate::bbox::BoundingBox;
use crate::errors::{GpkgError, GpkgResult};
use crate::geometry::Envelope;

/// Deepest pyramid accepted by `TilePyramid::build`
pub const MAX_ZOOM_LEVEL: u32 = 30;

/// One zoom level of a pyramid
#[derive(Debug, Clone, PartialEq)]
pub struct TileMatrix {
    pub zoom_level: u32,
    /// Width in tiles
    pub matrix_width: u32,
    /// Height in tiles
    pub matrix_height: u32,
    /// Tile width in pixels
    pub tile_width: u32,
    /// Tile height in pixels
    pub tile_height: u32,
    pub pixel_x_size: f64,
    pub pixel_y_size: f64,
}

impl TileMatrix {
    /// Ground width of one tile
    pub fn tile_span_x(&self) -> f64 {
        self.pixel_x_size * self.tile_width as f64
    }

    /// Ground height of one tile
    pub fn tile_span_y(&self) -> f64 {
        self.pixel_y_size * self.tile_height as f64
    }
}

/// Extent and reference shared by all zoom levels of a tile table
#[derive(Debug, Clone, PartialEq)]
pub struct TileMatrixSet {
    pub table_name: String,
    pub srs_id: i32,
    pub bounds: Envelope,
}

/// Inclusive 0-based column/row window at one zoom level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRange {
    pub zoom_level: u32,
    pub min_column: u32,
    pub max_column: u32,
    pub min_row: u32,
    pub max_row: u32,
}

impl TileRange {
    pub fn tile_count(&self) -> u64 {
        (self.max_column - self.min_column + 1) as u64 * (self.max_row - self.min_row + 1) as u64
    }
}

/// A matrix set plus one matrix per zoom level
#[derive(Debug, Clone, PartialEq)]
pub struct TilePyramid {
    pub set: TileMatrixSet,
    pub matrices: Vec<TileMatrix>,
}

impl TilePyramid {
    pub fn new(set: TileMatrixSet, mut matrices: Vec<TileMatrix>) -> Self {
        matrices.sort_by_key(|m| m.zoom_level);
        Self { set, matrices }
    }

    /// Generates matrices for zoom `0..=max_zoom`.
    ///
    /// `gsd_x`/`gsd_y` are the ground pixel sizes at `max_zoom`.
    pub fn build(
        table_name: &str,
        srs_id: i32,
        bounds: Envelope,
        max_zoom: u32,
        tile_pixels: u32,
        gsd_x: f64,
        gsd_y: f64,
    ) -> GpkgResult<Self> {
        if !(bounds.min_x < bounds.max_x && bounds.min_y < bounds.max_y) {
            return Err(GpkgError::validation(format!(
                "Tile bounds of '{}' must have positive width and height",
                table_name
            )));
        }
        if max_zoom > MAX_ZOOM_LEVEL {
            return Err(GpkgError::validation(format!(
                "Maximum zoom {} exceeds {}",
                max_zoom, MAX_ZOOM_LEVEL
            )));
        }
        if tile_pixels == 0 {
            return Err(GpkgError::validation("Tile size must be at least one pixel"));
        }
        if !(gsd_x > 0.0 && gsd_y > 0.0) || !gsd_x.is_finite() || !gsd_y.is_finite() {
            return Err(GpkgError::validation(format!(
                "Ground pixel size must be positive, got ({}, {})",
                gsd_x, gsd_y
            )));
        }

        let width = bounds.max_x - bounds.min_x;
        let height = bounds.max_y - bounds.min_y;
        let mut matrices = Vec::with_capacity(max_zoom as usize + 1);
        for zoom in 0..=max_zoom {
            let factor = (1u64 << (max_zoom - zoom)) as f64;
            let pixel_x_size = gsd_x * factor;
            let pixel_y_size = gsd_y * factor;
            let span_x = pixel_x_size * tile_pixels as f64;
            let span_y = pixel_y_size * tile_pixels as f64;
            matrices.push(TileMatrix {
                zoom_level: zoom,
                matrix_width: tiles_needed(width, span_x),
                matrix_height: tiles_needed(height, span_y),
                tile_width: tile_pixels,
                tile_height: tile_pixels,
                pixel_x_size,
                pixel_y_size,
            });
        }

        Ok(Self::new(
            TileMatrixSet {
                table_name: table_name.to_string(),
                srs_id,
                bounds,
            },
            matrices,
        ))
    }

    pub fn matrix(&self, zoom: u32) -> Option<&TileMatrix> {
        self.matrices.iter().find(|m| m.zoom_level == zoom)
    }

    pub fn max_zoom(&self) -> Option<u32> {
        self.matrices.last().map(|m| m.zoom_level)
    }

    /// Geographic bounds of one tile.
    ///
    /// Column and row are validated against `[1, width] x [1, height]`; a
    /// tile outside that window, or an unknown zoom, yields an empty box.
    pub fn tile_bounds(&self, column: u32, row: u32, zoom: u32, organization: &str) -> BoundingBox {
        let srs_id = self.set.srs_id;
        let Some(matrix) = self.matrix(zoom) else {
            return BoundingBox::empty(srs_id, organization);
        };
        if column < 1 || column > matrix.matrix_width || row < 1 || row > matrix.matrix_height {
            return BoundingBox::empty(srs_id, organization);
        }
        let (column, row) = (u64::from(column), u64::from(row));
        BoundingBox::with_srs(
            self.column_edge(matrix, column),
            self.row_edge(matrix, row + 1),
            self.column_edge(matrix, column + 1),
            self.row_edge(matrix, row),
            srs_id,
            organization,
        )
    }

    // Both edges of neighbouring tiles come from this one expression, so
    // they compare equal.
    fn column_edge(&self, matrix: &TileMatrix, column: u64) -> f64 {
        self.set.bounds.min_x + matrix.tile_span_x() * column as f64
    }

    fn row_edge(&self, matrix: &TileMatrix, row: u64) -> f64 {
        self.set.bounds.max_y - matrix.tile_span_y() * row as f64
    }

    /// Tiles at `zoom` touched by `bbox`, 0-based and clamped to the matrix.
    ///
    /// `None` when the box misses the matrix set bounds.
    pub fn tile_range(&self, bbox: &BoundingBox, zoom: u32) -> Option<TileRange> {
        let matrix = self.matrix(zoom)?;
        if bbox.is_empty() || !bbox.intersects_envelope(&self.set.bounds) {
            return None;
        }
        let b = &self.set.bounds;
        let span_x = matrix.tile_span_x();
        let span_y = matrix.tile_span_y();

        let clamp = |v: f64, max: u32| -> u32 {
            if v <= 0.0 {
                0
            } else {
                (v.floor() as u64).min(max.saturating_sub(1) as u64) as u32
            }
        };

        Some(TileRange {
            zoom_level: zoom,
            min_column: clamp((bbox.min_x - b.min_x) / span_x, matrix.matrix_width),
            max_column: clamp((bbox.max_x - b.min_x) / span_x, matrix.matrix_width),
            min_row: clamp((b.max_y - bbox.max_y) / span_y, matrix.matrix_height),
            max_row: clamp((b.max_y - bbox.min_y) / span_y, matrix.matrix_height),
        })
    }

    /// `tile_range` for every zoom level that the box touches
    pub fn tile_ranges(&self, bbox: &BoundingBox) -> Vec<TileRange> {
        self.matrices
            .iter()
            .filter_map(|m| self.tile_range(bbox, m.zoom_level))
            .collect()
    }
}

fn tiles_needed(extent: f64, span: f64) -> u32 {
    let n = (extent / span).ceil();
    if n < 1.0 {
        1
    } else if n > u32::MAX as f64 {
        u32::MAX
    } else {
        n as u32
    }
}
