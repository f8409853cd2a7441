//! Tile pyramid math and tile payloads
//!
//! - `pyramid`: zoom/column/row to ground bounds and back
//! - `TileRecord`: one stored tile image

mod pyramid;

pub use pyramid::{TileMatrix, TileMatrixSet, TilePyramid, TileRange, MAX_ZOOM_LEVEL};

use crate::errors::{GpkgError, GpkgResult};

const PNG_MAGIC: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
const JPEG_MAGIC: [u8; 3] = [0xFF, 0xD8, 0xFF];

/// Accepted tile image encodings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
}

impl ImageFormat {
    /// Sniffs the format from the leading magic bytes
    pub fn detect(data: &[u8]) -> Option<ImageFormat> {
        if data.starts_with(&PNG_MAGIC) {
            Some(ImageFormat::Png)
        } else if data.starts_with(&JPEG_MAGIC) {
            Some(ImageFormat::Jpeg)
        } else {
            None
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
        }
    }
}

/// One tile image at a pyramid position
#[derive(Debug, Clone, PartialEq)]
pub struct TileRecord {
    pub zoom_level: u32,
    pub tile_column: u32,
    pub tile_row: u32,
    pub data: Vec<u8>,
}

impl TileRecord {
    pub fn new(zoom_level: u32, tile_column: u32, tile_row: u32, data: Vec<u8>) -> Self {
        Self {
            zoom_level,
            tile_column,
            tile_row,
            data,
        }
    }

    /// Rejects payloads that are neither PNG nor JPEG
    pub fn image_format(&self) -> GpkgResult<ImageFormat> {
        ImageFormat::detect(&self.data).ok_or_else(|| {
            GpkgError::validation(format!(
                "Tile {}/{}/{} is neither PNG nor JPEG",
                self.zoom_level, self.tile_column, self.tile_row
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_image_format() {
        let png = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00];
        assert_eq!(ImageFormat::detect(&png), Some(ImageFormat::Png));
        assert_eq!(ImageFormat::detect(&[0xFF, 0xD8, 0xFF, 0xE0]), Some(ImageFormat::Jpeg));
        assert_eq!(ImageFormat::detect(b"GIF89a"), None);
        assert_eq!(ImageFormat::detect(&[0x89, 0x50]), None);
    }

    #[test]
    fn test_tile_record_rejects_unknown_payload() {
        let err = TileRecord::new(0, 0, 0, b"<svg/>".to_vec())
            .image_format()
            .unwrap_err();
        assert_eq!(err.code().code(), "GPKG_VALIDATION_FAILED");
    }
}
