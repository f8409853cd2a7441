//! Container configuration
//!
//! Configured once when the container is opened and immutable afterwards.
//! Every component receives the values it needs from the owning container.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::errors::{GpkgError, GpkgResult};

/// GeoPackage application id ("GPKG")
pub const GPKG_APPLICATION_ID: u32 = 0x4750_4B47;

/// GeoPackage 1.2 user version
pub const GPKG_USER_VERSION: i32 = 10200;

/// Default number of rows fetched per page by paged reads
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Byte order used when writing geometry blobs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    Big,
    Little,
}

impl ByteOrder {
    /// Returns true for little endian
    pub fn is_little(self) -> bool {
        self == ByteOrder::Little
    }
}

/// Configuration owned by a `Container`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    /// Whether validation failures abort the operation.
    ///
    /// When `false` (lenient), a missing format marker is tolerated and
    /// constraint violations degrade to a logged warning.
    pub strict: bool,
    /// Byte order for the geometry header and WKB body.
    pub byte_order: ByteOrder,
    /// Version byte written into every geometry header.
    pub header_version: u8,
    /// Rows per page for paged scans.
    pub page_size: usize,
    /// Geometries with more vertices than this are simplified before write.
    pub max_vertices: Option<usize>,
    /// Douglas-Peucker tolerance used for write-path simplification.
    pub simplify_tolerance: f64,
    /// Whether new feature tables get an R-tree spatial index.
    pub spatial_index: bool,
    /// Format marker stored as the SQLite application id.
    pub application_id: u32,
    /// Format version stored as the SQLite user version.
    pub user_version: i32,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            strict: true,
            byte_order: ByteOrder::Little,
            header_version: 0,
            page_size: DEFAULT_PAGE_SIZE,
            max_vertices: None,
            simplify_tolerance: 0.0,
            spatial_index: true,
            application_id: GPKG_APPLICATION_ID,
            user_version: GPKG_USER_VERSION,
        }
    }
}

impl ContainerConfig {
    /// Create a strict configuration (default).
    pub fn strict() -> Self {
        Self::default()
    }

    /// Create a lenient configuration.
    pub fn lenient() -> Self {
        Self {
            strict: false,
            ..Self::default()
        }
    }

    /// Returns a copy with the given page size.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Returns a copy with write-path simplification enabled.
    pub fn with_simplification(mut self, max_vertices: usize, tolerance: f64) -> Self {
        self.max_vertices = Some(max_vertices);
        self.simplify_tolerance = tolerance;
        self
    }

    /// Returns a copy that never creates spatial indexes.
    pub fn without_spatial_index(mut self) -> Self {
        self.spatial_index = false;
        self
    }

    /// Loads a configuration from a JSON file. Missing keys keep defaults.
    pub fn from_json_file(path: &Path) -> GpkgResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            GpkgError::io_error(format!("Failed to read config: {}", path.display()), e)
        })?;
        let config: ContainerConfig = serde_json::from_str(&content).map_err(|e| {
            GpkgError::validation(format!("Invalid config '{}': {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> GpkgResult<()> {
        if self.page_size == 0 {
            return Err(GpkgError::validation("page_size must be greater than 0"));
        }
        if !(self.simplify_tolerance >= 0.0) {
            return Err(GpkgError::validation(
                "simplify_tolerance must be a non-negative number",
            ));
        }
        if self.max_vertices == Some(0) {
            return Err(GpkgError::validation("max_vertices must be greater than 0"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_is_strict() {
        let config = ContainerConfig::default();
        assert!(config.strict);
        assert_eq!(config.page_size, 1000);
        assert_eq!(config.application_id, 0x47504B47);
        assert_eq!(config.byte_order, ByteOrder::Little);
    }

    #[test]
    fn test_lenient() {
        assert!(!ContainerConfig::lenient().strict);
    }

    #[test]
    fn test_zero_page_size_rejected() {
        let config = ContainerConfig::default().with_page_size(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_partial_json() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"strict": false, "page_size": 25, "byte_order": "big"}}"#).unwrap();

        let config = ContainerConfig::from_json_file(file.path()).unwrap();
        assert!(!config.strict);
        assert_eq!(config.page_size, 25);
        assert_eq!(config.byte_order, ByteOrder::Big);
        assert!(config.spatial_index);
    }
}
