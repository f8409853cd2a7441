//! gpkgdb - A GeoPackage storage engine
//!
//! Vector features and raster tile pyramids in a single SQLite file, with a
//! self-describing catalog of spatial references, table bounds, column
//! metadata and extensions.
//!
//! ```ignore
//! let container = Container::open_or_create("poi.gpkg", false, ContainerConfig::default())?;
//! let poi = container.create_feature_table(&FeatureType::new("poi", "POINT", 4326), None)?;
//! let hits = QueryEngine::new(&container).query_features(&poi, &bbox, true, true)?;
//! ```

pub mod bbox;
pub mod catalog;
pub mod config;
pub mod container;
pub mod errors;
pub mod geometry;
pub mod mapping;
pub mod metadata;
pub mod observability;
pub mod query;
pub mod store;
pub mod table;
pub mod tiles;
pub mod value;

pub use bbox::BoundingBox;
pub use config::ContainerConfig;
pub use container::Container;
pub use errors::{GpkgError, GpkgErrorCode, GpkgResult, Severity};
pub use geometry::{Coord, Envelope, GeometryValue, Shape};
pub use mapping::{FeatureReader, FeatureRecord, FeatureWriter};
pub use metadata::{MetadataEntry, MetadataReference, ReferenceScope};
pub use query::{QueryEngine, QueryResult, ScanStrategy};
pub use table::{FeatureTable, FeatureType, FieldDescriptor, FieldType, Table, TileTable};
pub use tiles::{TilePyramid, TileRecord};
pub use value::Value;
