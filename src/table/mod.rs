//! Table handles
//!
//! Descriptors come from the catalog; handles are short-lived views bound
//! to a `Container`.
//!
//! - `Table`: any registered or system table
//! - `FeatureTable`: vector features with a geometry column
//! - `TileTable`: raster tile pyramids

mod descriptor;
mod feature;
mod feature_type;
mod generic;
mod tile;

pub use descriptor::{
    FeatureInfo, FieldDescriptor, FieldType, TableDescriptor, TableKind, SYNTHETIC_PRIMARY_KEY,
};
pub use feature::{
    feature_id_index_name, rtree_table_name, validate_identifier, FeatureTable,
    FEATURE_ID_INDEX_PREFIX,
};
pub use feature_type::{negotiated_dimension, FeatureType, MANDATORY, OPTIONAL, PROHIBITED};
pub use generic::Table;
pub use tile::TileTable;

pub(crate) use tile::tile_from_row;
