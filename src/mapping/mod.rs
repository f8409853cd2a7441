//! Feature mapping layer
//!
//! Converts between stored rows and `FeatureRecord`s.
//!
//! - Read: ids resolved from the feature-id column, falling back to
//!   `<table>.<row index>`; geometries decoded; attributes coerced to their
//!   declared types
//! - Write: values resolved per declared field, constraints checked,
//!   geometries encoded with the column's negotiated dimension

mod constraints;
mod reader;
mod record;
mod writer;

pub use constraints::violation;
pub use reader::{FeatureReader, KEY_CHUNK_SIZE};
pub use record::FeatureRecord;
pub use writer::{insert_all, FeatureWriter};
