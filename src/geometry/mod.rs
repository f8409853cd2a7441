//! Geometry values and their binary blob format
//!
//! - `types`: coordinate payloads, envelopes and the `GeometryValue` wrapper
//! - `body`: ISO WKB bodies (2D and 3D) through the `wkb` crate
//! - `codec`: the container blob header around a WKB body
//! - `simplify`: lossy write-path vertex reduction
//! - `sql_functions`: envelope functions registered on the SQLite connection

mod body;
mod codec;
mod simplify;
mod sql_functions;
mod types;

pub use body::{read_body, write_body, BodyError};
pub use codec::{
    decode, is_empty_blob, read_envelope, read_header, GeometryCodec, GeometryHeader,
    GEOMETRY_MAGIC,
};
pub use simplify::simplify_shape;
pub use sql_functions::register_envelope_functions;
pub use types::{Coord, Envelope, GeometryValue, Shape};

/// Geometry type names accepted for feature tables
pub const GEOMETRY_TYPE_NAMES: [&str; 8] = [
    "GEOMETRY",
    "POINT",
    "LINESTRING",
    "POLYGON",
    "MULTIPOINT",
    "MULTILINESTRING",
    "MULTIPOLYGON",
    "GEOMETRYCOLLECTION",
];

/// Case-insensitive allow-list check
pub fn is_known_geometry_type(name: &str) -> bool {
    GEOMETRY_TYPE_NAMES
        .iter()
        .any(|known| known.eq_ignore_ascii_case(name))
}
