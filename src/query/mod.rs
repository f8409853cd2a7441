//! Spatial query engine
//!
//! Answers bounding-box queries over feature and tile tables.
//!
//! # Order of checks
//!
//! 1. Query box and table must share SRID and organization, else empty
//! 2. Optional extent test against declared (or derived) table bounds
//! 3. Candidate selection: tile ranges, R-tree join, or linear scan
//!
//! The R-tree and linear paths apply the same envelope policy, so they
//! return the same rows in the same order.

mod engine;
mod policy;

pub use engine::{QueryEngine, QueryResult, ScanStrategy};
pub use policy::{feature_extent_accepts, feature_matches, tile_extent_accepts};
