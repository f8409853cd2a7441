//! Backing store subsystem
//!
//! Wraps one SQLite connection. Everything above this layer talks in
//! `Value`s and `RowSet`s; nothing outside `store` touches rusqlite rows.
//!
//! # Design Principles
//!
//! - Parameterized SQL only for values
//! - Multi-statement writes go through `execute_atomic`
//! - Cursors are closed on every exit path

mod connection;
mod cursor;

pub use connection::{
    read_header_application_id, write_header_application_id, SqlStatement, Store,
    HEADER_APPLICATION_ID_OFFSET,
};
pub use cursor::{
    quote_ident, Cursor, CursorGuard, PageSpec, PagedCursor, RowCursor, RowSet,
    RowView,
};
