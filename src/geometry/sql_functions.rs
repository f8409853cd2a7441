//! Envelope SQL functions used by the R-tree maintenance triggers
//!
//! `ST_MinX`, `ST_MaxX`, `ST_MinY`, `ST_MaxY` return NULL for NULL or empty
//! geometries; `ST_IsEmpty` returns NULL for NULL input.

use rusqlite::functions::{Context, FunctionFlags};
use rusqlite::Connection;

use super::codec::{is_empty_blob, read_envelope};
use super::types::Envelope;

/// Registers the envelope functions on `conn`
pub fn register_envelope_functions(conn: &Connection) -> rusqlite::Result<()> {
    let flags = FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC;

    conn.create_scalar_function("ST_MinX", 1, flags, |ctx| envelope_part(ctx, |e| e.min_x))?;
    conn.create_scalar_function("ST_MaxX", 1, flags, |ctx| envelope_part(ctx, |e| e.max_x))?;
    conn.create_scalar_function("ST_MinY", 1, flags, |ctx| envelope_part(ctx, |e| e.min_y))?;
    conn.create_scalar_function("ST_MaxY", 1, flags, |ctx| envelope_part(ctx, |e| e.max_y))?;
    conn.create_scalar_function("ST_IsEmpty", 1, flags, |ctx| {
        let blob: Option<Vec<u8>> = ctx.get(0)?;
        match blob {
            Some(bytes) => is_empty_blob(&bytes)
                .map(Some)
                .map_err(|e| rusqlite::Error::UserFunctionError(Box::new(e))),
            None => Ok(None),
        }
    })?;
    Ok(())
}

fn envelope_part(ctx: &Context<'_>, pick: fn(&Envelope) -> f64) -> rusqlite::Result<Option<f64>> {
    let blob: Option<Vec<u8>> = ctx.get(0)?;
    let Some(bytes) = blob else {
        return Ok(None);
    };
    let envelope =
        read_envelope(&bytes).map_err(|e| rusqlite::Error::UserFunctionError(Box::new(e)))?;
    Ok(envelope.map(|e| pick(&e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ContainerConfig;
    use crate::geometry::{GeometryCodec, GeometryValue, Shape};

    #[test]
    fn test_envelope_functions() {
        let conn = Connection::open_in_memory().unwrap();
        register_envelope_functions(&conn).unwrap();

        let codec = GeometryCodec::new(&ContainerConfig::default());
        let blob = codec
            .encode(&GeometryValue::point(4326, 3.0, -4.0), 2)
            .unwrap();

        let (min_x, max_y, empty): (f64, f64, bool) = conn
            .query_row(
                "SELECT ST_MinX(?1), ST_MaxY(?1), ST_IsEmpty(?1)",
                [&blob],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .unwrap();
        assert_eq!(min_x, 3.0);
        assert_eq!(max_y, -4.0);
        assert!(!empty);
    }

    #[test]
    fn test_empty_and_null() {
        let conn = Connection::open_in_memory().unwrap();
        register_envelope_functions(&conn).unwrap();

        let codec = GeometryCodec::new(&ContainerConfig::default());
        let blob = codec
            .encode(&GeometryValue::new(4326, Shape::LineString(vec![])), 2)
            .unwrap();

        let (min_x, empty): (Option<f64>, bool) = conn
            .query_row("SELECT ST_MinX(?1), ST_IsEmpty(?1)", [&blob], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .unwrap();
        assert_eq!(min_x, None);
        assert!(empty);

        let null_x: Option<f64> = conn
            .query_row("SELECT ST_MinX(NULL)", [], |row| row.get(0))
            .unwrap();
        assert_eq!(null_x, None);
    }
}
