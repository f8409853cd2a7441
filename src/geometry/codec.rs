//! Geometry blob codec
//!
//! Blob layout:
//!
//! ```text
//! +-------+---------+-------+----------+-------------------+-----------+
//! | "GP"  | version | flags | srs_id   | envelope          | WKB body  |
//! | 2 B   | 1 B     | 1 B   | i32 4 B  | 0/32/48/64 B      | remainder |
//! +-------+---------+-------+----------+-------------------+-----------+
//! ```
//!
//! Flags: bit 0 byte order (1 = little endian), bits 1-3 envelope indicator,
//! bit 4 empty geometry, bit 5 extended encoding.

use crate::config::{ByteOrder, ContainerConfig};
use crate::errors::{GpkgError, GpkgResult};
use crate::observability::{log_event, Event};

use super::simplify::simplify_shape;
use super::types::{Envelope, GeometryValue};
use super::body::{read_body, write_body, BodyError};

/// Leading magic bytes of every geometry blob
pub const GEOMETRY_MAGIC: [u8; 2] = *b"GP";

const FLAG_LITTLE_ENDIAN: u8 = 0x01;
const ENVELOPE_MASK: u8 = 0x0E;
const FLAG_EMPTY: u8 = 0x10;
const FLAG_EXTENDED: u8 = 0x20;

/// Envelope indicator for an xy envelope
const ENVELOPE_XY: u8 = 1;

const FIXED_HEADER_LEN: usize = 8;

/// Parsed fixed part of a geometry blob
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeometryHeader {
    pub version: u8,
    pub flags: u8,
    pub srs_id: i32,
    pub envelope: Option<Envelope>,
    /// Offset of the WKB body
    pub body_offset: usize,
}

impl GeometryHeader {
    pub fn is_little_endian(&self) -> bool {
        self.flags & FLAG_LITTLE_ENDIAN != 0
    }

    pub fn is_empty(&self) -> bool {
        self.flags & FLAG_EMPTY != 0
    }

    pub fn envelope_indicator(&self) -> u8 {
        (self.flags & ENVELOPE_MASK) >> 1
    }
}

/// Encoder/decoder bound to the container configuration
#[derive(Debug, Clone)]
pub struct GeometryCodec {
    byte_order: ByteOrder,
    header_version: u8,
    max_vertices: Option<usize>,
    simplify_tolerance: f64,
}

impl GeometryCodec {
    pub fn new(config: &ContainerConfig) -> Self {
        Self {
            byte_order: config.byte_order,
            header_version: config.header_version,
            max_vertices: config.max_vertices,
            simplify_tolerance: config.simplify_tolerance,
        }
    }

    /// Encodes `geometry` with `output_dimension` ordinates per vertex.
    ///
    /// Geometries above the configured vertex limit are simplified first;
    /// that step is lossy.
    pub fn encode(&self, geometry: &GeometryValue, output_dimension: u8) -> GpkgResult<Vec<u8>> {
        if output_dimension != 2 && output_dimension != 3 {
            return Err(GpkgError::unsupported_dimension(output_dimension));
        }

        let simplified;
        let mut shape = &geometry.shape;
        if let Some(limit) = self.max_vertices {
            let before = shape.vertex_count();
            if before > limit {
                simplified = simplify_shape(shape, self.simplify_tolerance);
                let after = simplified.vertex_count();
                log_event(
                    Event::GeometrySimplified,
                    &[
                        ("before", before.to_string().as_str()),
                        ("after", after.to_string().as_str()),
                        ("limit", limit.to_string().as_str()),
                    ],
                );
                shape = &simplified;
            }
        }

        let empty = shape.is_empty();
        let mut flags = if self.byte_order.is_little() {
            FLAG_LITTLE_ENDIAN
        } else {
            0
        };
        let envelope = if empty {
            // Empty geometries also flip the byte-order bit. Files already
            // written this way depend on it, so the bit is kept and every
            // multi-byte value below follows the flipped order.
            flags |= FLAG_EMPTY;
            flags ^= FLAG_LITTLE_ENDIAN;
            None
        } else {
            flags |= ENVELOPE_XY << 1;
            shape.envelope()
        };
        let little = flags & FLAG_LITTLE_ENDIAN != 0;

        let mut out = Vec::with_capacity(FIXED_HEADER_LEN + 32 + 5 + shape.vertex_count() * 24);
        out.extend_from_slice(&GEOMETRY_MAGIC);
        out.push(self.header_version);
        out.push(flags);
        push_i32(&mut out, geometry.srs_id, little);
        if let Some(e) = envelope {
            for v in [e.min_x, e.max_x, e.min_y, e.max_y] {
                push_f64(&mut out, v, little);
            }
        }
        let body_offset = out.len();
        write_body(shape, output_dimension, little, &mut out)
            .map_err(|e| body_error(e, body_offset))?;
        Ok(out)
    }

    /// Decodes a blob; see [`decode`]
    pub fn decode(&self, bytes: &[u8]) -> GpkgResult<GeometryValue> {
        decode(bytes)
    }
}

fn push_i32(out: &mut Vec<u8>, v: i32, little: bool) {
    if little {
        out.extend_from_slice(&v.to_le_bytes());
    } else {
        out.extend_from_slice(&v.to_be_bytes());
    }
}

fn push_f64(out: &mut Vec<u8>, v: f64, little: bool) {
    if little {
        out.extend_from_slice(&v.to_le_bytes());
    } else {
        out.extend_from_slice(&v.to_be_bytes());
    }
}

fn read_f64_at(bytes: &[u8], offset: usize, little: bool) -> f64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[offset..offset + 8]);
    if little {
        f64::from_le_bytes(buf)
    } else {
        f64::from_be_bytes(buf)
    }
}

/// Parses the header without touching the WKB body
pub fn read_header(bytes: &[u8]) -> GpkgResult<GeometryHeader> {
    if bytes.len() < FIXED_HEADER_LEN {
        return Err(GpkgError::decode_at_offset(
            bytes.len(),
            "geometry blob shorter than its fixed header",
        ));
    }
    if bytes[0..2] != GEOMETRY_MAGIC {
        return Err(GpkgError::decode_at_offset(0, "missing geometry magic 'GP'"));
    }
    let version = bytes[2];
    let flags = bytes[3];
    if flags & FLAG_EXTENDED != 0 {
        return Err(GpkgError::decode_at_offset(
            3,
            "extended geometry encoding is not supported",
        ));
    }
    let little = flags & FLAG_LITTLE_ENDIAN != 0;

    let mut srs = [0u8; 4];
    srs.copy_from_slice(&bytes[4..8]);
    let srs_id = if little {
        i32::from_le_bytes(srs)
    } else {
        i32::from_be_bytes(srs)
    };

    let indicator = (flags & ENVELOPE_MASK) >> 1;
    let envelope_len = match indicator {
        0 => 0,
        1 => 32,
        2 | 3 => 48,
        4 => 64,
        other => {
            return Err(GpkgError::decode_at_offset(
                3,
                format!("invalid envelope indicator {}", other),
            ))
        }
    };
    let body_offset = FIXED_HEADER_LEN + envelope_len;
    if bytes.len() < body_offset {
        return Err(GpkgError::decode_at_offset(
            bytes.len(),
            "geometry blob truncated inside envelope",
        ));
    }

    let envelope = if envelope_len > 0 {
        let at = |i: usize| read_f64_at(bytes, FIXED_HEADER_LEN + i * 8, little);
        Some(Envelope::new(at(0), at(1), at(2), at(3)))
    } else {
        None
    };

    Ok(GeometryHeader {
        version,
        flags,
        srs_id,
        envelope,
        body_offset,
    })
}

/// Decodes a full geometry blob
pub fn decode(bytes: &[u8]) -> GpkgResult<GeometryValue> {
    let header = read_header(bytes)?;
    let (shape, dimension) =
        read_body(&bytes[header.body_offset..]).map_err(|e| body_error(e, header.body_offset))?;
    Ok(GeometryValue {
        srs_id: header.srs_id,
        dimension,
        envelope: header.envelope,
        shape,
    })
}

/// Reads only the envelope when the header carries one, otherwise decodes
/// the body and computes it. Empty geometries have no envelope.
pub fn read_envelope(bytes: &[u8]) -> GpkgResult<Option<Envelope>> {
    let header = read_header(bytes)?;
    if header.envelope.is_some() {
        return Ok(header.envelope);
    }
    if header.is_empty() {
        return Ok(None);
    }
    Ok(decode(bytes)?.shape.envelope())
}

/// True when the blob is flagged empty or its body has no vertices
pub fn is_empty_blob(bytes: &[u8]) -> GpkgResult<bool> {
    let header = read_header(bytes)?;
    if header.is_empty() {
        return Ok(true);
    }
    if header.envelope.is_some() {
        return Ok(false);
    }
    Ok(decode(bytes)?.is_empty())
}

fn body_error(err: BodyError, body_offset: usize) -> GpkgError {
    match err {
        BodyError::Measured(_) | BodyError::Unsupported(_) | BodyError::Write(_) => {
            GpkgError::validation(format!("unsupported geometry: {}", err))
        }
        other => {
            let offset = body_offset + other.offset().unwrap_or(0);
            GpkgError::decode_at_offset(offset, other.to_string())
        }
    }
}
