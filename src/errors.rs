//! Error types for gpkgdb
//!
//! Error codes:
//! - GPKG_VALIDATION_FAILED (REJECT)
//! - GPKG_INTEGRITY_FAILED (FATAL)
//! - GPKG_CONSTRAINT_VIOLATION (REJECT)
//! - GPKG_NOT_FOUND (REJECT)
//! - GPKG_DECODE_FAILED (REJECT)
//! - GPKG_STORE_ERROR (REJECT) - low-level SQLite failure, source kept as-is
//! - GPKG_IO_ERROR (REJECT)

use std::fmt;
use std::io;

/// Severity levels for container errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The operation is rejected, the container stays usable
    Reject,
    /// The container must not be used
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Reject => write!(f, "REJECT"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Error codes for every failure class surfaced by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpkgErrorCode {
    /// Bad geometry type, unsupported dimension, unknown SRID, unregistered table
    GpkgValidationFailed,
    /// Container self-check failed on open
    GpkgIntegrityFailed,
    /// A registered column constraint rejected a value
    GpkgConstraintViolation,
    /// Unknown table or feature type requested
    GpkgNotFound,
    /// Corrupt geometry blob or unmapped storage type
    GpkgDecodeFailed,
    /// Statement or connection failure reported by the backing store
    GpkgStoreError,
    /// File system failure outside the backing store
    GpkgIoError,
}

impl GpkgErrorCode {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            GpkgErrorCode::GpkgValidationFailed => "GPKG_VALIDATION_FAILED",
            GpkgErrorCode::GpkgIntegrityFailed => "GPKG_INTEGRITY_FAILED",
            GpkgErrorCode::GpkgConstraintViolation => "GPKG_CONSTRAINT_VIOLATION",
            GpkgErrorCode::GpkgNotFound => "GPKG_NOT_FOUND",
            GpkgErrorCode::GpkgDecodeFailed => "GPKG_DECODE_FAILED",
            GpkgErrorCode::GpkgStoreError => "GPKG_STORE_ERROR",
            GpkgErrorCode::GpkgIoError => "GPKG_IO_ERROR",
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        match self {
            GpkgErrorCode::GpkgIntegrityFailed => Severity::Fatal,
            _ => Severity::Reject,
        }
    }
}

impl fmt::Display for GpkgErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Container error with code, message and optional context
#[derive(Debug)]
pub struct GpkgError {
    code: GpkgErrorCode,
    message: String,
    details: Option<String>,
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl GpkgError {
    fn new(code: GpkgErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            source: None,
        }
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(GpkgErrorCode::GpkgValidationFailed, message)
    }

    /// Create an unsupported dimension error
    pub fn unsupported_dimension(dimension: u8) -> Self {
        Self::validation(format!("Unsupported geometry dimension: {}", dimension))
    }

    /// Create an unknown spatial reference error
    pub fn unknown_srs(srs_id: i32) -> Self {
        Self::validation(format!("Spatial reference {} is not registered", srs_id))
    }

    /// Create an integrity error (FATAL)
    pub fn integrity(message: impl Into<String>) -> Self {
        Self::new(GpkgErrorCode::GpkgIntegrityFailed, message)
    }

    /// Create a constraint violation for a column value
    pub fn constraint_violation(
        table: &str,
        column: &str,
        constraint: &str,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            code: GpkgErrorCode::GpkgConstraintViolation,
            message: reason.into(),
            details: Some(format!(
                "table: {}, column: {}, constraint: {}",
                table, column, constraint
            )),
            source: None,
        }
    }

    /// Create a not found error
    pub fn not_found(what: &str, name: &str) -> Self {
        Self::new(
            GpkgErrorCode::GpkgNotFound,
            format!("{} '{}' not found", what, name),
        )
    }

    /// Create a decode error
    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(GpkgErrorCode::GpkgDecodeFailed, message)
    }

    /// Create a decode error with byte offset context
    pub fn decode_at_offset(offset: usize, reason: impl Into<String>) -> Self {
        Self {
            code: GpkgErrorCode::GpkgDecodeFailed,
            message: reason.into(),
            details: Some(format!("byte_offset: {}", offset)),
            source: None,
        }
    }

    /// Create an I/O error
    pub fn io_error(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: GpkgErrorCode::GpkgIoError,
            message: message.into(),
            details: None,
            source: Some(Box::new(source)),
        }
    }

    /// Attach details to this error
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Returns the error code
    pub fn code(&self) -> GpkgErrorCode {
        self.code
    }

    /// Returns the severity level
    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns additional error details
    pub fn details(&self) -> Option<&str> {
        self.details.as_deref()
    }

    /// Returns the underlying store error, if this error came from SQLite
    pub fn store_error(&self) -> Option<&rusqlite::Error> {
        self.source
            .as_ref()
            .and_then(|e| e.downcast_ref::<rusqlite::Error>())
    }

    /// Returns whether this error is fatal for the container
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl fmt::Display for GpkgError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.code.severity(),
            self.code.code(),
            self.message
        )?;
        if let Some(ref details) = self.details {
            write!(f, " ({})", details)?;
        }
        Ok(())
    }
}

impl std::error::Error for GpkgError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<rusqlite::Error> for GpkgError {
    fn from(err: rusqlite::Error) -> Self {
        Self {
            code: GpkgErrorCode::GpkgStoreError,
            message: err.to_string(),
            details: None,
            source: Some(Box::new(err)),
        }
    }
}

/// Result type for container operations
pub type GpkgResult<T> = Result<T, GpkgError>;
