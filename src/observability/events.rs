//! Observable events for gpkgdb
//!
//! Events are explicit and typed.

use std::fmt;

use super::logger::Severity;

/// Observable events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Container lifecycle
    /// A new container file was initialized
    ContainerCreated,
    /// An existing container file was opened and validated
    ContainerOpened,
    /// The container was closed
    ContainerClosed,
    /// The format marker was written to the raw file header
    MarkerWrittenToHeader,
    /// Container self-check failed
    IntegrityCheckFailed,
    /// Format marker missing but tolerated in lenient mode
    MarkerMissingTolerated,

    // Schema
    /// A feature or tile table was registered
    TableCreated,
    /// A table create call found the table already registered
    TableAlreadyRegistered,

    // Write path
    /// A geometry was simplified before encoding
    GeometrySimplified,
    /// A constraint failed in lenient mode and the value was replaced by null
    ConstraintValueReplaced,
    /// A batch insert finished
    BatchInserted,

    // Query path
    /// A query bbox used a different spatial reference than the table
    QuerySrsMismatch,
    /// A query bbox did not touch the table extent
    QueryOutsideExtent,
    /// A spatial query finished
    QueryComplete,
}

impl Event {
    /// Returns the event name
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ContainerCreated => "CONTAINER_CREATED",
            Event::ContainerOpened => "CONTAINER_OPENED",
            Event::ContainerClosed => "CONTAINER_CLOSED",
            Event::MarkerWrittenToHeader => "MARKER_WRITTEN_TO_HEADER",
            Event::IntegrityCheckFailed => "INTEGRITY_CHECK_FAILED",
            Event::MarkerMissingTolerated => "MARKER_MISSING_TOLERATED",
            Event::TableCreated => "TABLE_CREATED",
            Event::TableAlreadyRegistered => "TABLE_ALREADY_REGISTERED",
            Event::GeometrySimplified => "GEOMETRY_SIMPLIFIED",
            Event::ConstraintValueReplaced => "CONSTRAINT_VALUE_REPLACED",
            Event::BatchInserted => "BATCH_INSERTED",
            Event::QuerySrsMismatch => "QUERY_SRS_MISMATCH",
            Event::QueryOutsideExtent => "QUERY_OUTSIDE_EXTENT",
            Event::QueryComplete => "QUERY_COMPLETE",
        }
    }

    /// Returns the severity the event is logged at
    pub fn severity(&self) -> Severity {
        match self {
            Event::IntegrityCheckFailed => Severity::Error,
            Event::MarkerMissingTolerated
            | Event::ConstraintValueReplaced
            | Event::QuerySrsMismatch
            | Event::GeometrySimplified => Severity::Warn,
            Event::QueryOutsideExtent
            | Event::QueryComplete
            | Event::TableAlreadyRegistered
            | Event::BatchInserted => Severity::Trace,
            _ => Severity::Info,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names_are_screaming_snake_case() {
        for event in [
            Event::ContainerCreated,
            Event::GeometrySimplified,
            Event::QuerySrsMismatch,
        ] {
            let name = event.as_str();
            assert!(name.chars().all(|c| c.is_ascii_uppercase() || c == '_'));
        }
    }

    #[test]
    fn test_lenient_substitution_is_warning() {
        assert_eq!(Event::ConstraintValueReplaced.severity(), Severity::Warn);
        assert_eq!(Event::IntegrityCheckFailed.severity(), Severity::Error);
    }
}
