//! Error types surfaced by every public operation.

use std::fmt;
use std::panic::Location;

use thiserror::Error;

/// Boxed error raised by user-supplied callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type Result<T, E = ClickHouseError> = std::result::Result<T, E>;

/// Public request operation that initiated a database call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Connect,
    Query,
    Command,
    Insert,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connect => "connect",
            Self::Query => "query",
            Self::Command => "command",
            Self::Insert => "insert",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum ClickHouseError {
    #[error("No ClickHouse connection")]
    NoConnection,

    #[error("No ClickHouse slow query logger")]
    NoSlowQueryLogger,

    /// A failure reported by the driver, normalized to carry its original
    /// message plus the public operation and caller location it came from.
    #[error("{message}")]
    Driver {
        message: String,
        code: Option<u32>,
        operation: Operation,
        location: &'static Location<'static>,
    },

    #[error("Slow query logger failed: {source}")]
    SlowQueryLogger {
        #[source]
        source: BoxError,
    },

    #[error("Invalid record for table '{table}': {message}")]
    InvalidRecord { table: String, message: String },

    #[error("Failed to decode row: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Invalid configuration: {message}")]
    Config { message: String },
}

impl ClickHouseError {
    /// Caller location for driver failures.
    pub fn location(&self) -> Option<&'static Location<'static>> {
        match self {
            Self::Driver { location, .. } => Some(*location),
            _ => None,
        }
    }

    /// True for the configuration errors raised before any database call.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::NoConnection | Self::NoSlowQueryLogger | Self::Config { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn test_driver_error_displays_original_message() {
        let err = ClickHouseError::Driver {
            message: "Code: 62. DB::Exception: Syntax error".to_string(),
            code: Some(62),
            operation: Operation::Query,
            location: Location::caller(),
        };
        assert_eq!(err.to_string(), "Code: 62. DB::Exception: Syntax error");
        assert!(err.location().is_some());
        assert!(!err.is_configuration());
    }

    #[rstest]
    fn test_configuration_messages() {
        assert_eq!(ClickHouseError::NoConnection.to_string(), "No ClickHouse connection");
        assert_eq!(
            ClickHouseError::NoSlowQueryLogger.to_string(),
            "No ClickHouse slow query logger"
        );
        assert!(ClickHouseError::NoSlowQueryLogger.is_configuration());
    }

    #[rstest]
    fn test_logger_failure_keeps_source() {
        let source: BoxError = "sink unavailable".into();
        let err = ClickHouseError::SlowQueryLogger { source };
        let inner = std::error::Error::source(&err).map(|e| e.to_string());
        assert_eq!(inner.as_deref(), Some("sink unavailable"));
    }

    #[rstest]
    #[case(Operation::Query, "query")]
    #[case(Operation::Command, "command")]
    #[case(Operation::Insert, "insert")]
    fn test_operation_display(#[case] op: Operation, #[case] expected: &str) {
        assert_eq!(op.to_string(), expected);
    }
}
