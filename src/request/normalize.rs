//! Driver error normalization.

use std::panic::Location;

use crate::db::DriverError;
use crate::error::{ClickHouseError, Operation, Result};

/// Maps a driver failure to [`ClickHouseError::Driver`], attributing it to the
/// public operation and caller location instead of driver internals.
pub(crate) fn normalize_error<T>(
    outcome: std::result::Result<T, DriverError>,
    operation: Operation,
    location: &'static Location<'static>,
) -> Result<T> {
    outcome.map_err(|err| {
        tracing::debug!(
            %operation,
            %location,
            code = ?err.code,
            error = %err.message,
            "ClickHouse call failed"
        );
        ClickHouseError::Driver {
            message: err.message,
            code: err.code,
            operation,
            location,
        }
    })
}
