//! Parameterized requests against a shared ClickHouse connection.
//!
//! A [`Request`] collects named parameters, rewrites `@name` placeholders into
//! ClickHouse's `{name: Type}` binding syntax and runs the call. Every call is
//! wrapped twice:
//!
//! 1. slow-query timing (innermost), active only when a [`SlowQueryLogger`]
//!    is attached;
//! 2. driver error normalization (outermost), so callers only ever see
//!    [`ClickHouseError`].
//!
//! # Call-site attribution
//!
//! `query`, `query_rows`, `command` and `insert` are `#[track_caller]` and
//! return futures instead of being `async fn`, so the caller's source location
//! is captured synchronously and threaded into slow-query events and driver
//! errors.
//!
//! # Reuse
//!
//! Parameters accumulate on the request; running a call does not clear them.
//! Build a new request per logical operation.

mod decode;
mod normalize;
mod params;
mod slow_query;

use std::future::Future;
use std::panic::Location;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::db::{
    command_settings, query_settings, CommandCall, Connection, DriverError, InsertCall,
    QueryCall, INSERT_FORMAT, QUERY_FORMAT,
};
use crate::error::{ClickHouseError, Operation, Result};
use crate::types::{Row, SqlType};

pub use decode::{decode_rows, parse_timestamp};
pub use params::{prepare_query, Parameter, PreparedQuery};
pub use slow_query::{SlowQueryError, SlowQueryHandler, SlowQueryLogger, TracingSlowQueryLogger};

pub(crate) use normalize::normalize_error;
use slow_query::log_slow_query;

/// Builder for one parameterized call.
pub struct Request {
    connection: Arc<dyn Connection>,
    parameters: Vec<Parameter>,
    slow_query_logger: Option<SlowQueryLogger>,
}

impl Request {
    /// Creates a request without slow-query reporting.
    pub fn new(connection: Arc<dyn Connection>) -> Self {
        Self {
            connection,
            parameters: Vec::new(),
            slow_query_logger: None,
        }
    }

    pub fn set_slow_query_logger(&mut self, logger: SlowQueryLogger) -> &mut Self {
        self.slow_query_logger = Some(logger);
        self
    }

    pub fn slow_query_logger(&self) -> Option<&SlowQueryLogger> {
        self.slow_query_logger.as_ref()
    }

    /// Changes the threshold of the attached logger.
    ///
    /// Fails with [`ClickHouseError::NoSlowQueryLogger`] when no logger is
    /// attached: a threshold without a sink is a caller mistake.
    pub fn set_slow_query_max_execution_time(
        &mut self,
        max_execution_time_ms: u64,
    ) -> Result<&mut Self> {
        let logger = self
            .slow_query_logger
            .take()
            .ok_or(ClickHouseError::NoSlowQueryLogger)?;
        Ok(self.set_slow_query_logger(logger.with_max_execution_time(max_execution_time_ms)))
    }

    /// Declares a parameter for `@name` placeholders.
    pub fn input(
        &mut self,
        name: impl Into<String>,
        sql_type: SqlType,
        value: impl Into<serde_json::Value>,
    ) -> &mut Self {
        self.parameters.push(Parameter {
            name: name.into(),
            sql_type,
            value: value.into(),
        });
        self
    }

    /// Declares `name0, name1, ...` for each value and returns the matching
    /// `@name0,@name1,...` placeholder list for an `IN (...)` clause.
    ///
    /// ```ignore
    /// let ids = request.parametrize_in_clause("id", SqlType::UInt32, [1, 2, 3]);
    /// let sql = format!("SELECT * FROM users WHERE id IN ({})", ids);
    /// ```
    pub fn parametrize_in_clause<I, V>(&mut self, name: &str, sql_type: SqlType, values: I) -> String
    where
        I: IntoIterator<Item = V>,
        V: Into<serde_json::Value>,
    {
        values
            .into_iter()
            .enumerate()
            .map(|(index, value)| {
                let parameter = format!("{}{}", name, index);
                let placeholder = format!("@{}", parameter);
                self.input(parameter, sql_type.clone(), value);
                placeholder
            })
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// Rewrites `query` with the declared parameters without running it.
    pub fn prepare(&self, query: &str) -> PreparedQuery {
        prepare_query(query, &self.parameters)
    }

    /// Runs a query and deserializes each row into `T`.
    #[track_caller]
    pub fn query<T: DeserializeOwned>(&self, query: &str) -> impl Future<Output = Result<Vec<T>>> {
        let rows = self.query_rows(query);
        async move {
            rows.await?
                .into_iter()
                .map(|row| row.deserialize::<T>().map_err(ClickHouseError::from))
                .collect()
        }
    }

    /// Runs a query and returns decoded rows.
    #[track_caller]
    pub fn query_rows(&self, query: &str) -> impl Future<Output = Result<Vec<Row>>> {
        let location = Location::caller();
        async move {
            let prepared = self.prepare(query);
            let call = QueryCall {
                query: prepared.query,
                params: prepared.params,
                format: QUERY_FORMAT,
                settings: query_settings(),
            };
            let data = self
                .execute(Operation::Query, location, query, self.connection.query(call))
                .await?;
            Ok(decode_rows(data))
        }
    }

    /// Runs a statement for its side effect.
    #[track_caller]
    pub fn command(&self, query: &str) -> impl Future<Output = Result<()>> {
        let location = Location::caller();
        async move {
            let prepared = self.prepare(query);
            let call = CommandCall {
                query: prepared.query,
                params: prepared.params,
                settings: command_settings(),
            };
            self.execute(Operation::Command, location, query, self.connection.command(call))
                .await
        }
    }

    /// Bulk inserts `records` into `table`.
    ///
    /// Columns come from the keys of the first record and are always sent
    /// explicitly, so table defaults apply to columns the records omit. An
    /// empty slice, or a first record with no keys, is a no-op that never
    /// reaches the connection.
    #[track_caller]
    pub fn insert<T: Serialize>(&self, table: &str, records: &[T]) -> impl Future<Output = Result<()>> {
        let location = Location::caller();
        async move {
            let rows = records
                .iter()
                .map(|record| record_object(table, record))
                .collect::<Result<Vec<_>>>()?;

            let columns: Vec<String> = match rows.first() {
                Some(first) => first.keys().cloned().collect(),
                None => Vec::new(),
            };
            if columns.is_empty() {
                tracing::debug!(table, "Skipping insert with no columns");
                return Ok(());
            }

            let call = InsertCall {
                table: table.to_string(),
                format: INSERT_FORMAT,
                columns,
                rows,
                settings: command_settings(),
            };
            self.execute(Operation::Insert, location, table, self.connection.insert(call))
                .await
        }
    }

    /// Times `work` when a logger is attached, then normalizes driver errors.
    async fn execute<T, F>(
        &self,
        operation: Operation,
        location: &'static Location<'static>,
        statement: &str,
        work: F,
    ) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, DriverError>>,
    {
        tracing::debug!(
            %operation,
            %location,
            backend = self.connection.backend_name(),
            "Executing ClickHouse call"
        );

        let outcome = match &self.slow_query_logger {
            Some(logger) => {
                let marker = SlowQueryError::new(operation, location, statement);
                log_slow_query(work, marker, logger).await?
            }
            None => work.await,
        };

        normalize_error(outcome, operation, location)
    }
}

fn record_object<T: Serialize>(
    table: &str,
    record: &T,
) -> Result<serde_json::Map<String, serde_json::Value>> {
    match serde_json::to_value(record) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        Ok(other) => Err(ClickHouseError::InvalidRecord {
            table: table.to_string(),
            message: format!("expected an object, got {}", json_kind(&other)),
        }),
        Err(e) => Err(ClickHouseError::InvalidRecord {
            table: table.to_string(),
            message: e.to_string(),
        }),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}
