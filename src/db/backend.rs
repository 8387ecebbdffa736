//! Connection trait abstracting the underlying ClickHouse driver.
//!
//! The request layer only needs a live handle that can run a query, a command
//! and a bulk insert. Everything else (transport, pooling, retries) belongs to
//! the implementation behind this trait.

use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;

/// Response format requested for queries: header rows with names and types,
/// then one JSON array per data row.
pub const QUERY_FORMAT: &str = "JSONCompactEachRowWithNamesAndTypes";

/// Row format used for bulk inserts.
pub const INSERT_FORMAT: &str = "JSONEachRow";

/// Named parameter values sent for server-side binding.
pub type Params = BTreeMap<String, serde_json::Value>;

/// ClickHouse settings attached to a single call.
pub type Settings = BTreeMap<String, String>;

/// Compact columnar response: `[field_names, field_types, ...rows]`.
pub type CompactRows = Vec<Vec<serde_json::Value>>;

/// Failure reported by a driver.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct DriverError {
    pub code: Option<u32>,
    pub message: String,
}

impl DriverError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(mut self, code: u32) -> Self {
        self.code = Some(code);
        self
    }
}

/// A read query with bound parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryCall {
    pub query: String,
    pub params: Params,
    pub format: &'static str,
    pub settings: Settings,
}

/// A statement executed for its side effect (DDL, mutations, inserts via SELECT).
#[derive(Debug, Clone, PartialEq)]
pub struct CommandCall {
    pub query: String,
    pub params: Params,
    pub settings: Settings,
}

/// A bulk insert of JSON objects with an explicit column list.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertCall {
    pub table: String,
    pub format: &'static str,
    pub columns: Vec<String>,
    pub rows: Vec<serde_json::Map<String, serde_json::Value>>,
    pub settings: Settings,
}

/// Trait for live ClickHouse connections.
///
/// Implementations must be safe to share between concurrently running
/// requests; the request layer performs no locking of its own.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Runs a query and returns the compact response rows.
    async fn query(&self, call: QueryCall) -> Result<CompactRows, DriverError>;

    /// Runs a statement, discarding any response body.
    async fn command(&self, call: CommandCall) -> Result<(), DriverError>;

    /// Inserts rows into a table.
    async fn insert(&self, call: InsertCall) -> Result<(), DriverError>;

    /// Checks that the server is reachable.
    async fn ping(&self) -> Result<(), DriverError>;

    /// Releases transport resources. Default is a no-op.
    async fn close(&self) -> Result<(), DriverError> {
        Ok(())
    }

    /// Get the backend name for logging/debugging.
    fn backend_name(&self) -> &'static str;
}

/// Settings sent with every query.
pub fn query_settings() -> Settings {
    let mut settings = command_settings();
    settings.insert("date_time_output_format".to_string(), "iso".to_string());
    settings
}

/// Settings sent with every command and insert.
pub fn command_settings() -> Settings {
    let mut settings = Settings::new();
    settings.insert(
        "date_time_input_format".to_string(),
        "best_effort".to_string(),
    );
    settings
}
