//! clickhouse_request library - Parameterized ClickHouse requests
//!
//! Provides a request builder that rewrites `@name` placeholders into
//! ClickHouse parameter bindings, a shared connection context, repository
//! scaffolding, and optional slow-query reporting with call-site attribution.

pub mod db;
pub mod error;
pub mod repository;
pub mod request;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use db::{ClickHouse, ConfigFile, Connection, ConnectionConfig, DriverError};
#[cfg(feature = "backend-http")]
pub use db::HttpConnection;
pub use error::{BoxError, ClickHouseError, Operation, Result};
pub use repository::{QueryRepository, Repository};
pub use request::{
    Parameter, PreparedQuery, Request, SlowQueryError, SlowQueryHandler, SlowQueryLogger,
    TracingSlowQueryLogger,
};
pub use types::{Row, SqlType, Value};
