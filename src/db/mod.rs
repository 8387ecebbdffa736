//! Connection layer: driver abstraction, configuration and the shared
//! connection context.
//!
//! # Architecture
//!
//! [`Connection`] is the only seam to the database. The HTTP backend
//! (feature `backend-http`) implements it against ClickHouse's HTTP interface;
//! tests use the scripted `MockConnection` from `test_utils`.
//!
//! [`ClickHouse`] replaces process-wide globals: it owns the shared handle and
//! the connection-level slow-query logger and hands out requests and
//! repositories bound to them.

mod backend;
mod config;
mod connection;
#[cfg(feature = "backend-http")]
mod http;

pub use backend::{
    command_settings, query_settings, CommandCall, CompactRows, Connection, DriverError,
    InsertCall, Params, QueryCall, Settings, INSERT_FORMAT, QUERY_FORMAT,
};
pub use config::{ConfigFile, ConnectionConfig, CONFIG_FILE_NAME, DEFAULT_URL};
pub use connection::ClickHouse;
#[cfg(feature = "backend-http")]
pub use http::HttpConnection;
