//! Shared types for parameter binding and decoded results.

mod row;
mod sql_type;

pub use row::{Row, Value};
pub use sql_type::SqlType;
