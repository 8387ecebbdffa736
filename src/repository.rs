//! Repository base for grouping related queries.
//!
//! ```ignore
//! struct EventRepository {
//!     base: QueryRepository,
//! }
//!
//! impl Repository for EventRepository {
//!     fn from_base(base: QueryRepository) -> Self {
//!         Self { base: base.with_slow_query_max_execution_time(200) }
//!     }
//! }
//!
//! let events: EventRepository = clickhouse.repository();
//! ```

use crate::db::ClickHouse;
use crate::error::Result;
use crate::request::Request;

/// Repository types constructed by [`ClickHouse::repository`].
pub trait Repository: Sized {
    fn from_base(base: QueryRepository) -> Self;
}

/// Connection handle plus an optional threshold shared by every request the
/// repository creates.
#[derive(Clone)]
pub struct QueryRepository {
    client: ClickHouse,
    slow_query_max_execution_time: Option<u64>,
}

impl QueryRepository {
    pub fn new(client: ClickHouse) -> Self {
        Self {
            client,
            slow_query_max_execution_time: None,
        }
    }

    /// Threshold applied to all requests from this repository unless a call
    /// supplies its own.
    pub fn with_slow_query_max_execution_time(mut self, max_execution_time_ms: u64) -> Self {
        self.slow_query_max_execution_time = Some(max_execution_time_ms);
        self
    }

    pub fn slow_query_max_execution_time(&self) -> Option<u64> {
        self.slow_query_max_execution_time
    }

    pub fn client(&self) -> &ClickHouse {
        &self.client
    }

    /// Create a request. Threshold precedence: `slow_query_max_execution_time`
    /// argument, then the repository threshold, then the connection's.
    ///
    /// Fails with `NoSlowQueryLogger` when either threshold is set but the
    /// connection has no logger.
    pub fn request(&self, slow_query_max_execution_time: Option<u64>) -> Result<Request> {
        self.client
            .build_request(slow_query_max_execution_time, self.slow_query_max_execution_time)
    }
}

impl Repository for QueryRepository {
    fn from_base(base: QueryRepository) -> Self {
        base
    }
}
