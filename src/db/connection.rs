//! Shared connection context.

use std::future::Future;
use std::panic::Location;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[cfg(feature = "backend-http")]
use super::config::ConnectionConfig;
use super::Connection;
use crate::error::{ClickHouseError, Operation, Result};
use crate::repository::{QueryRepository, Repository};
use crate::request::{normalize_error, Request, SlowQueryLogger};

struct Inner {
    connection: Arc<dyn Connection>,
    slow_query_logger: Option<SlowQueryLogger>,
    closed: AtomicBool,
}

/// Handle to a live connection plus the connection-level slow-query logger.
///
/// Cloning is cheap; clones share the connection and the closed state.
#[derive(Clone)]
pub struct ClickHouse {
    inner: Arc<Inner>,
}

impl ClickHouse {
    /// Connect over HTTP and verify the server answers a ping.
    #[cfg(feature = "backend-http")]
    #[track_caller]
    pub fn connect(config: ConnectionConfig) -> impl Future<Output = Result<Self>> {
        let location = Location::caller();
        async move {
            let connection = super::HttpConnection::new(&config)
                .map_err(|e| ClickHouseError::Config { message: e.message })?;
            Self::ping_and_wrap(Arc::new(connection), config.slow_query_logger, location).await
        }
    }

    /// Wrap any [`Connection`] after verifying it answers a ping.
    #[track_caller]
    pub fn open(
        connection: Arc<dyn Connection>,
        slow_query_logger: Option<SlowQueryLogger>,
    ) -> impl Future<Output = Result<Self>> {
        let location = Location::caller();
        Self::ping_and_wrap(connection, slow_query_logger, location)
    }

    /// Wrap an already-established connection without pinging it.
    pub fn with_connection(
        connection: Arc<dyn Connection>,
        slow_query_logger: Option<SlowQueryLogger>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                connection,
                slow_query_logger,
                closed: AtomicBool::new(false),
            }),
        }
    }

    async fn ping_and_wrap(
        connection: Arc<dyn Connection>,
        slow_query_logger: Option<SlowQueryLogger>,
        location: &'static Location<'static>,
    ) -> Result<Self> {
        normalize_error(connection.ping().await, Operation::Connect, location)?;
        tracing::debug!(backend = connection.backend_name(), "Connected to ClickHouse");
        Ok(Self::with_connection(connection, slow_query_logger))
    }

    /// The live connection handle.
    ///
    /// Fails with [`ClickHouseError::NoConnection`] once closed.
    pub fn connection(&self) -> Result<Arc<dyn Connection>> {
        if self.is_closed() {
            return Err(ClickHouseError::NoConnection);
        }
        Ok(Arc::clone(&self.inner.connection))
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    pub fn slow_query_logger(&self) -> Option<&SlowQueryLogger> {
        self.inner.slow_query_logger.as_ref()
    }

    /// Close the connection. Closing twice fails with `NoConnection`.
    #[track_caller]
    pub fn close(&self) -> impl Future<Output = Result<()>> {
        let location = Location::caller();
        async move {
            if self.inner.closed.swap(true, Ordering::SeqCst) {
                return Err(ClickHouseError::NoConnection);
            }
            normalize_error(self.inner.connection.close().await, Operation::Connect, location)
        }
    }

    /// Create a request bound to this connection.
    ///
    /// The connection-level logger is attached when configured. A threshold
    /// override replaces its threshold for this request only; an override
    /// with no configured logger fails with
    /// [`ClickHouseError::NoSlowQueryLogger`] before anything is sent.
    pub fn request(&self, slow_query_max_execution_time: Option<u64>) -> Result<Request> {
        self.build_request(slow_query_max_execution_time, None)
    }

    /// Request with threshold precedence: call override, then scope override,
    /// then the connection-level threshold.
    pub(crate) fn build_request(
        &self,
        call_override: Option<u64>,
        scope_override: Option<u64>,
    ) -> Result<Request> {
        let mut request = Request::new(self.connection()?);
        let threshold = call_override.or(scope_override);

        match (self.slow_query_logger(), threshold) {
            (Some(logger), Some(max_execution_time_ms)) => {
                request.set_slow_query_logger(
                    logger.clone().with_max_execution_time(max_execution_time_ms),
                );
            }
            (Some(logger), None) => {
                request.set_slow_query_logger(logger.clone());
            }
            (None, Some(_)) => return Err(ClickHouseError::NoSlowQueryLogger),
            (None, None) => {}
        }

        Ok(request)
    }

    /// Instantiate a repository bound to this connection.
    pub fn repository<R: Repository>(&self) -> R {
        R::from_base(QueryRepository::new(self.clone()))
    }
}
